// tests/config_loading.rs

use std::error::Error;

use assetdag::cli::CliArgs;
use assetdag::config::{load_and_validate, DevServerMode};
use assetdag::errors::AssetdagError;
use assetdag::types::TriggerWhileRunningBehaviour;
use assetdag_test_utils::write_file;

type TestResult = Result<(), Box<dyn Error>>;

const FULL_CONFIG: &str = r#"
[config]
triggered_while_running_behaviour = "cancel"
queue_length = 2

[watch]
debounce_ms = 50
use_hash = true

[dev_server]
proxy_enabled = true
proxy_target = "www.your-url.com/"

[scripts]
entry_file = "src/app.js"
output_dir = "public/js"
production_filename = "app.min.js"

[styles]
include_paths = ["node_modules"]
browsers = ["last 2 versions", "ie 11"]

[task.lint]
cmd = "npx stylelint 'assets/src/scss/**/*.scss'"
after = ["run-dev-styles"]
watch = ["assets/src/scss/**/*.scss"]
"#;

#[test]
fn full_config_round_trips_into_validated_model() -> TestResult {
    let dir = tempfile::tempdir()?;
    write_file(dir.path(), "Assetdag.toml", FULL_CONFIG);

    let cfg = load_and_validate(dir.path().join("Assetdag.toml"))?;

    assert_eq!(
        cfg.config_section().triggered_while_running_behaviour,
        TriggerWhileRunningBehaviour::Cancel
    );
    assert_eq!(cfg.config_section().queue_length, 2);
    assert!(cfg.watch_section().use_hash);
    assert_eq!(
        cfg.dev_server().mode()?,
        DevServerMode::Proxy {
            target: "http://www.your-url.com".to_string()
        }
    );
    assert_eq!(cfg.scripts().filename_for(true), "app.min.js");
    assert_eq!(cfg.scripts().filename_for(false), "main.js");
    // Untouched fields keep their defaults.
    assert_eq!(cfg.styles().main_file, "assets/src/scss/style.scss");

    let lint = cfg
        .task_definitions()
        .into_iter()
        .find(|d| d.name == "lint")
        .expect("custom task is part of the graph");
    assert_eq!(lint.after, vec!["run-dev-styles"]);
    Ok(())
}

#[test]
fn unknown_dependency_is_a_config_error() -> TestResult {
    let dir = tempfile::tempdir()?;
    write_file(
        dir.path(),
        "Assetdag.toml",
        "[task.lint]\ncmd = \"true\"\nafter = [\"run-dev-sass\"]\n",
    );

    let err = load_and_validate(dir.path().join("Assetdag.toml")).unwrap_err();
    assert!(matches!(err, AssetdagError::ConfigError(ref msg) if msg.contains("run-dev-sass")));
    Ok(())
}

#[test]
fn invalid_glob_is_a_config_error() -> TestResult {
    let dir = tempfile::tempdir()?;
    write_file(dir.path(), "Assetdag.toml", "[scripts]\nsource_glob = \"assets/[js\"\n");

    let err = load_and_validate(dir.path().join("Assetdag.toml")).unwrap_err();
    assert!(matches!(err, AssetdagError::ConfigError(ref msg) if msg.contains("invalid glob")));
    Ok(())
}

#[test]
fn both_server_modes_are_rejected_on_load() -> TestResult {
    let dir = tempfile::tempdir()?;
    write_file(
        dir.path(),
        "Assetdag.toml",
        "[dev_server]\nproxy_enabled = true\nproxy_target = \"x\"\nlocal_server_enabled = true\nbase_dirs = [\"public\"]\n",
    );

    assert!(matches!(
        load_and_validate(dir.path().join("Assetdag.toml")),
        Err(AssetdagError::ConfigError(_))
    ));
    Ok(())
}

#[test]
fn malformed_toml_is_a_toml_error() -> TestResult {
    let dir = tempfile::tempdir()?;
    write_file(dir.path(), "Assetdag.toml", "[config\nqueue_length = ");

    assert!(matches!(
        load_and_validate(dir.path().join("Assetdag.toml")),
        Err(AssetdagError::TomlError(_))
    ));
    Ok(())
}

#[tokio::test]
async fn dry_run_validates_the_requested_task() -> TestResult {
    let dir = tempfile::tempdir()?;
    write_file(dir.path(), "Assetdag.toml", FULL_CONFIG);
    let args = |task: &str| CliArgs {
        task: task.to_string(),
        config: dir.path().join("Assetdag.toml").display().to_string(),
        log_level: None,
        dry_run: true,
    };

    assetdag::run(args("lint")).await?;
    assetdag::run(args("watch")).await?;
    let err = assetdag::run(args("deploy")).await.unwrap_err();
    assert!(matches!(err, AssetdagError::TaskNotFound(_)));
    Ok(())
}

#[tokio::test]
async fn explicit_missing_config_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let args = CliArgs {
        task: "build".to_string(),
        config: dir.path().join("nope.toml").display().to_string(),
        log_level: None,
        dry_run: false,
    };
    assert!(matches!(
        assetdag::run(args).await,
        Err(AssetdagError::IoError(_))
    ));
}
