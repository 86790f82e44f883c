// tests/build_pipeline.rs
//
// One-shot builds against real files in a temporary project.

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use assetdag::cli::CliArgs;
use assetdag::config::ConfigFile;
use assetdag::errors::AssetdagError;
use assetdag::run_once;
use assetdag_test_utils::builders::ConfigFileBuilder;
use assetdag_test_utils::{init_tracing, with_timeout, write_file};

type TestResult = Result<(), Box<dyn Error>>;

fn write_scripts(root: &Path) {
    write_file(
        root,
        "assets/src/js/main.js",
        "import { greet } from './vendor/greet.js';\nimport './vendor/polyfill';\n\n// entry\nconsole.log(greet('assetdag'));\n",
    );
    write_file(
        root,
        "assets/src/js/vendor/greet.js",
        "/* greeting helper */\nexport function greet(name) {\n    return 'hello ' + name;\n}\n",
    );
    write_file(root, "assets/src/js/vendor/polyfill.js", "window.polyfilled = true;\n");
}

fn write_styles(root: &Path) {
    write_file(
        root,
        "assets/src/scss/style.scss",
        "@use 'buttons';\n$accent: #c00;\n.card {\n  color: $accent;\n  .title { user-select: none; }\n}\n",
    );
    write_file(root, "assets/src/scss/_buttons.scss", ".btn { padding: 4px; }\n");
}

fn safari_8() -> ConfigFile {
    ConfigFileBuilder::new()
        .edit(|raw| raw.styles.browsers = vec!["safari 8".to_string()])
        .build()
}

fn cli(root: &Path, task: &str) -> CliArgs {
    CliArgs {
        task: task.to_string(),
        config: root.join("Assetdag.toml").display().to_string(),
        log_level: None,
        dry_run: false,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn build_writes_one_bundle_with_vendor_files_first() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let root = dir.path();
    write_scripts(root);
    write_styles(root);
    write_file(root, "Assetdag.toml", "[styles]\nbrowsers = [\"safari 8\"]\n");

    with_timeout(assetdag::run(cli(root, "build"))).await?;

    let js_dir = root.join("assets/dist/js");
    let entries = std::fs::read_dir(&js_dir)?.collect::<Result<Vec<_>, std::io::Error>>()?;
    assert_eq!(entries.len(), 1, "production build writes no sourcemap");

    let bundle = std::fs::read_to_string(js_dir.join("main.js"))?;
    let greet = bundle.find("return 'hello ' + name;").expect("greet inlined");
    let polyfill = bundle.find("window.polyfilled = true;").expect("polyfill inlined");
    let entry = bundle.find("console.log(greet('assetdag'));").expect("entry code");
    assert!(greet < polyfill && polyfill < entry);
    assert!(!bundle.contains("import"));
    assert!(!bundle.contains("greeting helper"));

    let css = std::fs::read_to_string(root.join("assets/dist/css/main.css"))?;
    assert!(css.contains("-webkit-user-select:none"));
    assert!(css.contains(".btn{padding:4px}"));
    assert!(!css.contains('\n'));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn rebuilding_unchanged_sources_is_byte_identical() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let root = dir.path().to_path_buf();
    write_scripts(&root);
    let cfg = Arc::new(ConfigFileBuilder::new().build());

    let summary = with_timeout(run_once(cfg.clone(), root.clone(), "run-dev-scripts")).await?;
    assert!(summary.is_success());
    let bundle = std::fs::read(root.join("assets/dist/js/main.js"))?;
    let map = std::fs::read(root.join("assets/dist/js/main.js.map"))?;

    let summary = with_timeout(run_once(cfg, root.clone(), "run-dev-scripts")).await?;
    assert!(summary.is_success());
    assert_eq!(std::fs::read(root.join("assets/dist/js/main.js"))?, bundle);
    assert_eq!(std::fs::read(root.join("assets/dist/js/main.js.map"))?, map);

    let text = String::from_utf8(bundle)?;
    assert!(text.contains("greeting helper"), "development keeps comments");
    assert!(text.ends_with("//# sourceMappingURL=main.js.map\n"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn dev_styles_are_expanded_and_prefixed() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let root = dir.path().to_path_buf();
    write_styles(&root);

    let summary = with_timeout(run_once(Arc::new(safari_8()), root.clone(), "run-dev-styles")).await?;
    assert!(summary.is_success());

    let css = std::fs::read_to_string(root.join("assets/dist/css/main.css"))?;
    assert!(css.contains("-webkit-user-select: none"));
    assert!(css.contains("color: #c00"));
    assert!(css.ends_with("/*# sourceMappingURL=maps/main.css.map */\n"));

    let map: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(root.join("assets/dist/css/maps/main.css.map"))?)?;
    assert_eq!(map["version"], 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn broken_stylesheet_fails_without_writing() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let root = dir.path().to_path_buf();
    write_file(&root, "assets/src/scss/style.scss", ".a { color: $undefined; }\n");

    let summary =
        with_timeout(run_once(Arc::new(ConfigFileBuilder::new().build()), root.clone(), "build-styles")).await?;

    assert!(summary.failed_tasks.contains("build-styles"));
    assert!(!root.join("assets/dist/css/main.css").exists());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn corrupt_image_is_reported_and_valid_one_still_written() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let root = dir.path();
    write_file(root, "Assetdag.toml", "");
    write_file(root, "assets/src/img/broken.png", b"definitely not a png");
    std::fs::create_dir_all(root.join("assets/src/img/photos"))?;
    image::RgbImage::from_pixel(16, 16, image::Rgb([200, 30, 30]))
        .save(root.join("assets/src/img/photos/red.png"))?;

    let err = with_timeout(assetdag::run(cli(root, "compress-images")))
        .await
        .expect_err("a corrupt image fails the one-shot build");
    assert!(matches!(err, AssetdagError::BuildFailed(ref msg) if msg.contains("compress-images")));

    let out = root.join("assets/dist/img/photos/red.png");
    assert!(out.exists());
    image::open(&out)?;
    assert!(!root.join("assets/dist/img/broken.png").exists());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn icon_sprite_collects_every_icon() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let root = dir.path().to_path_buf();
    write_file(
        &root,
        "assets/src/icons/arrow.svg",
        "<?xml version=\"1.0\"?>\n<!-- exported -->\n<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 24 24\">\n  <path d=\"M1 1h22\"/>\n</svg>\n",
    );
    write_file(
        &root,
        "assets/src/icons/dot.svg",
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"8\" height=\"8\"><circle r=\"4\"/></svg>",
    );

    let summary =
        with_timeout(run_once(Arc::new(ConfigFileBuilder::new().build()), root.clone(), "build-icon-sprite"))
            .await?;
    assert!(summary.is_success());

    let sprite = std::fs::read_to_string(root.join("assets/dist/icons/icons.svg"))?;
    assert!(sprite.starts_with("<svg xmlns=\"http://www.w3.org/2000/svg\">"));
    assert!(sprite.contains(r#"<symbol id="arrow" viewBox="0 0 24 24"><path d="M1 1h22"/></symbol>"#));
    assert!(sprite.contains(r#"<symbol id="dot" viewBox="0 0 8 8"><circle r="4"/></symbol>"#));
    assert!(!sprite.contains("exported"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn custom_command_failure_fails_the_run() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let root = dir.path().to_path_buf();
    let cfg = ConfigFileBuilder::new()
        .with_task(
            "touch",
            assetdag_test_utils::builders::TaskConfigBuilder::new("echo ok > touched.txt").build(),
        )
        .with_task(
            "fail",
            assetdag_test_utils::builders::TaskConfigBuilder::new("exit 3").after("touch").build(),
        )
        .build();

    let summary = with_timeout(run_once(Arc::new(cfg), root.clone(), "fail")).await?;

    assert!(root.join("touched.txt").exists(), "commands run in the project root");
    let failed: Vec<&str> = summary.failed_tasks.iter().map(String::as_str).collect();
    assert_eq!(failed, vec!["fail"]);
    Ok(())
}

#[tokio::test]
async fn unknown_task_is_rejected_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let err = run_once(
        Arc::new(ConfigFileBuilder::new().build()),
        dir.path().to_path_buf(),
        "deploy",
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AssetdagError::TaskNotFound(ref name) if name == "deploy"));
}
