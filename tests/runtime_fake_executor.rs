// tests/runtime_fake_executor.rs

use std::error::Error;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use assetdag::config::ConfigFile;
use assetdag::dag::Scheduler;
use assetdag::engine::{
    CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions, TriggerReason,
    TriggerWhileRunningBehaviour,
};
use assetdag_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};
use assetdag_test_utils::fake_executor::FakeExecutor;
use assetdag_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

/// lint -> report, on top of the built-in tasks.
fn chain_config() -> ConfigFile {
    ConfigFileBuilder::new()
        .with_task("lint", TaskConfigBuilder::new("echo lint").build())
        .with_task("report", TaskConfigBuilder::new("echo report").after("lint").build())
        .build()
}

fn one_shot(cfg: &ConfigFile) -> CoreRuntime {
    CoreRuntime::new(
        Scheduler::from_config(cfg),
        TriggerWhileRunningBehaviour::Queue,
        1,
        RuntimeOptions {
            exit_when_idle: true,
            notify_reload: false,
        },
    )
}

async fn request(tx: &mpsc::Sender<RuntimeEvent>, task: &str) -> TestResult {
    tx.send(RuntimeEvent::TaskTriggered {
        task: task.to_string(),
        reason: TriggerReason::Requested,
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn runs_custom_chain_in_order() -> TestResult {
    init_tracing();
    let cfg = chain_config();

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone());

    request(&rt_tx, "report").await?;
    let summary = with_timeout(Runtime::new(one_shot(&cfg), rt_rx, executor).run()).await?;

    assert!(summary.is_success());
    assert_eq!(*executed.lock().unwrap(), vec!["lint".to_string(), "report".to_string()]);
    Ok(())
}

#[tokio::test]
async fn build_runs_both_production_tasks_then_the_group() -> TestResult {
    init_tracing();
    let cfg = ConfigFileBuilder::new().build();

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone());

    request(&rt_tx, "build").await?;
    let summary = with_timeout(Runtime::new(one_shot(&cfg), rt_rx, executor).run()).await?;
    assert!(summary.is_success());

    let executed = executed.lock().unwrap().clone();
    assert_eq!(executed.len(), 3);
    let mut first_two = executed[..2].to_vec();
    first_two.sort();
    assert_eq!(first_two, vec!["build-scripts", "build-styles"]);
    assert_eq!(executed[2], "build");
    Ok(())
}

#[tokio::test]
async fn failed_task_blocks_dependents_and_lands_in_summary() -> TestResult {
    init_tracing();
    let cfg = chain_config();

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone()).failing("lint");

    request(&rt_tx, "report").await?;
    let summary = with_timeout(Runtime::new(one_shot(&cfg), rt_rx, executor).run()).await?;

    assert_eq!(*executed.lock().unwrap(), vec!["lint".to_string()]);
    let failed: Vec<&str> = summary.failed_tasks.iter().map(String::as_str).collect();
    assert_eq!(failed, vec!["lint", "report"]);
    Ok(())
}

#[tokio::test]
async fn shutdown_ends_a_watch_session() -> TestResult {
    init_tracing();
    let cfg = ConfigFileBuilder::new().build();
    let core = CoreRuntime::new(
        Scheduler::from_config(&cfg),
        TriggerWhileRunningBehaviour::Queue,
        1,
        RuntimeOptions {
            exit_when_idle: false,
            notify_reload: true,
        },
    );

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone());

    request(&rt_tx, "default").await?;
    rt_tx.send(RuntimeEvent::ShutdownRequested).await?;
    let summary = with_timeout(Runtime::new(core, rt_rx, executor).run()).await?;

    assert!(summary.is_success());
    Ok(())
}
