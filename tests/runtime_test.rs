// Integration tests for the supervisor runtime

use std::path::PathBuf;

use tempfile::TempDir;
use warden::config::ManagedAppConfig;
use warden::process::ExitKind;
use warden::runtime::SupervisorRuntime;
use warden::supervisor::LifecyclePhase;

fn app_config(name: &str, command: &str, args: &[&str], dir: &TempDir) -> ManagedAppConfig {
    ManagedAppConfig {
        name: name.to_string(),
        command: PathBuf::from(command),
        args: args.iter().map(|a| a.to_string()).collect(),
        cwd: PathBuf::from("/tmp"),
        instances: 1,
        autorestart: true,
        max_memory_restart: None,
        env: vec![],
        stdout_path: dir.path().join(format!("{}-out.log", name)),
        stderr_path: dir.path().join(format!("{}-err.log", name)),
        merge_logs: false,
        log_date_format: "YYYY-MM-DD HH:mm:ss".to_string(),
        stop_signal: "SIGTERM".to_string(),
        stop_grace_secs: 2,
        max_restarts: 10,
        restart_window_secs: 60,
        restart_delay_secs: 0,
        max_restart_delay_secs: 60,
        stability_window_secs: 60,
        memory_check_secs: 5,
    }
}

#[tokio::test]
async fn test_multi_app_fanout_stops_on_shutdown() {
    let temp_dir = TempDir::new().unwrap();

    let mut web = app_config("web", "/bin/sleep", &["30"], &temp_dir);
    web.instances = 2;
    let worker = app_config("worker", "/bin/sleep", &["30"], &temp_dir);

    let runtime = SupervisorRuntime::new(vec![web, worker]).unwrap();
    assert_eq!(runtime.slot_count(), 3);

    let handle = runtime.shutdown_handle();
    let mut subs = runtime.subscribe_all();
    let task = tokio::spawn(runtime.run());

    // Every slot comes up independently
    for slot in ["web-0", "web-1", "worker"] {
        subs.get_mut(slot)
            .unwrap()
            .wait_for(|s| s.phase == LifecyclePhase::Running)
            .await
            .unwrap();
    }

    handle.trigger();
    let final_states = task.await.unwrap();

    let slots: Vec<&str> = final_states.keys().map(|s| s.as_str()).collect();
    assert_eq!(slots, vec!["web-0", "web-1", "worker"]);
    for state in final_states.values() {
        assert_eq!(state.phase, LifecyclePhase::Stopped);
        assert_eq!(state.pid, None);
    }
}

#[tokio::test]
async fn test_sibling_failure_is_isolated() {
    let temp_dir = TempDir::new().unwrap();

    let mut crasher = app_config("crasher", "/bin/sh", &["-c", "exit 1"], &temp_dir);
    crasher.max_restarts = 2;
    let steady = app_config("steady", "/bin/sleep", &["30"], &temp_dir);

    let runtime = SupervisorRuntime::new(vec![crasher, steady]).unwrap();
    let handle = runtime.shutdown_handle();
    let mut subs = runtime.subscribe_all();
    let task = tokio::spawn(runtime.run());

    subs.get_mut("steady")
        .unwrap()
        .wait_for(|s| s.phase == LifecyclePhase::Running)
        .await
        .unwrap();
    subs.get_mut("crasher")
        .unwrap()
        .wait_for(|s| s.phase == LifecyclePhase::Failed)
        .await
        .unwrap();

    // The crash loop must not disturb the healthy sibling
    assert_eq!(
        subs.get_mut("steady").unwrap().borrow().phase,
        LifecyclePhase::Running
    );

    handle.trigger();
    let final_states = task.await.unwrap();

    assert_eq!(final_states["crasher"].phase, LifecyclePhase::Failed);
    assert_eq!(final_states["crasher"].restarts, 2);
    assert_eq!(final_states["steady"].phase, LifecyclePhase::Stopped);
}

#[tokio::test]
async fn test_runtime_returns_once_all_slots_are_terminal() {
    let temp_dir = TempDir::new().unwrap();

    let mut first = app_config("first", "/bin/echo", &["one"], &temp_dir);
    first.autorestart = false;
    let mut second = app_config("second", "/bin/echo", &["two"], &temp_dir);
    second.autorestart = false;

    let runtime = SupervisorRuntime::new(vec![first, second]).unwrap();

    // No shutdown is ever triggered; the run ends when every slot does
    let final_states = runtime.run().await;

    assert_eq!(final_states.len(), 2);
    for state in final_states.values() {
        assert_eq!(state.phase, LifecyclePhase::Failed);
        assert_eq!(state.last_exit, Some(ExitKind::Code(0)));
    }
}
