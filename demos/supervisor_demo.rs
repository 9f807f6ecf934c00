use std::path::PathBuf;
use std::time::Duration;

use warden::config::ManagedAppConfig;
use warden::runtime::SupervisorRuntime;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    println!("=== Supervisor Demo ===\n");

    let log_dir = std::env::temp_dir();

    // A process that crashes shortly after starting
    let crasher = ManagedAppConfig {
        name: "crasher".to_string(),
        command: PathBuf::from("/bin/sh"),
        args: vec![
            "-c".to_string(),
            "echo 'about to crash'; sleep 1; exit 1".to_string(),
        ],
        cwd: PathBuf::from("/tmp"),
        instances: 1,
        autorestart: true,
        max_memory_restart: None,
        env: vec![],
        stdout_path: log_dir.join("warden-demo-crasher-out.log"),
        stderr_path: log_dir.join("warden-demo-crasher-err.log"),
        merge_logs: false,
        log_date_format: "YYYY-MM-DD HH:mm:ss".to_string(),
        stop_signal: "SIGTERM".to_string(),
        stop_grace_secs: 2,
        max_restarts: 3,
        restart_window_secs: 60,
        restart_delay_secs: 1,
        max_restart_delay_secs: 8,
        stability_window_secs: 30,
        memory_check_secs: 5,
    };

    // A process that stays up
    let stable = ManagedAppConfig {
        name: "stable".to_string(),
        command: PathBuf::from("/bin/sleep"),
        args: vec!["60".to_string()],
        cwd: PathBuf::from("/tmp"),
        instances: 1,
        autorestart: true,
        max_memory_restart: None,
        env: vec![],
        stdout_path: log_dir.join("warden-demo-stable-out.log"),
        stderr_path: log_dir.join("warden-demo-stable-err.log"),
        merge_logs: false,
        log_date_format: "YYYY-MM-DD HH:mm:ss".to_string(),
        stop_signal: "SIGTERM".to_string(),
        stop_grace_secs: 2,
        max_restarts: 10,
        restart_window_secs: 60,
        restart_delay_secs: 1,
        max_restart_delay_secs: 8,
        stability_window_secs: 30,
        memory_check_secs: 5,
    };

    let runtime = SupervisorRuntime::new(vec![crasher, stable])?;
    let handle = runtime.shutdown_handle();
    let subs = runtime.subscribe_all();

    println!("Supervising {} slots for 15 seconds...\n", runtime.slot_count());
    let run_task = tokio::spawn(runtime.run());

    for i in 0..5 {
        tokio::time::sleep(Duration::from_secs(3)).await;

        println!("--- Status #{} ---", i + 1);
        for (slot, rx) in &subs {
            let state = rx.borrow();
            println!(
                "  {} [{}]: pid={:?}, restarts={}",
                slot, state.phase, state.pid, state.restarts
            );
        }
        println!();
    }

    println!("Shutting down...");
    handle.trigger();
    let final_states = run_task.await?;

    println!("\n=== Final Status ===");
    for (slot, state) in &final_states {
        println!(
            "  {} [{}]: restarts={}, last_exit={:?}",
            slot, state.phase, state.restarts, state.last_exit
        );
    }

    println!("\nDemo complete!");
    Ok(())
}
