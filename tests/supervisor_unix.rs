//! End-to-end supervisor scenarios with real processes
//!
//! Each scenario builds a config whose children are small `/bin/sh` scripts,
//! runs a full supervision cycle, and checks exit mirroring plus the cleanup
//! postcondition (the keepalive pid is no longer running).

#![cfg(unix)]
#![allow(unsafe_code)] // libc::kill(pid, 0) liveness probes

use std::path::Path;
use std::time::Duration;
use tandem::{ChildSpec, Supervisor, TandemConfig};

/// A keepalive that records its own pid and then sleeps forever
fn keepalive_with_pidfile(pidfile: &Path) -> ChildSpec {
    ChildSpec::new(
        "sh",
        &[
            "-c",
            &format!("echo $$ > {}; exec sleep 30", pidfile.display()),
        ],
    )
}

fn config(background: ChildSpec, foreground: ChildSpec) -> TandemConfig {
    TandemConfig {
        background,
        foreground,
        grace_period_secs: 2,
    }
}

async fn read_pidfile(path: &Path) -> u32 {
    for _ in 0..50 {
        if let Ok(contents) = std::fs::read_to_string(path) {
            if let Ok(pid) = contents.trim().parse() {
                return pid;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("pidfile {} never appeared", path.display());
}

fn process_is_gone(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == -1 }
}

/// Worker exits 3 → supervisor reports 3 and the keepalive is gone
#[tokio::test]
async fn test_nonzero_exit_mirrored_and_keepalive_reaped() {
    let dir = tempfile::tempdir().unwrap();
    let pidfile = dir.path().join("keepalive.pid");

    let cfg = config(
        keepalive_with_pidfile(&pidfile),
        ChildSpec::new("sh", &["-c", "exit 3"]),
    );

    let exit = Supervisor::new(cfg).run().await.expect("run failed");
    assert_eq!(exit.code, Some(3));
    assert_eq!(exit.status_code(), 3);

    let keepalive_pid = read_pidfile(&pidfile).await;
    assert!(
        process_is_gone(keepalive_pid),
        "keepalive {keepalive_pid} still running after supervisor exit"
    );
}

/// Worker exits 0 → clean mirror, keepalive still cleaned up
#[tokio::test]
async fn test_clean_exit_mirrored() {
    let dir = tempfile::tempdir().unwrap();
    let pidfile = dir.path().join("keepalive.pid");

    let cfg = config(
        keepalive_with_pidfile(&pidfile),
        ChildSpec::new("true", &[]),
    );

    let exit = Supervisor::new(cfg).run().await.expect("run failed");
    assert!(exit.success());

    let keepalive_pid = read_pidfile(&pidfile).await;
    assert!(process_is_gone(keepalive_pid));
}

/// Worker killed by a signal → supervisor reports 128 + signal
#[tokio::test]
async fn test_signal_death_mirrored() {
    let cfg = config(
        ChildSpec::new("sleep", &["30"]),
        ChildSpec::new("sh", &["-c", "kill -9 $$"]),
    );

    let exit = Supervisor::new(cfg).run().await.expect("run failed");
    assert_eq!(exit.code, None);
    assert_eq!(exit.signal, Some(9));
    assert_eq!(exit.status_code(), 137);
}

/// Keepalive launch fails → fatal error, worker is never started
#[tokio::test]
async fn test_keepalive_launch_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("worker-ran");

    let cfg = config(
        ChildSpec::new("this_command_definitely_does_not_exist_12345", &[]),
        ChildSpec::new("sh", &["-c", &format!("touch {}", marker.display())]),
    );

    let err = Supervisor::new(cfg).run().await.unwrap_err();
    assert_eq!(err.code(), "TDM001");

    // Launch failure aborts before the foreground spawn; give any stray
    // child a moment to have run, then confirm it never did
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!marker.exists(), "worker was started despite launch failure");
}

/// Worker launch fails → fatal error, keepalive is cleaned up anyway
#[tokio::test]
async fn test_worker_launch_failure_cleans_up_keepalive() {
    let dir = tempfile::tempdir().unwrap();
    let pidfile = dir.path().join("keepalive.pid");

    let cfg = config(
        keepalive_with_pidfile(&pidfile),
        ChildSpec::new("this_command_definitely_does_not_exist_12345", &[]),
    );

    let err = Supervisor::new(cfg).run().await.unwrap_err();
    assert_eq!(err.code(), "TDM001");

    let keepalive_pid = read_pidfile(&pidfile).await;
    assert!(process_is_gone(keepalive_pid));
}

/// Worker environment and working directory come from the spec
#[tokio::test]
async fn test_child_spec_environment_and_cwd() {
    let dir = tempfile::tempdir().unwrap();

    let mut foreground = ChildSpec::new(
        "sh",
        &["-c", "test \"$TANDEM_E2E\" = yes && test -f marker"],
    );
    foreground
        .environment
        .insert("TANDEM_E2E".to_string(), "yes".to_string());
    foreground.working_directory = Some(dir.path().to_path_buf());
    std::fs::write(dir.path().join("marker"), b"").unwrap();

    let cfg = config(ChildSpec::new("sleep", &["30"]), foreground);
    let exit = Supervisor::new(cfg).run().await.expect("run failed");
    assert!(exit.success());
}
