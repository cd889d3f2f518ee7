//! Integration tests for the `listen-in` binary.
//!
//! Every test points `XDG_CONFIG_HOME` and `HOME` at a temp dir so the
//! operator's own config file is never read.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use listen_test_utils::write_script;

fn listen_in(config_home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_listen-in"));
    cmd.env("XDG_CONFIG_HOME", config_home)
        .env("HOME", config_home)
        .env_remove("LISTEN_IN_PROCESS")
        .env_remove("LISTEN_IN_LOCATOR")
        .env_remove("LISTEN_IN_BACKEND")
        .env_remove("RUST_LOG")
        .stdin(Stdio::null());
    cmd
}

fn write_config(config_home: &Path, contents: &str) {
    let dir = config_home.join("listen-in");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), contents).unwrap();
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn nothing_running_prints_notice_and_exits_zero() {
    let tmp = tempfile::tempdir().unwrap();
    let output = listen_in(tmp.path())
        .args(["--locator", "procfs", "no-such-engine-9f3c"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr_of(&output));
    assert_eq!(stdout_of(&output), "\nEngine not running\n");
}

#[test]
fn config_file_selects_the_pidof_binary() {
    let tmp = tempfile::tempdir().unwrap();
    let args_file = tmp.path().join("pidof-args");
    let pidof = write_script(
        tmp.path(),
        "pidof",
        &format!("echo \"$@\" > {}\nexit 1", args_file.display()),
    );
    write_config(
        tmp.path(),
        &format!(
            "[target]\nprocess_name = \"stockfish\"\n\n[locate]\nmode = \"pidof\"\npidof_binary = \"{}\"\n",
            pidof.display()
        ),
    );

    let output = listen_in(tmp.path()).output().unwrap();

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr_of(&output));
    assert_eq!(stdout_of(&output), "\nEngine not running\n");
    assert_eq!(
        std::fs::read_to_string(&args_file).unwrap().trim(),
        "stockfish"
    );
}

#[test]
fn env_var_overrides_config_file_process_name() {
    let tmp = tempfile::tempdir().unwrap();
    let args_file = tmp.path().join("pidof-args");
    let pidof = write_script(
        tmp.path(),
        "pidof",
        &format!("echo \"$@\" > {}\nexit 1", args_file.display()),
    );
    write_config(
        tmp.path(),
        &format!(
            "[target]\nprocess_name = \"stockfish\"\n\n[locate]\npidof_binary = \"{}\"\n",
            pidof.display()
        ),
    );

    let output = listen_in(tmp.path())
        .env("LISTEN_IN_PROCESS", "lc0")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr_of(&output));
    assert_eq!(std::fs::read_to_string(&args_file).unwrap().trim(), "lc0");
}

#[test]
fn unparseable_config_file_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path(), "[attach\nbackend = ");

    let output = listen_in(tmp.path()).output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(
        stderr_of(&output).contains("failed to parse config file"),
        "stderr: {}",
        stderr_of(&output)
    );
}

#[test]
fn unknown_backend_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let output = listen_in(tmp.path())
        .args(["--backend", "inotify", "stockfish"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(
        stderr_of(&output).contains("unknown attach backend"),
        "stderr: {}",
        stderr_of(&output)
    );
}

#[test]
fn failing_pidof_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let pidof = write_script(tmp.path(), "pidof", "echo 'pidof: broken' >&2; exit 3");
    write_config(
        tmp.path(),
        &format!("[locate]\npidof_binary = \"{}\"\n", pidof.display()),
    );

    let output = listen_in(tmp.path()).arg("stockfish").output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(
        stderr_of(&output).contains("failed to locate"),
        "stderr: {}",
        stderr_of(&output)
    );
}

/// Spawn a stand-in engine whose stdout goes to a file, and a `pidof`
/// script that reports its pid.
#[cfg(target_os = "linux")]
fn spawn_engine(dir: &Path, body: &str) -> (std::process::Child, u32) {
    let log = std::fs::File::create(dir.join("engine.log")).unwrap();
    let engine = Command::new("sh")
        .arg("-c")
        .arg(body)
        .stdin(Stdio::null())
        .stdout(log)
        .spawn()
        .unwrap();
    let pid = engine.id();
    write_script(dir, "pidof", &format!("echo {pid}"));
    write_config(
        dir,
        &format!(
            "[locate]\npidof_binary = \"{}\"\n\n[attach]\npoll_interval_ms = 20\n",
            dir.join("pidof").display()
        ),
    );
    (engine, pid)
}

#[cfg(target_os = "linux")]
#[test]
fn prints_tagged_lines_until_the_engine_exits() {
    let tmp = tempfile::tempdir().unwrap();
    let (mut engine, pid) = spawn_engine(
        tmp.path(),
        "sleep 0.5; echo 'id name FakeFish'; echo uciok; sleep 0.5",
    );

    let listener = listen_in(tmp.path())
        .arg("fakefish")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    // Reaping the engine removes its /proc entry, which ends the streams.
    engine.wait().unwrap();
    let output = listener.wait_with_output().unwrap();

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr_of(&output));
    let stdout = stdout_of(&output);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], pid.to_string());
    let tag = format!("[{pid}: stdout] ");
    let tagged: Vec<&str> = lines
        .iter()
        .filter_map(|l| l.strip_prefix(tag.as_str()))
        .collect();
    assert_eq!(tagged, vec!["id name FakeFish", "uciok"]);
}

#[cfg(target_os = "linux")]
#[test]
fn exits_when_the_engine_dies_with_its_stdin_pipe_still_open() {
    let tmp = tempfile::tempdir().unwrap();
    let log = std::fs::File::create(tmp.path().join("engine.log")).unwrap();
    let mut engine = Command::new("sh")
        .arg("-c")
        .arg("sleep 0.5; echo uciok; sleep 0.5")
        .stdin(Stdio::piped())
        .stdout(log)
        .spawn()
        .unwrap();
    let pid = engine.id();
    // Holding the write end keeps the engine's stdin from ever reaching EOF.
    let stdin_writer = engine.stdin.take().unwrap();
    write_script(tmp.path(), "pidof", &format!("echo {pid}"));
    write_config(
        tmp.path(),
        &format!(
            "[locate]\npidof_binary = \"{}\"\n\n[attach]\npoll_interval_ms = 20\n",
            tmp.path().join("pidof").display()
        ),
    );

    let mut listener = listen_in(tmp.path())
        .arg("fakefish")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    engine.wait().unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    let status = loop {
        if let Some(status) = listener.try_wait().unwrap() {
            break status;
        }
        if std::time::Instant::now() >= deadline {
            listener.kill().ok();
            panic!("listen-in kept running after the engine exited");
        }
        std::thread::sleep(Duration::from_millis(50));
    };
    drop(stdin_writer);

    assert_eq!(status.code(), Some(0));
    let mut stdout = String::new();
    std::io::Read::read_to_string(&mut listener.stdout.take().unwrap(), &mut stdout).unwrap();
    assert!(
        stdout.lines().any(|l| l == format!("[{pid}: stdout] uciok")),
        "stdout: {stdout}"
    );
}

#[cfg(target_os = "linux")]
#[test]
fn interrupt_exits_with_130() {
    let tmp = tempfile::tempdir().unwrap();
    let (mut engine, pid) = spawn_engine(tmp.path(), "echo ready; exec sleep 30");

    let mut listener = listen_in(tmp.path())
        .arg("fakefish")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let mut reader = BufReader::new(listener.stdout.take().unwrap());
    let mut discovery = String::new();
    reader.read_line(&mut discovery).unwrap();
    assert_eq!(discovery.trim(), pid.to_string());

    // Let the attachments open before interrupting.
    std::thread::sleep(Duration::from_millis(200));
    let sent = Command::new("kill")
        .args(["-INT", &listener.id().to_string()])
        .status()
        .unwrap();
    assert!(sent.success());

    let status = listener.wait().unwrap();
    engine.kill().ok();
    engine.wait().ok();

    assert_eq!(status.code(), Some(130));
}
