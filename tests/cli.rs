// tests/cli.rs
//! Drives the built binary through a pseudo terminal.

use rexpect::session::spawn_command;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

const TIMEOUT_MS: Option<u64> = Some(30_000);

fn frame_pump(args: &[&str], config: Option<&Path>) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_frame-pump"));
    command.args(args).env("RUST_LOG", "info");
    match config {
        Some(path) => command.env("FRAME_PUMP_CONFIG", path),
        None => command.env_remove("FRAME_PUMP_CONFIG"),
    };
    command
}

#[test]
fn help_prints_usage_and_exits() {
    let mut session = spawn_command(frame_pump(&["--help"], None), TIMEOUT_MS).unwrap();
    session
        .exp_string("[buffer_num] [width] [height]")
        .unwrap();
    session.exp_eof().unwrap();
}

fn write_config(name: &str, json: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("frame-pump-{}-{}.json", name, std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(json.as_bytes()).unwrap();
    path
}

#[test]
fn ctrl_c_stops_a_running_session_cleanly() {
    let config = write_config(
        "cli-run",
        r#"{ "pipeline": { "fps_report_interval_ms": 200 }, "headless": { "refresh_hz": 200 } }"#,
    );

    let mut session =
        spawn_command(frame_pump(&["3", "64", "48"], Some(&config)), TIMEOUT_MS).unwrap();
    session.exp_string("fps: ").unwrap();

    session.send_control('c').unwrap();
    session.exp_string("shutting down").unwrap();
    session.exp_string("Render session stopped").unwrap();
    session.exp_eof().unwrap();

    std::fs::remove_file(&config).unwrap();
}

#[test]
fn second_ctrl_c_during_shutdown_aborts_the_process() {
    // Five seconds per frame keeps the display thread busy while the sink
    // flushes, so shutdown is still running when the second signal lands.
    let config = write_config("cli-abort", r#"{ "headless": { "refresh_hz": 0.2 } }"#);

    let mut session =
        spawn_command(frame_pump(&["3", "64", "48"], Some(&config)), TIMEOUT_MS).unwrap();
    session.exp_string("RenderPipeline: producing").unwrap();

    session.send_control('c').unwrap();
    session.exp_string("shutting down").unwrap();
    session.send_control('c').unwrap();
    session
        .exp_string("received during shutdown, aborting")
        .unwrap();
    session.exp_eof().unwrap();

    let status = session.process.wait().unwrap();
    assert!(format!("{:?}", status).contains("SIGABRT"), "exit status {:?}", status);

    std::fs::remove_file(&config).unwrap();
}
