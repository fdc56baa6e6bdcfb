// In src/main.rs

use frame_pump::{
    cli::{self, Command},
    config::CONFIG,
    flow::FlowController,
    session::{RenderSession, SessionSettings},
    signals::{self, SignalActor},
    sink::{HeadlessSettings, HeadlessSink},
};

use anyhow::Context;
use log::{error, info};

/// Main entry point for the `frame-pump` application.
fn main() -> anyhow::Result<()> {
    // Initialize the logger. Default filter is "info" if RUST_LOG is not set.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    let args = match cli::parse_args(std::env::args(), &CONFIG.pipeline) {
        Command::Help { usage } => {
            println!("{}", usage);
            return Ok(());
        }
        Command::Run(args) => args,
    };
    info!(
        "Starting frame-pump: {} buffers, {}x{}",
        args.buffer_count, args.width, args.height
    );

    // Must happen before any other thread exists.
    let mask = signals::block_termination_signals()?;

    let flow = FlowController::new();
    let abort = flow.abort_token();
    let _signals = SignalActor::spawn(mask, abort.clone())?;

    let sink = HeadlessSink::new(HeadlessSettings::from_config(&CONFIG.headless));
    let settings = SessionSettings::new(&args, &CONFIG.pipeline);
    let mut session = RenderSession::start(Box::new(sink), &settings, flow)
        .context("Failed to start render session")?;

    let result = session.run(&abort);
    if let Err(e) = &result {
        error!("Render loop failed: {:#}", e);
    }

    let report = session.shutdown();
    info!(
        "Render session stopped after {} frames ({:?})",
        report.frames_submitted, report.status
    );
    result
}
