use std::path::PathBuf;

use clap::Parser;
use tracing::debug;

use spyglass::debugger::Debugger;
use spyglass::errors::DebuggerError;
use spyglass::server::Server;

/// Serve a debug session for an executable over stdio
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the executable that will be debugged
    executable: PathBuf,

    /// Maximum log level (logs go to stderr; stdout carries the protocol)
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

fn main() -> Result<(), DebuggerError> {
    let args = Args::parse();
    setup_logger(args.log_level);
    debug!("set up the logger");

    let engine = Debugger::build(&args.executable)?;
    let server = Server::new(engine);
    server.serve(std::io::stdin().lock(), std::io::stdout().lock())?;
    server.cleanup()?;

    Ok(())
}

fn setup_logger(level: tracing::Level) {
    // stdout is the protocol stream, so traces must go to stderr
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("could not setup logger");
}
