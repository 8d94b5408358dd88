//! VectorSigma CLI - generate Rust state machines from PlantUML diagrams

mod cli;

use clap::Parser;
use crossterm::style::Stylize;
use crossterm::tty::IsTty;

fn main() {
    let cli_args = cli::Cli::parse();

    // Logging is initialized by the app once flags are known
    let mut app = cli::VectorSigmaApp::new();

    if let Err(e) = app.run(cli_args) {
        eprintln!("{} {:#}", error_prefix(), e);
        std::process::exit(1);
    }
}

/// `Error:` in red when stderr is a terminal and NO_COLOR is not set
fn error_prefix() -> String {
    if std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_tty() {
        format!("{}", "Error:".red())
    } else {
        "Error:".to_string()
    }
}
