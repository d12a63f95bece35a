use clap::Parser;

mod commands;
mod config;
mod error;
mod filter;
mod idp;
mod output;
mod piv;
mod saml;
mod sts;
#[cfg(test)]
mod test_fixtures;

use commands::CredsCommand;

#[derive(Parser)]
#[command(
    name = "getawscreds",
    about = "Output shell variables for an AWS role obtained through SAML federation",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(flatten)]
    command: CredsCommand,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { &cli.log_level };
    std::env::set_var("RUST_LOG", log_level);
    // stdout is reserved for the shell-sourceable output
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    if let Err(e) = commands::run(cli.command).await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}
