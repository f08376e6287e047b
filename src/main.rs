//! demoforge CLI: recipe-driven provisioning through the platform CLI.

use clap::Parser;
use demoforge::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match demoforge::cli::dispatch(cli.command).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}
