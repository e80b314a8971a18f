//! metalnode CLI
//!
//! Reconciles declared node labels, VLAN interfaces and connectivity tests
//! against a bare-metal cluster through kubectl.

use std::process::ExitCode;

use clap::Parser;

use metalnode_cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "metalnode failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
