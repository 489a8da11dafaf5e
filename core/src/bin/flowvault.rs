/// Flowvault CLI
///
/// Runs the REST server, applies migrations, and inspects stored versions
/// and executions.

use flowvault_core::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
