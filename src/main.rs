//! chanwatch CLI entrypoint

use clap::Parser;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chanwatch::cli::Cli;
use chanwatch::CheckError;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize tracing (stderr, so stdout only carries command output)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Parse and execute CLI; every error kind maps to one exit code here
    let cli = Cli::parse();
    if let Err(e) = cli.execute().await {
        error!("{:#}", e);
        let code = e
            .downcast_ref::<CheckError>()
            .map(CheckError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}
