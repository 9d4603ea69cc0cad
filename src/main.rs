// Restyle - iterative AI stylesheet refinement
// Main entry point

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (filtered by RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    restyle::cli::run().await
}
