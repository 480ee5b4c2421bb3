use anyhow::Result;
use callsign_cli::app;

#[tokio::main]
async fn main() -> Result<()> {
    app::run().await
}
