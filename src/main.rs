#[tokio::main]
async fn main() -> anyhow::Result<()> {
    eth_conformance::cli::run_cli().await
}
