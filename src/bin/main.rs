use banking_gateway::{
    config::GatewayConfig, gateway::BankingGateway, mcp::McpServer,
    tools::create_default_registry,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = GatewayConfig::from_env()?;
    info!(
        base_url = %config.base_url,
        credential_mode = %config.credential_mode,
        "Banking MCP server starting"
    );

    let gateway = Arc::new(BankingGateway::from_config(&config)?);
    let registry = Arc::new(create_default_registry(gateway));

    McpServer::new(registry).serve_stdio().await?;

    Ok(())
}
