use banking_gateway::{
    api::start_server, config::GatewayConfig, gateway::BankingGateway,
    tools::create_default_registry,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    let config = GatewayConfig::from_env()?;

    info!("Banking Gateway - API Server");
    info!(port = api_port, base_url = %config.base_url, "Configuration loaded");
    info!(credential_mode = %config.credential_mode, "Using {} credentials", config.credential_mode);

    let gateway = Arc::new(BankingGateway::from_config(&config)?);
    let registry = Arc::new(create_default_registry(gateway.clone()));

    info!(tools = registry.len(), "Tool registry initialized");

    start_server(gateway, registry, api_port).await?;

    Ok(())
}
