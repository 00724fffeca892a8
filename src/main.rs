use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;

use nft_mint_client::{
    build_router,
    config::{ClientConfig, DesiredNetwork},
    provider::{HttpProvider, WalletProvider},
    types::Address,
    AppState,
};

#[derive(Debug, Parser)]
#[command(name = "nft-mint-client")]
#[command(about = "Wallet session and mint client for an ERC-1155 drop")]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value = "3000")]
    port: u16,

    /// JSON-RPC URL of the wallet node. Without it no wallet is available.
    #[arg(long, env = "RPC_URL")]
    rpc_url: Option<String>,

    /// Address of the deployed mint contract.
    #[arg(long, env = "CONTRACT_ADDRESS")]
    contract_address: String,

    /// JSON file describing the desired network (defaults to Sepolia).
    #[arg(long, env = "NETWORK_CONFIG")]
    network_config: Option<PathBuf>,

    /// How often the node is polled for account and chain changes.
    #[arg(long, default_value = "4000")]
    poll_interval_ms: u64,

    /// Collection size reported as total supply.
    #[arg(long, default_value = "5000")]
    max_supply: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nft_mint_client=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let contract_address: Address = cli
        .contract_address
        .parse()
        .with_context(|| format!("invalid contract address: {}", cli.contract_address))?;

    let network = match cli.network_config {
        Some(ref path) => DesiredNetwork::from_file(path)?,
        None => DesiredNetwork::default(),
    };

    tracing::info!(contract = %contract_address, "starting nft-mint-client");
    tracing::info!(
        chain_id = network.chain_id,
        network = %network.display_name,
        "desired network"
    );

    let mut config = ClientConfig::new(contract_address, network);
    config.max_supply = cli.max_supply;

    let http_provider = cli.rpc_url.as_ref().map(|url| {
        tracing::info!(rpc_url = %url, "RPC endpoint configured");
        Arc::new(HttpProvider::new(url.clone()))
    });
    if http_provider.is_none() {
        tracing::warn!("no RPC URL configured; wallet features are unavailable");
    }

    let state = AppState::new(
        config,
        http_provider
            .clone()
            .map(|p| p as Arc<dyn WalletProvider>),
    );
    state.spawn_session_watcher();

    if let Some(provider) = http_provider {
        let period = Duration::from_millis(cli.poll_interval_ms.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(e) = provider.poll().await {
                    tracing::warn!(error = %e, "provider poll failed");
                }
            }
        });
    }

    // Initial contract snapshot; failures leave defaults and are logged.
    let reconciler = state.reconciler.clone();
    tokio::spawn(async move {
        reconciler.fetch_contract_snapshot().await;
    });

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    tracing::info!(%addr, "server listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .await
        .context("server error")?;

    Ok(())
}
