use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relayer_account::{create_account, AccountService};
use relayer_chain::{BundlerClient, EvmClient};
use relayer_config::{ConfigLoader, RelayerConfig};
use relayer_core::{RelayerEngine, SponsoredPath};
use relayer_store::{spawn_reaper, OperationStore, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;

#[derive(Parser)]
#[command(name = "zerotoll-relayer")]
#[command(about = "ZeroToll gasless intent relayer", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/local.toml")]
	config: PathBuf,

	#[arg(long, env = "RELAYER_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the relayer service
	Start,
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	setup_tracing(&cli.log_level)?;

	match cli.command {
		Some(Commands::Start) | None => start_service(cli).await,
		Some(Commands::Validate) => validate_config(cli).await,
	}
}

async fn start_service(cli: Cli) -> Result<()> {
	info!("Starting ZeroToll relayer");
	info!("Loading configuration from: {:?}", cli.config);

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")?;

	info!("Configuration loaded successfully");
	info!("Relayer name: {}", config.relayer.name);
	info!("Chain id: {}", config.chain.chain_id);
	info!("HTTP port: {}", config.relayer.http_port);

	let engine = build_engine(&config).await?;

	let server = api::ApiServer::new(engine, config.relayer.http_port);
	let http_handle = tokio::spawn(async move { server.run().await });

	info!("ZeroToll relayer started successfully");

	setup_shutdown_signal().await;

	info!("Shutdown signal received, stopping services...");

	http_handle.abort();

	info!("ZeroToll relayer stopped");
	Ok(())
}

/// Wires the engine together from configuration: signing key, chain
/// client, optional bundler path, and the pending-operation store with
/// its reaper.
async fn build_engine(config: &RelayerConfig) -> Result<Arc<RelayerEngine>> {
	let account_config = toml::Value::try_from(&config.account)
		.context("Failed to serialize account configuration")?;
	let account = Arc::new(AccountService::new(
		create_account(&account_config).context("Failed to load relayer signing key")?,
	));
	info!("Relayer address: {}", account.address());

	let chain = Arc::new(
		EvmClient::new(
			&config.chain.rpc_url,
			config.chain.chain_id,
			config.chain.router_address,
			account.signer(),
		)
		.context("Failed to build chain client")?,
	);

	let sponsored = match &config.bundler {
		Some(bundler) => {
			info!("Sponsored execution enabled via bundler at {}", bundler.url);
			Some(SponsoredPath {
				bundler: Arc::new(BundlerClient::new(&bundler.url, bundler.entry_point)),
				smart_account: bundler.smart_account,
			})
		}
		None => {
			info!("No bundler configured, running self-funded only");
			None
		}
	};

	let clock = Arc::new(SystemClock);
	let store = Arc::new(OperationStore::new(
		clock.clone(),
		Duration::from_secs(config.store.ttl_seconds),
	));
	let _reaper = spawn_reaper(
		store.clone(),
		Duration::from_secs(config.store.reap_interval_seconds),
	);

	Ok(Arc::new(RelayerEngine::new(
		chain,
		account,
		store,
		sponsored,
		clock,
		config.store.ttl_seconds,
	)))
}

async fn validate_config(cli: Cli) -> Result<()> {
	info!("Validating configuration file: {:?}", cli.config);

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")?;

	info!("Configuration is valid");
	info!("Relayer name: {}", config.relayer.name);
	info!("Chain id: {}", config.chain.chain_id);
	info!("Router: {}", config.chain.router_address);
	match &config.bundler {
		Some(bundler) => info!("Sponsored path: enabled ({})", bundler.url),
		None => info!("Sponsored path: disabled"),
	}

	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	Ok(())
}

async fn setup_shutdown_signal() {
	let ctrl_c = async {
		signal::ctrl_c()
			.await
			.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
