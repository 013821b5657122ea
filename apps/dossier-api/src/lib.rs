pub mod routes;
pub mod state;

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[derive(Debug, Parser)]
#[command(
	version = dossier_cli::VERSION,
	rename_all = "kebab",
	styles = dossier_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = dossier_config::load(&args.config)?;

	init_tracing(&config);

	let http_addr: SocketAddr = config.service.http_bind.parse()?;
	let state = AppState::new(config)?;
	let app = routes::router(state);
	let listener = TcpListener::bind(http_addr).await?;

	tracing::info!(%http_addr, "HTTP server listening.");

	axum::serve(listener, app).await?;

	Ok(())
}

fn init_tracing(config: &dossier_config::Config) {
	tracing_subscriber::fmt().with_env_filter(env_filter(&config.service.log_level)).init();
}

/// Falls back to `info` when `log_level` is not a valid filter directive.
fn env_filter(log_level: &str) -> EnvFilter {
	EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"))
}
