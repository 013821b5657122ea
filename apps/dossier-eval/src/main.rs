use clap::Parser;

use dossier_eval::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = Args::parse();

	dossier_eval::run(args).await
}
