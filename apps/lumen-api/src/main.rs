use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = lumen_api::Args::parse();

	lumen_api::run(args).await
}
