use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = cite_worker::Args::parse();

	cite_worker::run(args).await
}
