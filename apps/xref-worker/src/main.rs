use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = xref_worker::Args::parse();
	xref_worker::run(args).await
}
