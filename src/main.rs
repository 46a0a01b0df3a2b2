use clap::Parser;

mod cli;

#[tokio::main]
async fn main() {
	contextmate::logging::init_tracing();
	let cli = cli::Cli::parse();
	if let Err(err) = cli::run(cli).await {
		tracing::error!(%err, "contextmate exited with an error");
		std::process::exit(1);
	}
}

// vim: ts=4
