use clap::Parser;

use epimatch_cli::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let max_level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(max_level).init();

    let exit_code = epimatch_cli::run(cli).await?;
    std::process::exit(exit_code);
}
