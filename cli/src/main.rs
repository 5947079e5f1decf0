use clap::Parser;
use clap::Subcommand;
use docintake_cli::categories_cmd;
use docintake_cli::categories_cmd::CategoriesCli;
use docintake_cli::simulate_cmd;
use docintake_cli::simulate_cmd::SimulateCli;
use tracing_subscriber::EnvFilter;

/// Document intake and validation workflow.
#[derive(Debug, Parser)]
#[command(name = "docintake", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List required document categories and their upload limits.
    Categories(CategoriesCli),
    /// Run an intake session against a mock or scripted validator.
    Simulate(SimulateCli),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Categories(cli) => categories_cmd::run(cli),
        Command::Simulate(cli) => simulate_cmd::run(cli).await,
    }
}

/// Logs go to stderr so `--json` output stays machine-readable.
fn setup_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
