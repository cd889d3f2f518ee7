mod config;
mod listen_cmd;

use clap::Parser;

use config::{CliOverrides, ListenConfig};

#[derive(Parser)]
#[command(
    name = "listen-in",
    about = "Tail the stdin and stdout of running processes by name"
)]
struct Cli {
    /// Process name to look for (overrides LISTEN_IN_PROCESS; default "uci")
    process_name: Option<String>,

    /// How to find processes: pidof or procfs (overrides LISTEN_IN_LOCATOR)
    #[arg(long)]
    locator: Option<String>,

    /// How to read streams: procfd or tail (overrides LISTEN_IN_BACKEND)
    #[arg(long)]
    backend: Option<String>,

    /// Poll interval for the procfd backend, in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Lines of existing output to print when attaching
    #[arg(long)]
    backlog: Option<usize>,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            process_name: self.process_name.clone(),
            locator: self.locator.clone(),
            backend: self.backend.clone(),
            poll_interval_ms: self.poll_interval_ms,
            backlog_lines: self.backlog,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ListenConfig::resolve(&cli.overrides())?;
    listen_cmd::run_listen(&config).await
}
