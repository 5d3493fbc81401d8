use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use logview_core::indexer::build_snapshot;
use logview_core::SourceConfig;
use logview_feeds::docker::{DockerEndpoint, DockerOptions, DEFAULT_SOCKET};
use logview_feeds::journald::{JournaldOptions, DEFAULT_UNIT_STATE};
use logview_server::settings::{normalize_prefix, ServerSettings, DEFAULT_LISTEN};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "logview",
    about = "List, tail and watch logs over HTTP",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short = 'd', global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// Flags for the default `server` command.
    #[command(flatten)]
    server: ServerArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default).
    Server(ServerArgs),
    /// Walk the configured sources once and log what would be indexed.
    GlobTest {
        #[arg(long, short = 'c')]
        config: PathBuf,
    },
    /// Print version information.
    Version,
}

#[derive(Args)]
struct ServerArgs {
    /// File source configuration (.yaml, .yml, .json or .toml).
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    #[arg(long, short = 'l', default_value = DEFAULT_LISTEN)]
    listen: String,

    /// Serve everything under this path prefix.
    #[arg(long, default_value = "")]
    prefix: String,

    /// Tail scan buffer size in bytes.
    #[arg(long, default_value_t = logview_core::tail::DEFAULT_BUFFER_SIZE)]
    buffer: usize,

    /// Seconds between catalog walks.
    #[arg(long, default_value_t = 600)]
    refresh_interval: u64,

    /// Watch poll fallback in milliseconds.
    #[arg(long, default_value_t = 250)]
    poll_interval_ms: u64,

    /// Enable container logs.
    #[arg(long)]
    docker: bool,

    /// List stopped containers too.
    #[arg(long)]
    docker_all_container: bool,

    /// Docker Engine socket path or tcp://host:port.
    #[arg(long, default_value = DEFAULT_SOCKET)]
    docker_host: String,

    /// Enable systemd journal logs.
    #[arg(long)]
    systemd: bool,

    /// Unit states listed by the journal backend.
    #[arg(long, default_value = DEFAULT_UNIT_STATE)]
    systemd_unit_state: String,
}

impl ServerArgs {
    fn into_settings(self) -> anyhow::Result<ServerSettings> {
        let sources = self.config.as_deref().map(load_sources).transpose()?;
        let refresh_interval = Duration::from_secs(self.refresh_interval);

        Ok(ServerSettings {
            listen: self.listen,
            prefix: normalize_prefix(&self.prefix),
            buffer_size: self.buffer.max(1),
            refresh_interval,
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            sources,
            docker: self.docker.then(|| DockerOptions {
                endpoint: DockerEndpoint::parse(&self.docker_host),
                all_containers: self.docker_all_container,
            }),
            journald: self.systemd.then(|| JournaldOptions {
                unit_state: self.systemd_unit_state,
                refresh_interval,
                ..JournaldOptions::default()
            }),
        })
    }
}

fn load_sources(path: &Path) -> anyhow::Result<SourceConfig> {
    SourceConfig::load(path).with_context(|| format!("loading sources from {}", path.display()))
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

fn glob_test(config: &Path) -> anyhow::Result<()> {
    let sources = load_sources(config)?;
    let snapshot = build_snapshot(&sources, chrono::Utc::now());
    for file in snapshot.files() {
        let labels = file
            .labels
            .iter()
            .map(|(k, v)| format!("labels.{k}={v:?}"))
            .collect::<Vec<_>>()
            .join(" ");
        tracing::info!(
            path = %file.path.display(),
            name = %file.name,
            id = %file.id,
            "{labels}"
        );
    }
    tracing::info!(files = snapshot.len(), "glob test finished");
    Ok(())
}

fn print_version() {
    println!("logview, version {}", env!("CARGO_PKG_VERSION"));
    println!("  platform: {}/{}", std::env::consts::OS, std::env::consts::ARCH);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match cli.command {
        Some(Command::Version) => {
            print_version();
            Ok(())
        }
        Some(Command::GlobTest { config }) => glob_test(&config),
        Some(Command::Server(args)) => run_server(args).await,
        None => run_server(cli.server).await,
    }
}

async fn run_server(args: ServerArgs) -> anyhow::Result<()> {
    let settings = args.into_settings()?;
    let registry = logview_server::registry::builtin(&settings)?;
    logview_server::serve(&settings, registry).await
}
