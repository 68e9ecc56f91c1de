mod config_commands;
mod dispatch_commands;
mod knowledge_commands;

use std::path::{Path, PathBuf};

use {
    clap::{Parser, Subcommand},
    supportdesk_config::SupportdeskConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(
    name = "supportdesk",
    about = "Supportdesk: knowledge-base support agent for chat and tickets"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of ./supportdesk.toml and the user
    /// config dir).
    #[arg(long, global = true, env = "SUPPORTDESK_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the knowledge base.
    Search {
        query: String,
        /// Number of results.
        #[arg(short, long, default_value_t = 5)]
        k: usize,
        /// Minimum cosine score (defaults to `knowledge.min_similarity`).
        #[arg(long)]
        min_score: Option<f32>,
    },
    /// List knowledge-base topics.
    Topics {
        /// Only titles containing this keyword.
        #[arg(long)]
        category: Option<String>,
    },
    /// Show one knowledge-base article.
    Topic { name: String },
    /// Run the escalation classifier on a message.
    Classify { message: String },
    /// Process inbound events (JSON array or JSON lines) and print results.
    Dispatch {
        /// Events file; reads stdin when omitted.
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so command output on stdout stays machine-readable.
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SupportdeskConfig> {
    match path {
        Some(path) => {
            let mut config = supportdesk_config::load_config(path)?;
            supportdesk_config::apply_env_overrides(&mut config);
            Ok(config)
        },
        None => Ok(supportdesk_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "supportdesk starting");

    let config_path = cli.config.clone();
    match cli.command {
        Commands::Config { action } => {
            config_commands::handle_config(action, config_path.as_deref())
        },
        command => {
            let config = load_config(config_path.as_deref())?;
            run(command, &config).await
        },
    }
}

async fn run(command: Commands, config: &SupportdeskConfig) -> anyhow::Result<()> {
    match command {
        Commands::Search {
            query,
            k,
            min_score,
        } => knowledge_commands::search(config, &query, k, min_score).await,
        Commands::Topics { category } => knowledge_commands::topics(config, category.as_deref()),
        Commands::Topic { name } => knowledge_commands::topic(config, &name).await,
        Commands::Classify { message } => knowledge_commands::classify(config, &message).await,
        Commands::Dispatch { input } => dispatch_commands::dispatch(config, input.as_deref()).await,
        Commands::Config { action } => config_commands::handle_config(action, None),
    }
}
