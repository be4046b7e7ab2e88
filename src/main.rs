use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cli;

#[derive(Parser)]
#[command(name = "hyper-cmd")]
#[command(about = "Extensible command-line host", long_about = None)]
struct Cli {
    /// Config file (default: ~/.hyper-cmd/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the plugin discovery root
    #[arg(long, global = true)]
    plugin_root: Option<String>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show every plugin with its lifecycle state
    Plugins {
        #[arg(long)]
        json: bool,
    },
    /// List available commands with usage
    Commands {
        #[arg(long)]
        json: bool,
    },
    /// Serve plugin commands as MCP tools on stdio
    Mcp,
    /// Show version information
    Version,
    /// Run a plugin command: `hyper-cmd <command> key=value ...`
    #[command(external_subcommand)]
    Run(Vec<String>),
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.log_json);

    let options = cli::HostOptions {
        config: cli.config,
        plugin_root: cli.plugin_root,
    };

    match cli.command {
        Some(Commands::Version) | None => {
            println!("hyper-cmd {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Plugins { json }) => cli::plugins::cmd_plugins(&options, json).await?,
        Some(Commands::Commands { json }) => cli::plugins::cmd_commands(&options, json).await?,
        Some(Commands::Mcp) => cli::run::cmd_mcp(&options).await?,
        Some(Commands::Run(words)) => {
            let code = cli::run::cmd_run(&options, words).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
    }

    Ok(())
}
