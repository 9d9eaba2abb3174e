mod config;
mod server;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use config::RelayConfig;

#[derive(Parser)]
#[command(name = "relay", about = "Control-plane adapter for driving LLM coding agents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a relay config file
    Init {
        /// Host to bind the control server to
        #[arg(long, default_value = config::DEFAULT_HOST)]
        host: String,
        /// Port to listen on
        #[arg(long, default_value_t = config::DEFAULT_PORT)]
        port: u16,
        /// Path to the codex binary
        #[arg(long, default_value = config::DEFAULT_CODEX_BINARY)]
        codex_binary: String,
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Run the HTTP/WebSocket control server
    Serve {
        /// Host to bind to (overrides RELAY_HOST and the config file)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on; 0 requests an OS-assigned port
        /// (overrides AGENT_PORT and the config file)
        #[arg(long)]
        port: Option<u16>,
        /// Run the scripted mock agent instead of the codex CLI
        #[arg(long)]
        mock: bool,
        /// Working directory for the codex CLI (passed as --cd)
        #[arg(long)]
        workspace: Option<PathBuf>,
        /// Path to the codex binary (overrides RELAY_CODEX_BINARY)
        #[arg(long)]
        codex_binary: Option<String>,
    },
}

/// Execute the `relay init` command: write the config file.
fn cmd_init(host: &str, port: u16, codex_binary: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        server: config::ServerSection {
            host: host.to_string(),
            port,
        },
        codex: config::CodexSection {
            binary: codex_binary.to_string(),
        },
    };
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  server.host = {host}");
    println!("  server.port = {port}");
    println!("  codex.binary = {codex_binary}");
    println!();
    println!("Next: run `relay serve` to start the control server.");

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            host,
            port,
            codex_binary,
            force,
        } => {
            cmd_init(&host, port, &codex_binary, force)?;
        }
        Commands::Serve {
            host,
            port,
            mock,
            workspace,
            codex_binary,
        } => {
            let resolved =
                RelayConfig::resolve(host.as_deref(), port, codex_binary.as_deref())?;
            server::run_serve(
                &resolved.host,
                resolved.port,
                mock,
                workspace,
                resolved.codex_binary,
            )
            .await?;
        }
    }

    Ok(())
}
