//! `tether`: talk to the MCP servers listed in a TOML config from the shell.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tether_client::{ManagerConfig, McpClient, McpManager, OperationResult};
use tether_protocol::{CallToolParams, LoggingLevel};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tether", version, about = "Tether: MCP client for stdio, WebSocket and HTTP servers")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "tether.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured servers
    Servers,
    /// Connect to every server and print what they report
    Connect,
    /// List tools, on one server or all of them
    Tools {
        /// Only this server
        #[arg(short, long)]
        server: Option<String>,
    },
    /// Invoke a tool
    Call {
        /// Server id
        server: String,
        /// Tool name
        tool: String,
        /// Arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
    },
    /// List or read resources
    Resources {
        /// Server id
        server: String,
        /// Read this URI instead of listing
        #[arg(long)]
        read: Option<String>,
    },
    /// List prompts or render one
    Prompts {
        /// Server id
        server: String,
        /// Render this prompt instead of listing
        #[arg(long)]
        get: Option<String>,
        /// Prompt arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
    },
    /// Round-trip a ping and print the latency
    Ping {
        /// Server id
        server: String,
    },
    /// Change a server's log level
    LogLevel {
        /// Server id
        server: String,
        /// debug, info, notice, warning, error, critical, alert or emergency
        level: String,
    },
    /// Connect to every server, list tools, and print aggregated statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let config = ManagerConfig::from_file(&cli.config).map_err(|e| {
        anyhow::anyhow!("Failed to load config '{}': {e}", cli.config.display())
    })?;
    let manager = McpManager::from_config(config)?;
    info!(servers = manager.server_count(), "Loaded MCP server config");

    let outcome = run(&manager, cli.command).await;
    manager.dispose().await;
    outcome
}

async fn run(manager: &McpManager, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Servers => {
            let servers: Vec<_> = manager
                .server_ids()
                .into_iter()
                .filter_map(|id| manager.server_config(&id))
                .map(|c| {
                    serde_json::json!({
                        "id": c.id,
                        "transport": c.transport.kind().to_string(),
                        "endpoint": c.transport.endpoint(),
                    })
                })
                .collect();
            print_json(&servers)?;
        }
        Commands::Connect => {
            let results = manager.connect_all().await?;
            let report: std::collections::BTreeMap<_, _> = results
                .into_iter()
                .map(|(id, r)| (id, OperationResult::from(r)))
                .collect();
            print_json(&report)?;
        }
        Commands::Tools { server: Some(id) } => {
            let client = connected(manager, &id).await?;
            print_json(&client.list_tools().await)?;
        }
        Commands::Tools { server: None } => {
            manager.connect_all().await?;
            let tools: std::collections::BTreeMap<_, _> =
                manager.list_all_tools().await.into_iter().collect();
            print_json(&tools)?;
        }
        Commands::Call { server, tool, args } => {
            connected(manager, &server).await?;
            let arguments = parse_args(&args)?;
            let result = manager
                .call_tool(&server, CallToolParams::new(tool, arguments))
                .await;
            print_json(&result)?;
        }
        Commands::Resources { server, read } => {
            let client = connected(manager, &server).await?;
            match read {
                Some(uri) => print_json(&client.read_resource(&uri).await)?,
                None => print_json(&client.list_resources().await)?,
            }
        }
        Commands::Prompts { server, get, args } => {
            let client = connected(manager, &server).await?;
            match get {
                Some(name) => print_json(&client.get_prompt(&name, parse_args(&args)?).await)?,
                None => print_json(&client.list_prompts().await)?,
            }
        }
        Commands::Ping { server } => {
            let client = connected(manager, &server).await?;
            print_json(&client.ping().await)?;
        }
        Commands::LogLevel { server, level } => {
            let level: LoggingLevel = serde_json::from_value(serde_json::Value::String(level))
                .map_err(|_| anyhow::anyhow!("Unknown log level"))?;
            let client = connected(manager, &server).await?;
            print_json(&client.set_logging_level(level).await)?;
        }
        Commands::Stats => {
            manager.connect_all().await?;
            manager.list_all_tools().await;
            print_json(&manager.statistics())?;
        }
    }
    Ok(())
}

async fn connected(manager: &McpManager, server: &str) -> anyhow::Result<McpClient> {
    manager.connect(server).await?;
    manager
        .client(server)
        .ok_or_else(|| anyhow::anyhow!("Server '{server}' is not registered"))
}

fn parse_args(raw: &str) -> anyhow::Result<serde_json::Value> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| anyhow::anyhow!("--args must be a JSON object: {e}"))?;
    anyhow::ensure!(value.is_object(), "--args must be a JSON object");
    Ok(value)
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
