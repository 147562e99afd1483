pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "hotspotctl")]
#[command(about = "hotspotctl - operate hotspots on this host or through a remote orchestrator")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "List wireless interfaces and their AP capability")]
    Interfaces,

    #[command(about = "Materialize the env file (and unit) for a hotspot")]
    Env(commands::env::EnvArgs),

    #[command(about = "Run start/stop/restart for a hotspot on this host and wait for the result")]
    Control(commands::control::ControlArgs),

    #[command(about = "Probe a hotspot's observed state and correct is_active")]
    Status {
        #[arg(help = "Hotspot id")]
        id: i32,
    },

    #[command(about = "Verify a hotspot's stored state against the host")]
    Verify {
        #[arg(help = "Hotspot id")]
        id: i32,
    },

    #[command(about = "Collect unit, process and interface diagnostics for a hotspot")]
    Diagnose {
        #[arg(help = "Hotspot id")]
        id: i32,
    },

    #[command(about = "Talk to a running orchestrator over HTTP")]
    Remote {
        #[arg(
            long,
            env = "HOTSPOT_API_URL",
            default_value = "http://localhost:3000",
            help = "Orchestrator base URL"
        )]
        server: String,

        #[command(subcommand)]
        cmd: commands::remote::RemoteCommands,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Interfaces => commands::env::interfaces(output_format).await,
        Commands::Env(args) => commands::env::handle(args, output_format).await,
        Commands::Control(args) => commands::control::handle(args, output_format).await,
        Commands::Status { id } => commands::status::status(id, output_format).await,
        Commands::Verify { id } => commands::status::verify(id, output_format).await,
        Commands::Diagnose { id } => commands::status::diagnose(id, output_format).await,
        Commands::Remote { server, cmd } => commands::remote::handle(&server, cmd, output_format).await,
    }
}
