use anyhow::Context;
use clap::Args;
use serde_json::json;
use std::sync::Arc;

use crate::cli::utils::{output_report, output_success};
use crate::cli::OutputFormat;
use crate::config::config;
use crate::hotspot::{Interface, InterfaceDiscoverer, OrchestrationError};
use crate::system::SystemCommandRunner;
use crate::Engine;

#[derive(Args)]
pub struct EnvArgs {
    #[arg(help = "Hotspot id")]
    pub id: i32,

    #[arg(long, help = "Use this interface instead of auto-detecting one")]
    pub interface: Option<String>,

    #[arg(long, help = "Also install the systemd unit")]
    pub unit: bool,

    #[arg(long, help = "Reinstall the unit even if an identical one is loaded")]
    pub force: bool,
}

pub async fn handle(args: EnvArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let engine = Engine::connect(config()).await?;
    let orchestrator = engine.orchestrator();

    let hotspot = orchestrator
        .store()
        .get(args.id)
        .await?
        .ok_or(OrchestrationError::HotspotNotFound(args.id))?;

    let interface = match args.interface {
        Some(name) => {
            if !orchestrator.discoverer().validate_ap_capable(&name).await {
                anyhow::bail!("Interface {} cannot host an access point", name);
            }
            let ap_mode = orchestrator.discoverer().is_in_ap_mode(&name).await;
            Interface { name, ap_capable: true, ap_mode }
        }
        None => orchestrator.discoverer().select_interface().await?,
    };

    let materializer = orchestrator.materializer();
    let env_path = materializer
        .generate_env_file(&hotspot, &interface)
        .await
        .context("failed to write env file")?;

    let unit = if args.unit || args.force {
        Some(materializer.generate_service_unit(&hotspot, &env_path, args.force).await?)
    } else {
        None
    };

    output_success(
        &output_format,
        &format!("Wrote {} for hotspot {} on {}", env_path.display(), hotspot.id, interface.name),
        Some(json!({
            "hotspot_id": hotspot.id,
            "env_file": env_path.display().to_string(),
            "interface": interface.name,
            "unit": unit,
        })),
    )
}

/// Enumerate interfaces without touching the database or the host state
pub async fn interfaces(output_format: OutputFormat) -> anyhow::Result<()> {
    let config = config();
    let runner = Arc::new(SystemCommandRunner::new(config.commands.escalation.clone()));
    let discoverer = InterfaceDiscoverer::new(runner, config);

    let mut found = Vec::new();
    for name in discoverer.discover_interfaces().await {
        found.push(discoverer.inspect(&name).await);
    }

    output_report(&output_format, "Wireless interfaces", &json!({ "interfaces": found }))
}
