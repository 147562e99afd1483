use clap::Args;
use serde_json::json;
use uuid::Uuid;

use crate::cli::utils::{output_error, output_success};
use crate::cli::OutputFormat;
use crate::config::config;
use crate::tasks::LogObserver;
use crate::types::HotspotAction;
use crate::Engine;

#[derive(Args)]
pub struct ControlArgs {
    #[arg(help = "start, stop or restart")]
    pub action: HotspotAction,

    #[arg(help = "Hotspot id")]
    pub id: i32,
}

/// Run the full pipeline in-process, retries included
pub async fn handle(args: ControlArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let engine = Engine::connect(config()).await?;
    let task_id = Uuid::new_v4();

    let result = engine
        .orchestrator()
        .run_task(task_id, args.id, args.action, &LogObserver, None)
        .await;

    if result.success {
        output_success(
            &output_format,
            &result.message(),
            Some(json!({ "result": result })),
        )
    } else {
        output_error(&output_format, &result.message(), result.error_code.as_deref())?;
        anyhow::bail!("{} of hotspot {} failed after {} attempt(s)", args.action, args.id, result.attempts)
    }
}
