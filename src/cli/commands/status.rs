use crate::cli::utils::output_report;
use crate::cli::OutputFormat;
use crate::config::config;
use crate::Engine;

pub async fn status(id: i32, output_format: OutputFormat) -> anyhow::Result<()> {
    let engine = Engine::connect(config()).await?;
    let report = engine.status.probe(id).await?;
    output_report(&output_format, &format!("Hotspot {}", id), &report)
}

pub async fn verify(id: i32, output_format: OutputFormat) -> anyhow::Result<()> {
    let engine = Engine::connect(config()).await?;
    let report = engine.status.verify(id).await?;
    output_report(&output_format, &report.message, &report)
}

pub async fn diagnose(id: i32, output_format: OutputFormat) -> anyhow::Result<()> {
    let engine = Engine::connect(config()).await?;
    let diagnostics = engine.status.diagnostics(id).await?;
    output_report(&output_format, &format!("Diagnostics for hotspot {}", id), &diagnostics)
}
