use anyhow::Context;
use clap::Subcommand;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::cli::utils::{output_error, output_report};
use crate::cli::OutputFormat;
use crate::types::HotspotAction;

#[derive(Subcommand)]
pub enum RemoteCommands {
    #[command(about = "Enqueue a start/stop/restart task")]
    Control {
        #[arg(help = "start, stop or restart")]
        action: HotspotAction,
        #[arg(help = "Hotspot id")]
        id: i32,
        #[arg(long, help = "Poll until the task finishes")]
        wait: bool,
    },

    #[command(about = "Probe hotspot status (self-heals is_active)")]
    Status {
        #[arg(help = "Hotspot id")]
        id: i32,
    },

    #[command(about = "Verify hotspot status and report corrections")]
    Verify {
        #[arg(help = "Hotspot id")]
        id: i32,
    },

    #[command(about = "Poll a task by id")]
    Task {
        #[arg(help = "Task id")]
        task_id: Uuid,
    },

    #[command(about = "Check orchestrator health")]
    Health,
}

struct RemoteClient {
    client: reqwest::Client,
    base: String,
}

impl RemoteClient {
    fn new(server: &str) -> anyhow::Result<Self> {
        let base = url::Url::parse(server)
            .with_context(|| format!("invalid server URL '{}'", server))?
            .to_string();
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, path: &str) -> anyhow::Result<Value> {
        let response = self
            .client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .with_context(|| format!("GET {} failed", path))?;
        Ok(response.json().await?)
    }

    async fn post(&self, path: &str) -> anyhow::Result<Value> {
        let response = self
            .client
            .post(format!("{}{}", self.base, path))
            .send()
            .await
            .with_context(|| format!("POST {} failed", path))?;
        Ok(response.json().await?)
    }
}

/// Unwrap the `{success, data}` envelope, surfacing API errors
fn envelope_data(body: Value, output_format: &OutputFormat) -> anyhow::Result<Value> {
    if body.get("success").and_then(Value::as_bool) == Some(true) {
        return Ok(body.get("data").cloned().unwrap_or(Value::Null));
    }
    let message = body
        .get("message")
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .unwrap_or("request failed")
        .to_string();
    output_error(output_format, &message, body.get("code").and_then(Value::as_str))?;
    anyhow::bail!(message)
}

pub async fn handle(server: &str, cmd: RemoteCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let client = RemoteClient::new(server)?;

    match cmd {
        RemoteCommands::Control { action, id, wait } => {
            let body = client.post(&format!("/api/hotspots/{}/{}", id, action)).await?;
            let data = envelope_data(body, &output_format)?;
            if !wait {
                return output_report(&output_format, &format!("Enqueued {} for hotspot {}", action, id), &data);
            }

            let task_id = data
                .get("task_id")
                .and_then(Value::as_str)
                .context("response carried no task_id")?
                .to_string();
            loop {
                let poll = envelope_data(client.get(&format!("/api/tasks/{}", task_id)).await?, &output_format)?;
                if poll.get("ready").and_then(Value::as_bool) == Some(true) {
                    return output_report(&output_format, &format!("Task {}", task_id), &poll);
                }
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
        RemoteCommands::Status { id } => {
            let data = envelope_data(client.get(&format!("/api/hotspots/{}/status", id)).await?, &output_format)?;
            output_report(&output_format, &format!("Hotspot {}", id), &data)
        }
        RemoteCommands::Verify { id } => {
            let data = envelope_data(client.get(&format!("/api/hotspots/{}/verify", id)).await?, &output_format)?;
            output_report(&output_format, &format!("Hotspot {}", id), &data)
        }
        RemoteCommands::Task { task_id } => {
            let data = envelope_data(client.get(&format!("/api/tasks/{}", task_id)).await?, &output_format)?;
            output_report(&output_format, &format!("Task {}", task_id), &data)
        }
        RemoteCommands::Health => {
            let data = envelope_data(client.get("/health").await?, &output_format)?;
            output_report(&output_format, server, &data)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwraps_success_envelope() {
        let data = envelope_data(json!({"success": true, "data": {"task_id": "x"}}), &OutputFormat::Json).unwrap();
        assert_eq!(data["task_id"], "x");
    }

    #[test]
    fn surfaces_api_errors() {
        let body = json!({"error": true, "message": "Hotspot 9 not found", "code": "HOTSPOT_NOT_FOUND"});
        let err = envelope_data(body, &OutputFormat::Json).unwrap_err();
        assert_eq!(err.to_string(), "Hotspot 9 not found");
    }

    #[test]
    fn rejects_malformed_server_url() {
        assert!(RemoteClient::new("not a url").is_err());
        assert_eq!(RemoteClient::new("http://hub:3000/").unwrap().base, "http://hub:3000");
    }
}
