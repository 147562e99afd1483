mod common;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use common::Harness;
use hotspot_orchestrator::database::Hotspot;
use hotspot_orchestrator::handlers;

async fn send(h: &Harness, method: Method, uri: &str) -> Result<(StatusCode, Value)> {
    let app = handlers::router(h.engine.app_state());
    let response = app
        .oneshot(Request::builder().method(method).uri(uri).body(Body::empty())?)
        .await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, serde_json::from_slice(&bytes)?))
}

#[tokio::test(start_paused = true)]
async fn control_request_is_accepted_with_task_id() -> Result<()> {
    let h = Harness::new()?;
    h.add(Hotspot::new(7, 1, "Cafe7", "espresso-42")).await;
    h.runner.with_unit_active(7);

    let (status, body) = send(&h, Method::POST, "/api/hotspots/7/start").await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["hotspot_id"], 7);
    assert_eq!(body["data"]["action"], "start");

    let task_id: Uuid = body["data"]["task_id"].as_str().unwrap_or_default().parse()?;
    h.engine.queue().wait(task_id).await;

    let (status, body) = send(&h, Method::GET, &format!("/api/tasks/{}", task_id)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ready"], true);

    let (status, body) = send(&h, Method::GET, "/api/hotspots/7/task_status").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["task_id"], task_id.to_string());
    Ok(())
}

#[tokio::test]
async fn control_request_for_unknown_hotspot_is_404() -> Result<()> {
    let h = Harness::new()?;

    let (status, body) = send(&h, Method::POST, "/api/hotspots/41/stop").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
    assert!(h.runner.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_task_is_404() -> Result<()> {
    let h = Harness::new()?;

    let (status, body) = send(&h, Method::GET, &format!("/api/tasks/{}", Uuid::new_v4())).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "TASK_NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn status_reports_and_heals() -> Result<()> {
    let h = Harness::new()?;
    let mut hotspot = Hotspot::new(2, 1, "Lobby", "password1");
    hotspot.is_active = true;
    h.add(hotspot).await;
    h.runner.with_unit_inactive(2);

    let (status, body) = send(&h, Method::GET, "/api/hotspots/2/status").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_running"], false);
    assert_eq!(body["data"]["corrected"], true);

    let (status, body) = send(&h, Method::GET, "/api/hotspots/2/verify").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["message"], "Status verified: stopped");

    let (status, body) = send(&h, Method::GET, "/api/hotspots/9/status").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "HOTSPOT_NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn diagnostics_collects_unit_and_process_state() -> Result<()> {
    let h = Harness::new()?;
    h.add(Hotspot::new(2, 1, "Lobby", "password1")).await;
    h.runner.with_unit_inactive(2);

    let (status, body) = send(&h, Method::GET, "/api/hotspots/2/diagnostics").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["unit_name"], "hotspot_2.service");
    assert_eq!(body["data"]["is_running"], false);
    assert_eq!(body["data"]["serves_ssid"], false);
    Ok(())
}

#[tokio::test]
async fn health_reports_in_memory_store() -> Result<()> {
    let h = Harness::new()?;

    let (status, body) = send(&h, Method::GET, "/health").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["database"], "memory");
    Ok(())
}
