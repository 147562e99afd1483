mod common;

use std::time::Duration;

use anyhow::{Context, Result};
use common::Harness;

use hotspot_orchestrator::database::Hotspot;
use hotspot_orchestrator::system::CommandOutput;
use hotspot_orchestrator::tasks::TaskState;
use hotspot_orchestrator::types::HotspotAction;

fn inactive() -> CommandOutput {
    CommandOutput {
        exit_code: Some(3),
        stdout: "inactive\n".into(),
        ..Default::default()
    }
}

fn active() -> CommandOutput {
    CommandOutput::success("active\n")
}

#[tokio::test(start_paused = true)]
async fn start_materializes_controls_and_activates() -> Result<()> {
    let h = Harness::new()?;
    h.add(Hotspot::new(7, 1, "Cafe7", "espresso-42").with_channel(11)).await;
    h.runner.with_ap_interface("wlan0");
    h.runner.on_sequence(
        "systemctl show",
        vec![CommandOutput::success("not-found\n"), CommandOutput::success("loaded\n")],
    );
    h.runner
        .on_sequence("systemctl is-active hotspot_7.service", vec![inactive(), active()]);

    let task_id = h.engine.queue().enqueue(7, HotspotAction::Start).await;
    let result = h.engine.queue().wait(task_id).await.context("task vanished")?;

    assert!(result.success, "{:?}", result);
    assert_eq!(result.attempts, 1);

    let env = tokio::fs::read_to_string(h.dir.path().join("env/hotspot_7.env")).await?;
    assert!(env.contains("SSID=\"Cafe7\""));
    assert!(env.contains("CHANNEL=11"));
    assert!(env.contains("192.168.7.1"));
    assert!(env.contains("INTERFACE=\"wlan0\""));

    assert_eq!(h.exact_calls("systemctl daemon-reload"), 1);
    assert_eq!(h.exact_calls("systemctl start hotspot_7.service"), 1);

    let stored = h.hotspot(7).await?;
    assert!(stored.is_active);
    assert_eq!(stored.current_task_id, Some(task_id));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn start_timeout_with_running_hotspot_succeeds() -> Result<()> {
    let h = Harness::new()?;
    h.add(Hotspot::new(3, 1, "Lobby", "password1")).await;
    h.runner.with_ap_interface("wlan0");
    h.runner.on("systemctl show", CommandOutput::success("loaded\n"));
    h.runner
        .on_sequence("systemctl is-active hotspot_3.service", vec![inactive(), active()]);
    h.runner.on_delayed(
        "systemctl start hotspot_3.service",
        Duration::from_secs(3600),
        CommandOutput::success(""),
    );

    let task_id = h.engine.queue().enqueue(3, HotspotAction::Start).await;
    let result = h.engine.queue().wait(task_id).await.context("task vanished")?;

    assert!(result.success, "{:?}", result);
    assert_eq!(result.attempts, 1);
    assert!(h.hotspot(3).await?.is_active);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn no_capable_interface_fails_after_attempt_ceiling() -> Result<()> {
    let h = Harness::new()?;
    h.add(Hotspot::new(5, 1, "Lobby", "password1")).await;
    h.runner.on(
        "iw dev",
        CommandOutput::success("phy#0\n\tInterface wlan0\n\t\ttype managed\nphy#1\n\tInterface wlan1\n\t\ttype managed\n"),
    );
    h.runner.on(
        "ip link show",
        CommandOutput::success("3: wlan0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 state UP\n"),
    );
    h.runner.on(
        "iw list",
        CommandOutput::success("Wiphy phy0\n\tSupported interface modes:\n\t\t * managed\n\t\t * monitor\n"),
    );

    let task_id = h.engine.queue().enqueue(5, HotspotAction::Start).await;
    let result = h.engine.queue().wait(task_id).await.context("task vanished")?;

    assert!(!result.success);
    assert_eq!(result.error_code.as_deref(), Some("NO_INTERFACE_AVAILABLE"));
    assert_eq!(result.attempts, 3);
    assert_eq!(h.exact_calls("iw dev"), 3);

    // Nothing was materialized or controlled
    assert!(!h.dir.path().join("env/hotspot_5.env").exists());
    assert_eq!(h.runner.count("touch"), 0);
    assert_eq!(h.runner.count("systemctl start"), 0);

    let poll = h.engine.queue().poll(task_id).await.context("poll missing")?;
    assert_eq!(poll.status, TaskState::Failed);
    assert!(!h.hotspot(5).await?.is_active);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn lingering_daemons_are_force_stopped_exactly_once() -> Result<()> {
    let h = Harness::new()?;
    let mut hotspot = Hotspot::new(4, 1, "Lobby", "password1");
    hotspot.is_active = true;
    h.add(hotspot).await;
    h.runner
        .on_sequence("systemctl is-active hotspot_4.service", vec![active(), inactive()]);

    let task_id = h.engine.queue().enqueue(4, HotspotAction::Stop).await;
    let result = h.engine.queue().wait(task_id).await.context("task vanished")?;

    assert!(result.success, "{:?}", result);
    assert_eq!(h.runner.count("pkill -f hostapd.*hotspot_4("), 1);
    assert_eq!(h.runner.count("pkill -f dnsmasq.*hotspot_4("), 1);
    assert_eq!(h.exact_calls("systemctl stop hotspot_4.service"), 1);
    assert!(!h.hotspot(4).await?.is_active);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_restart_records_hotspot_as_down() -> Result<()> {
    let h = Harness::with_config(|c| c.orchestration.max_attempts = 1)?;
    let mut hotspot = Hotspot::new(6, 1, "Lobby", "password1");
    hotspot.is_active = true;
    h.add(hotspot).await;
    h.runner.with_ap_interface("wlan0").with_unit_inactive(6);
    h.runner.on("systemctl show", CommandOutput::success("loaded\n"));

    let task_id = h.engine.queue().enqueue(6, HotspotAction::Restart).await;
    let result = h.engine.queue().wait(task_id).await.context("task vanished")?;

    assert!(!result.success);
    assert_eq!(result.error_code.as_deref(), Some("VERIFICATION_TIMEOUT"));
    assert!(!h.hotspot(6).await?.is_active);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_stop_keeps_last_known_state() -> Result<()> {
    let h = Harness::with_config(|c| c.orchestration.max_attempts = 1)?;
    let mut hotspot = Hotspot::new(8, 1, "Lobby", "password1");
    hotspot.is_active = true;
    h.add(hotspot).await;
    h.runner.with_unit_active(8);

    let task_id = h.engine.queue().enqueue(8, HotspotAction::Stop).await;
    let result = h.engine.queue().wait(task_id).await.context("task vanished")?;

    assert!(!result.success);
    assert_eq!(result.error_code.as_deref(), Some("COMMAND_FAILED"));
    assert_eq!(h.runner.count("pkill -f hostapd.*hotspot_8("), 1);
    assert!(h.hotspot(8).await?.is_active);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn missing_hotspot_is_not_retried() -> Result<()> {
    let h = Harness::new()?;

    let task_id = h.engine.queue().enqueue(99, HotspotAction::Start).await;
    let result = h.engine.queue().wait(task_id).await.context("task vanished")?;

    assert!(!result.success);
    assert_eq!(result.error_code.as_deref(), Some("HOTSPOT_NOT_FOUND"));
    assert_eq!(result.attempts, 1);
    assert!(h.runner.calls().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn attempt_exceeding_time_limit_fails() -> Result<()> {
    let h = Harness::with_config(|c| {
        c.orchestration.max_attempts = 1;
        c.orchestration.task_time_limit_secs = 10;
    })?;
    h.add(Hotspot::new(2, 1, "Lobby", "password1")).await;
    h.runner.with_ap_interface("wlan0");
    h.runner.on("systemctl show", CommandOutput::success("loaded\n"));
    h.runner.on_delayed(
        "systemctl start",
        Duration::from_secs(60),
        CommandOutput::success(""),
    );

    let task_id = h.engine.queue().enqueue(2, HotspotAction::Start).await;
    let result = h.engine.queue().wait(task_id).await.context("task vanished")?;

    assert!(!result.success);
    assert_eq!(result.error_code.as_deref(), Some("TASK_TIME_LIMIT_EXCEEDED"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn retry_succeeds_once_interface_appears() -> Result<()> {
    let h = Harness::new()?;
    h.add(Hotspot::new(9, 1, "Lobby", "password1")).await;
    h.runner.with_ap_interface("wlan0");
    // First enumeration finds nothing, later ones find wlan0
    h.runner.on_sequence(
        "iw dev",
        vec![
            CommandOutput::success(""),
            CommandOutput::success("phy#0\n\tInterface wlan0\n\t\ttype managed\n"),
        ],
    );
    h.runner.on("iw dev wlan0 info", CommandOutput::success("\ttype managed\n"));
    h.runner.on("systemctl show", CommandOutput::success("loaded\n"));
    h.runner
        .on_sequence("systemctl is-active hotspot_9.service", vec![inactive(), active()]);

    let task_id = h.engine.queue().enqueue(9, HotspotAction::Start).await;
    let result = h.engine.queue().wait(task_id).await.context("task vanished")?;

    assert!(result.success, "{:?}", result);
    assert_eq!(result.attempts, 2);
    assert!(h.hotspot(9).await?.is_active);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failing_stop_command_still_force_stops() -> Result<()> {
    let h = Harness::with_config(|c| c.orchestration.max_attempts = 1)?;
    let mut hotspot = Hotspot::new(4, 1, "Lobby", "password1");
    hotspot.is_active = true;
    h.add(hotspot).await;
    h.runner.on("systemctl show", CommandOutput::success("loaded\n"));
    h.runner.with_unit_active(4);
    h.runner.on("systemctl stop hotspot_4.service", CommandOutput::failure(1, "Job failed"));

    let task_id = h.engine.queue().enqueue(4, HotspotAction::Stop).await;
    let result = h.engine.queue().wait(task_id).await.context("task vanished")?;

    assert!(!result.success);
    assert_eq!(result.error_code.as_deref(), Some("COMMAND_FAILED"));
    assert!(result.error.as_deref().unwrap_or_default().contains("Job failed"));
    assert_eq!(h.runner.count("pkill -f hostapd.*hotspot_4("), 1);
    assert_eq!(h.runner.count("pkill -f dnsmasq.*hotspot_4("), 1);
    assert!(h.hotspot(4).await?.is_active);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn hung_stop_succeeds_once_forced_stop_takes_effect() -> Result<()> {
    let h = Harness::new()?;
    let mut hotspot = Hotspot::new(4, 1, "Lobby", "password1");
    hotspot.is_active = true;
    h.add(hotspot).await;
    h.runner.on("systemctl show", CommandOutput::success("loaded\n"));
    h.runner
        .on_sequence("systemctl is-active hotspot_4.service", vec![active(), inactive()]);
    h.runner.on_delayed(
        "systemctl stop hotspot_4.service",
        Duration::from_secs(3600),
        CommandOutput::success(""),
    );

    let task_id = h.engine.queue().enqueue(4, HotspotAction::Stop).await;
    let result = h.engine.queue().wait(task_id).await.context("task vanished")?;

    assert!(result.success, "{:?}", result);
    assert_eq!(result.attempts, 1);
    assert_eq!(h.runner.count("pkill -f hostapd.*hotspot_4("), 1);
    assert!(!h.hotspot(4).await?.is_active);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stop_for_deleted_hotspot_still_reaches_the_host() -> Result<()> {
    let h = Harness::new()?;
    h.runner.on("systemctl show", CommandOutput::success("loaded\n"));
    h.runner
        .on_sequence("systemctl is-active hotspot_11.service", vec![active(), inactive()]);

    let task_id = h.engine.status.hotspot_deleted(11).await;
    let result = h.engine.queue().wait(task_id).await.context("task vanished")?;

    assert!(result.success, "{:?}", result);
    assert_eq!(h.exact_calls("systemctl stop hotspot_11.service"), 2);
    assert_eq!(h.runner.count("pkill -f hostapd.*hotspot_11("), 1);
    Ok(())
}
