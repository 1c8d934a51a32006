//! BDD step definitions for alerting feature

use chrono::Duration;
use cucumber::{given, then, when};

use downtime_sentinel::error::ProviderError;

use crate::world::{epoch, DowntimeWorld};

#[given(expr = "the watched device {string}")]
fn watched_device(world: &mut DowntimeWorld, name: String) {
    world.target_name = Some(name);
}

#[given(expr = "an alert threshold of {int} minutes and a repeat interval of {int} minutes")]
fn alert_policy(world: &mut DowntimeWorld, threshold: u64, repeat: u64) {
    world.threshold_minutes = threshold;
    world.repeat_minutes = repeat;
}

#[given(expr = "recipients {string}")]
fn recipients(world: &mut DowntimeWorld, list: String) {
    world.recipients = list
        .split(',')
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();
}

#[given("the notification channel is not ready")]
fn channel_not_ready(world: &mut DowntimeWorld) {
    world.channel_ready = Some(false);
    if let Some(channel) = &world.channel {
        channel.set_ready(false);
    }
}

async fn tick_at(world: &mut DowntimeWorld, minute: i64, verdict: Result<bool, ProviderError>) {
    world.sentinel().await;
    world
        .provider
        .as_ref()
        .expect("no provider")
        .report(verdict);
    world
        .clock
        .as_ref()
        .expect("no clock")
        .set(epoch() + Duration::minutes(minute));
    let report = world.sentinel().await.check_once().await;
    world.last_report = report;
}

#[when(expr = "the target is offline at minute {int}")]
async fn target_offline(world: &mut DowntimeWorld, minute: i64) {
    tick_at(world, minute, Ok(false)).await;
    assert!(world.last_report.is_some(), "check at minute {} failed", minute);
}

#[when(expr = "the target is online at minute {int}")]
async fn target_online(world: &mut DowntimeWorld, minute: i64) {
    tick_at(world, minute, Ok(true)).await;
    assert!(world.last_report.is_some(), "check at minute {} failed", minute);
}

#[when(expr = "the provider fails at minute {int}")]
async fn provider_fails(world: &mut DowntimeWorld, minute: i64) {
    let error = ProviderError::Network("connection reset".to_string());
    tick_at(world, minute, Err(error)).await;
    assert!(world.last_report.is_none());
}

#[then(expr = "{int} messages have been sent")]
async fn messages_sent(world: &mut DowntimeWorld, count: usize) {
    world.sentinel().await;
    assert_eq!(world.channel().sent().len(), count);
}

#[then(expr = "{int} messages containing {string} have been sent")]
async fn messages_containing(world: &mut DowntimeWorld, count: usize, text: String) {
    world.sentinel().await;
    let matching = world
        .channel()
        .sent()
        .iter()
        .filter(|(_, message)| message.contains(&text))
        .count();
    assert_eq!(matching, count, "messages: {:?}", world.channel().sent());
}

#[then(expr = "recipient {string} received a message containing {string}")]
async fn recipient_received(world: &mut DowntimeWorld, recipient: String, text: String) {
    world.sentinel().await;
    let sent = world.channel().sent();
    assert!(
        sent.iter()
            .any(|(to, message)| *to == recipient && message.contains(&text)),
        "messages: {:?}",
        sent
    );
}

#[then(expr = "the phase is {string}")]
async fn phase_is(world: &mut DowntimeWorld, expected: String) {
    let state = world.sentinel().await.state();
    let phase = serde_json::to_value(state.read().await.monitor.phase).unwrap();
    assert_eq!(phase, serde_json::Value::String(expected));
}

#[then(expr = "the history holds {int} failed notifications with error {string}")]
async fn failed_history(world: &mut DowntimeWorld, count: usize, error: String) {
    let state = world.sentinel().await.state();
    let state = state.read().await;
    assert_eq!(state.history.len(), count);
    assert!(state
        .history
        .iter()
        .all(|r| !r.success && r.error.as_deref() == Some(error.as_str())));
}

#[then(expr = "the history holds {int} notification(s)")]
async fn history_len(world: &mut DowntimeWorld, count: usize) {
    let state = world.sentinel().await.state();
    assert_eq!(state.read().await.history.len(), count);
}
