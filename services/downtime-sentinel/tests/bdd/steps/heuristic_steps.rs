//! BDD step definitions for heuristic feature

use chrono::Duration;
use cucumber::{given, then, when};

use downtime_sentinel::heuristic::{
    evaluate_device, evaluate_tunnel, DeviceRecord, TunnelConnection, TunnelRecord,
};

use crate::world::{epoch, DowntimeWorld};

fn minutes_ago(value: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    match value {
        "never" => None,
        minutes => {
            let minutes: i64 = minutes
                .parse()
                .unwrap_or_else(|_| panic!("Bad minute value: {}", minutes));
            Some(epoch() - Duration::minutes(minutes))
        }
    }
}

fn connections(count: usize, pending: bool) -> Vec<TunnelConnection> {
    (0..count)
        .map(|i| TunnelConnection {
            id: Some(format!("conn-{}", i)),
            colo_name: Some("ams01".to_string()),
            is_pending_reconnect: Some(pending),
        })
        .collect()
}

#[given(expr = "a tunnel with status {string}")]
fn tunnel_with_status(world: &mut DowntimeWorld, status: String) {
    world.tunnel = Some(TunnelRecord {
        id: "tunnel-1".to_string(),
        name: "home-tunnel".to_string(),
        status,
        ..TunnelRecord::default()
    });
}

#[given(expr = "the tunnel was last active {string} minutes ago")]
fn tunnel_last_active(world: &mut DowntimeWorld, active: String) {
    let tunnel = world.tunnel.as_mut().expect("no tunnel");
    tunnel.conns_active_at = minutes_ago(&active);
}

#[given(expr = "the tunnel has {int} active connections")]
fn tunnel_active_connections(world: &mut DowntimeWorld, count: usize) {
    let tunnel = world.tunnel.as_mut().expect("no tunnel");
    tunnel.connections = connections(count, false);
}

#[given(expr = "the tunnel has {int} connections pending reconnect")]
fn tunnel_pending_connections(world: &mut DowntimeWorld, count: usize) {
    let tunnel = world.tunnel.as_mut().expect("no tunnel");
    tunnel.connections = connections(count, true);
}

#[given(expr = "a device reported {word} and last seen {string} minutes ago")]
fn device_reported(world: &mut DowntimeWorld, reported: String, seen: String) {
    world.device = Some(DeviceRecord {
        name: "apple-tv.tail0000.ts.net".to_string(),
        hostname: "apple-tv".to_string(),
        online: Some(reported == "online"),
        last_seen: minutes_ago(&seen),
        ..DeviceRecord::default()
    });
}

#[given(expr = "the device has {int} addresses")]
fn device_addresses(world: &mut DowntimeWorld, count: usize) {
    let device = world.device.as_mut().expect("no device");
    device.addresses = (0..count).map(|i| format!("100.64.0.{}", i + 1)).collect();
}

#[when("the tunnel is evaluated")]
fn evaluate_the_tunnel(world: &mut DowntimeWorld) {
    let tunnel = world.tunnel.as_ref().expect("no tunnel");
    world.verdict = Some(evaluate_tunnel(tunnel, epoch()));
}

#[when("the device is evaluated")]
fn evaluate_the_device(world: &mut DowntimeWorld) {
    let device = world.device.as_ref().expect("no device");
    world.verdict = Some(evaluate_device(device, epoch()));
}

#[then(expr = "the target is considered {word}")]
fn target_considered(world: &mut DowntimeWorld, verdict: String) {
    let status = world.verdict.as_ref().expect("nothing evaluated");
    let expected = match verdict.as_str() {
        "online" => true,
        "offline" => false,
        other => panic!("Unknown verdict: {}", other),
    };
    assert_eq!(
        status.online(),
        expected,
        "raw state {} evaluated the wrong way",
        status.raw_state
    );
}
