//! Periodic ping so idle subscriber connections are not reaped by proxies.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use super::bridge::BroadcastBridge;
use super::message::PushMessage;

/// Default keepalive period
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);

/// Spawn the keepalive ticker on the current runtime
///
/// The first ping goes out one full period after start. The task ends when
/// the bridge's receiver is gone.
pub fn spawn_keepalive(bridge: BroadcastBridge, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !bridge.submit(PushMessage::Ping) {
                debug!("Keepalive stopped, bridge closed");
                break;
            }
        }
    })
}
