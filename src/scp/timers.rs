//! Round-deadline and counter-bump timers, modeled as spawned
//! `tokio::time` tasks that post synthetic events back through a
//! channel, never touching slot state directly. Grounded on the
//! teacher's `scp/queue.rs` job-posts-to-slot shape, simplified since
//! this core has no shared job queue.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use super::slot_id::SlotId;

/// Base round timeout; round `n`'s deadline is `BASE * n`. Later
/// rounds wait longer so a temporarily-partitioned leader doesn't
/// starve the whole federation.
pub const ROUND_TIMEOUT_BASE: Duration = Duration::from_secs(1);

/// Flat counter-bump timeout.
pub const COUNTER_BUMP_TIMEOUT: Duration = Duration::from_secs(1);

pub fn round_timeout(round: u32) -> Duration {
    ROUND_TIMEOUT_BASE + ROUND_TIMEOUT_BASE * round.saturating_sub(1)
}

/// Events posted by timer tasks. The receiving `Node` must check
/// these against current slot state before acting: a timer fired for
/// a round or counter that's since moved on is stale and should be
/// dropped silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    RoundTimeout { slot: SlotId, round: u32 },
    CounterTimeout { slot: SlotId, counter: u32 },
}

/// Spawns a round-deadline timer for `(slot, round)`. Fires once.
pub fn spawn_round_timer(slot: SlotId, round: u32, tx: UnboundedSender<TimerEvent>) {
    let duration = round_timeout(round);
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        let _ = tx.send(TimerEvent::RoundTimeout { slot, round });
    });
}

/// Spawns a counter-bump timer for `(slot, counter)`. Fires once.
pub fn spawn_counter_timer(slot: SlotId, counter: u32, tx: UnboundedSender<TimerEvent>) {
    tokio::spawn(async move {
        tokio::time::sleep(COUNTER_BUMP_TIMEOUT).await;
        let _ = tx.send(TimerEvent::CounterTimeout { slot, counter });
    });
}
