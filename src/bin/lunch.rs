//! `lunch`: the federation-of-nodes demo driver, a direct port of
//! `cmd/lunch/main.go`'s behavior onto the `Node`/`Slot` public API:
//! TOML config, a small set of food names as the nominated value,
//! per-recipient simulated delay, stale-slot discard, and
//! all-externalized detection with throughput logging.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rand::Rng;
use rand::SeedableRng;
use tokio::sync::mpsc;

use federated_scp::config;
use federated_scp::scp::ballot_protocol::CounterBumpAction;
use federated_scp::scp::envelope::Envelope;
use federated_scp::scp::node::Node;
use federated_scp::scp::node_id::NodeId;
use federated_scp::scp::slot_id::SlotId;
use federated_scp::scp::timers::{spawn_counter_timer, spawn_round_timer, TimerEvent};
use federated_scp::scp::value::Value;

const FOODS: &[&str] = &[
    "pizza",
    "burgers",
    "burritos",
    "sandwiches",
    "sushi",
    "salads",
    "gyros",
    "indian",
    "soup",
    "pasta",
];

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
struct Food(String);

impl Value for Food {
    fn combine(&self, other: &Self, slot: SlotId) -> Self {
        federated_scp::scp::value::combine_by_parity(self, other, slot)
    }

    fn is_nil(&self) -> bool {
        self.0.is_empty()
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }
}

#[derive(Parser, Debug)]
#[command(about = "Run a simulated SCP federation nominating lunch")]
struct Args {
    /// RNG seed.
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Random delay limit in milliseconds, applied per recipient per
    /// envelope; 0 disables delay simulation.
    #[arg(long, default_value_t = 100)]
    delay: u64,

    /// TOML config file with a `[nodes]` table.
    config_file: PathBuf,
}

/// (Re)arms `slot_id`'s round-deadline and counter-bump timers for
/// `node` if its nomination round or ballot counter has moved past
/// whatever was last scheduled, recording the new value so the same
/// timer isn't spawned twice.
fn arm_timers(
    node: &Arc<Node<Food>>,
    slot_id: SlotId,
    scheduled_round: &mut BTreeMap<NodeId, u32>,
    scheduled_counter: &mut BTreeMap<NodeId, u32>,
    tx_timer: &mpsc::UnboundedSender<TimerEvent>,
) {
    if let Some(round) = node.nomination_round(slot_id) {
        if scheduled_round.get(&node.id) != Some(&round) {
            scheduled_round.insert(node.id.clone(), round);
            spawn_round_timer(slot_id, round, tx_timer.clone());
        }
    }
    if let Some(CounterBumpAction::ArmTimer) = node.counter_bump_action(slot_id) {
        if let Some(counter) = node.ballot_counter(slot_id) {
            if scheduled_counter.get(&node.id) != Some(&counter) {
                scheduled_counter.insert(node.id.clone(), counter);
                spawn_counter_timer(slot_id, counter, tx_timer.clone());
            }
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let federation = config::load(&args.config_file).unwrap_or_else(|e| {
        log::error!("{e}");
        std::process::exit(1);
    });

    let mut nodes = BTreeMap::new();
    for (id, qset) in federation {
        nodes.insert(id.clone(), Arc::new(Node::<Food>::new(id, qset)));
    }

    let mut rng = rand::rngs::StdRng::seed_from_u64(args.seed);
    let mut last_calls: u64 = 0;

    let mut slot_id = SlotId::new(1);
    loop {
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope<Food>>();
        let (tx_timer, mut rx_timer) = mpsc::unbounded_channel::<TimerEvent>();
        let mut latest: BTreeMap<NodeId, Option<Envelope<Food>>> =
            nodes.keys().cloned().map(|id| (id, None)).collect();
        let mut scheduled_round: BTreeMap<NodeId, u32> = BTreeMap::new();
        let mut scheduled_counter: BTreeMap<NodeId, u32> = BTreeMap::new();

        for node in nodes.values() {
            let food = Food(FOODS[rng.gen_range(0..FOODS.len())].to_string());
            if let Some(env) = node.nominate(slot_id, food).expect("nominate") {
                let _ = tx.send(env);
            }
        }
        for node in nodes.values() {
            arm_timers(node, slot_id, &mut scheduled_round, &mut scheduled_counter, &tx_timer);
        }

        let mut to_send: Vec<Envelope<Food>> = Vec::new();

        'round: loop {
            while let Ok(env) = rx.try_recv() {
                if env.slot < slot_id {
                    continue; // discard messages about old slots
                }
                latest.insert(env.sender.clone(), Some(env.clone()));

                let all_ext = latest.values().all(|m| {
                    m.as_ref()
                        .map(|e| e.message.is_externalize())
                        .unwrap_or(false)
                });
                if all_ext {
                    let all_calls: u64 = nodes.values().map(|n| n.handle_calls()).sum();
                    let these_calls = all_calls.saturating_sub(last_calls);
                    let elapsed_nanos: u64 = nodes.values().map(|n| n.handle_time_nanos()).sum();
                    let avg = if all_calls > 0 {
                        Duration::from_nanos(elapsed_nanos / all_calls)
                    } else {
                        Duration::ZERO
                    };
                    log::info!("all externalized (node.handle: {these_calls} calls, {avg:?} avg time)");
                    last_calls = all_calls;
                    break 'round;
                }

                to_send.push(env);
            }

            while let Ok(event) = rx_timer.try_recv() {
                let slot = match event {
                    TimerEvent::RoundTimeout { slot, .. } => slot,
                    TimerEvent::CounterTimeout { slot, .. } => slot,
                };
                if slot < slot_id {
                    continue;
                }
                for node in nodes.values() {
                    let outbound = match event {
                        TimerEvent::RoundTimeout { round, .. } => node.handle_round_timeout(slot, round),
                        TimerEvent::CounterTimeout { counter, .. } => node.handle_counter_timeout(slot, counter),
                    };
                    if let Ok(Some(env)) = outbound {
                        let _ = tx.send(env);
                    }
                }
            }

            for node in nodes.values() {
                arm_timers(node, slot_id, &mut scheduled_round, &mut scheduled_counter, &tx_timer);
            }

            if !to_send.is_empty() {
                for env in to_send.drain(..) {
                    for (other_id, other_node) in &nodes {
                        if *other_id == env.sender {
                            continue;
                        }
                        let node = Arc::clone(other_node);
                        let env = env.clone();
                        let tx = tx.clone();
                        let delay_ms = if args.delay > 0 {
                            rng.gen_range(0..args.delay)
                        } else {
                            0
                        };
                        tokio::spawn(async move {
                            if delay_ms > 0 {
                                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                            }
                            if let Ok(Some(reply)) = node.handle(env) {
                                let _ = tx.send(reply);
                            }
                        });
                    }
                }
            } else {
                tokio::task::yield_now().await;
            }
        }

        slot_id = slot_id.next();
    }
}
