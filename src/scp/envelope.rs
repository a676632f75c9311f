//! `Envelope`: the (sender, slot, quorum set, message) record that
//! flows between nodes.

use serde::{Deserialize, Serialize};

use super::message::Message;
use super::node_id::NodeId;
use super::qset::QuorumSet;
use super::slot_id::SlotId;
use super::value::Value;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "V: Value")]
pub struct Envelope<V: Value> {
    pub sender: NodeId,
    pub slot: SlotId,
    pub qset: QuorumSet,
    pub message: Message<V>,
}

impl<V: Value> Envelope<V> {
    pub fn new(sender: NodeId, slot: SlotId, qset: QuorumSet, message: Message<V>) -> Self {
        Envelope {
            sender,
            slot,
            qset,
            message,
        }
    }

    /// `true` if `self` is strictly stronger than `previous` under the
    /// inter-message total order, used to decide whether a
    /// newly-computed outbound envelope is actually worth emitting.
    pub fn is_strictly_stronger_than(&self, previous: &Message<V>) -> bool {
        self.message > *previous
    }
}
