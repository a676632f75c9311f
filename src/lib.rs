pub mod config;
pub mod scp;

pub use scp::ballot::Ballot;
pub use scp::ballot_protocol::BallotState;
pub use scp::envelope::Envelope;
pub use scp::error::{NodeError, NodeResult, SlotError, SlotResult};
pub use scp::message::Message;
pub use scp::node::Node;
pub use scp::node_id::NodeId;
pub use scp::nomination::NominationState;
pub use scp::priority::{leader_set, neighbors, priority};
pub use scp::qset::{QuorumSet, QuorumSlice};
pub use scp::slot::{Phase, Slot};
pub use scp::slot_id::SlotId;
pub use scp::value::Value;
