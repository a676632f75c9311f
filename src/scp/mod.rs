pub mod ballot;
pub mod ballot_protocol;
pub mod envelope;
pub mod error;
pub mod federated_vote;
pub mod message;
pub mod node;
pub mod node_id;
pub mod nomination;
pub mod priority;
pub mod qset;
pub mod slot;
pub mod slot_id;
pub mod timers;
pub mod value;
