//! Per-concern error enums, in the style the rest of this codebase's
//! lineage uses: a small `enum` plus a local `Result` alias, no
//! `anyhow`/`thiserror`.

use std::fmt;

use super::node_id::NodeId;

/// Errors from the priority/neighbor functions of the `G()` family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriorityError {
    /// `G(i, ...)` was invoked for slot `i > 1` before this node had
    /// locally externalized slot `i - 1`. Recoverable: the caller
    /// should defer the computation until the prior slot externalizes.
    NoPreviousValue,
}

impl fmt::Display for PriorityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorityError::NoPreviousValue => write!(f, "no previous value"),
        }
    }
}

impl std::error::Error for PriorityError {}

pub type PriorityResult<T> = Result<T, PriorityError>;

/// Errors raised while validating an inbound envelope's message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// A `PREPARE` envelope violated `PP.X != P.X` or `PP < P`.
    MalformedPrepare,
    /// A ballot counter of zero where a positive counter is required.
    ZeroCounter,
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeError::MalformedPrepare => {
                write!(f, "malformed PREPARE: P and PP must be distinct and ordered")
            }
            EnvelopeError::ZeroCounter => write!(f, "ballot counter must be positive"),
        }
    }
}

impl std::error::Error for EnvelopeError {}

pub type EnvelopeResult<T> = Result<T, EnvelopeError>;

/// Errors a `Slot` can raise while processing an envelope. These are
/// fatal to the owning `Node`: there is no partial-recovery path for a
/// corrupted slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    Envelope(EnvelopeError),
    Priority(PriorityError),
    /// An internally-detected contradiction, e.g. accepted-prepared
    /// shrinking, or a confirmed value changing underfoot.
    Invariant(String),
}

impl fmt::Display for SlotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotError::Envelope(e) => write!(f, "envelope error: {e}"),
            SlotError::Priority(e) => write!(f, "priority error: {e}"),
            SlotError::Invariant(msg) => write!(f, "invariant violation: {msg}"),
        }
    }
}

impl std::error::Error for SlotError {}

impl From<EnvelopeError> for SlotError {
    fn from(e: EnvelopeError) -> Self {
        SlotError::Envelope(e)
    }
}

impl From<PriorityError> for SlotError {
    fn from(e: PriorityError) -> Self {
        SlotError::Priority(e)
    }
}

pub type SlotResult<T> = Result<T, SlotError>;

/// Errors from `Node::handle`. A `Slot` failure is fatal: the design
/// does not attempt to continue with a corrupted slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    Slot(SlotError),
    /// The sender is not a known peer (not `self` and not present in
    /// any slice of the local `QuorumSet`). The core still processes
    /// the envelope, since any positive slot is accepted regardless of
    /// sender; this variant exists for hosts that want to reject it
    /// upstream and is not raised internally.
    UnknownSender(NodeId),
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::Slot(e) => write!(f, "{e}"),
            NodeError::UnknownSender(id) => write!(f, "unknown sender: {id}"),
        }
    }
}

impl std::error::Error for NodeError {}

impl From<SlotError> for NodeError {
    fn from(e: SlotError) -> Self {
        NodeError::Slot(e)
    }
}

pub type NodeResult<T> = Result<T, NodeError>;
