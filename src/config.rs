//! TOML configuration for the `lunch` demo driver, matching the shape
//! `cmd/lunch/main.go` reads via `BurntSushi/toml`:
//! a `[nodes]` table mapping node name to a list of quorum slices,
//! each slice itself a list of node names.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::scp::node_id::NodeId;
use crate::scp::qset::{QuorumSet, QuorumSlice};

#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub nodes: BTreeMap<String, Vec<Vec<String>>>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "reading config file: {e}"),
            ConfigError::Parse(e) => write!(f, "parsing config file: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// A fully-parsed federation: each node's ID paired with its quorum
/// set, in the file's declaration order.
pub fn load(path: &Path) -> ConfigResult<Vec<(NodeId, QuorumSet)>> {
    let text = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let raw: RawConfig = toml::from_str(&text).map_err(ConfigError::Parse)?;

    let mut result = Vec::with_capacity(raw.nodes.len());
    for (name, slices) in raw.nodes {
        let qset = QuorumSet::new(
            slices
                .into_iter()
                .map(|slice| QuorumSlice::new(slice.into_iter().map(NodeId::new))),
        );
        result.push((NodeId::new(name), qset));
    }
    Ok(result)
}
