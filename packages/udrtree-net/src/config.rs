//! TOML configuration for replicas and the relay.

use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use udrtree_core::{RemovePolicy, ReplicaId};

use crate::compactor::DEFAULT_COMPACTION_INTERVAL;
use crate::error::{NetError, Result};
use crate::link::DEFAULT_QUEUE_CAPACITY;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReplicaConfig {
    pub replica_id: u64,
    /// Every replica in the system. Compaction waits until each one has been heard from.
    pub replicas: Vec<u64>,
    pub relay_addr: String,
    /// Bound of each peer's outgoing queue.
    pub queue_capacity: usize,
    pub compaction_interval_ms: u64,
    pub remove_policy: RemovePolicy,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            replica_id: 0,
            replicas: Vec::new(),
            relay_addr: "127.0.0.1:7400".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            compaction_interval_ms: DEFAULT_COMPACTION_INTERVAL.as_millis() as u64,
            remove_policy: RemovePolicy::Strict,
        }
    }
}

impl ReplicaConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_toml(path.as_ref())
    }

    pub fn replica(&self) -> ReplicaId {
        ReplicaId(self.replica_id)
    }

    pub fn replica_set(&self) -> impl Iterator<Item = ReplicaId> + '_ {
        self.replicas.iter().copied().map(ReplicaId)
    }

    pub fn compaction_interval(&self) -> Duration {
        Duration::from_millis(self.compaction_interval_ms)
    }

    /// A replica can only judge stability against a declared replica set.
    pub fn validate(&self) -> Result<()> {
        if self.replicas.is_empty() {
            return Err(NetError::Config(
                "`replicas` must list every replica in the system".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelayConfig {
    pub listen_addr: String,
    pub max_connections: usize,
    /// Bound of the queue of frames waiting to be forwarded.
    pub queue_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7400".to_string(),
            max_connections: 10,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl RelayConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_toml(path.as_ref())
    }
}

fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| NetError::Config(format!("failed to read {}: {e}", path.display())))?;
    toml::from_str(&content)
        .map_err(|e| NetError::Config(format!("failed to parse {}: {e}", path.display())))
}
