use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::error::DispatchError;
use crate::common::timeutils::parse_walltime;

/// One record of the known-queue table, as stored in `queues.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueRecord {
    pub max_walltime: Option<String>,
    pub cores: Option<u32>,
    #[serde(default)]
    pub gpus: u32,
    /// Memory per node, in gibibytes.
    pub ram: Option<u32>,
    #[serde(default)]
    pub modules: Vec<String>,
}

/// Known queues, keyed by queue name. Supplied externally and consulted only
/// to fill fields the caller left unspecified.
pub type QueueTable = BTreeMap<String, QueueRecord>;

pub fn load_queue_table(path: &Path) -> crate::Result<QueueTable> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(file)?)
}

/// Queue attributes given explicitly by the caller. A `None` field falls
/// back to the queue table, then to a hardcoded default where one exists.
#[derive(Debug, Clone, Default)]
pub struct QueueSpec {
    pub walltime: Option<Duration>,
    pub cores_per_node: Option<u32>,
    pub gpus_per_node: Option<u32>,
    pub mem_per_node: Option<u32>,
    pub modules: Option<Vec<String>>,
}

/// A fully resolved scheduling queue.
#[derive(Debug, Clone)]
pub struct QueueProfile {
    name: String,
    walltime: Duration,
    cores_per_node: u32,
    gpus_per_node: u32,
    mem_per_node: Option<u32>,
    modules: Vec<String>,
}

impl QueueProfile {
    pub fn new(
        name: String,
        walltime: Duration,
        cores_per_node: u32,
        gpus_per_node: u32,
        mem_per_node: Option<u32>,
        modules: Vec<String>,
    ) -> Self {
        Self {
            name,
            walltime,
            cores_per_node,
            gpus_per_node,
            mem_per_node,
            modules,
        }
    }

    /// Resolve the profile of queue `name`. Explicit values win over the
    /// queue table; the table wins over the defaults (no GPUs, no modules,
    /// no memory amount). Walltime and cores have no default and must be
    /// known from one of the two sources.
    pub fn resolve(name: &str, spec: QueueSpec, table: &QueueTable) -> crate::Result<QueueProfile> {
        let record = table.get(name);

        let walltime = match spec.walltime {
            Some(walltime) => Some(walltime),
            None => match record.and_then(|r| r.max_walltime.as_deref()) {
                Some(text) => Some(parse_walltime(text).map_err(|e| {
                    DispatchError::ConfigError(format!("Queue {name}: invalid max_walltime: {e}"))
                })?),
                None => None,
            },
        };
        let walltime = walltime.ok_or_else(|| {
            DispatchError::ConfigError(format!(
                "Queue {name}: no walltime given and none known for this queue"
            ))
        })?;

        let cores_per_node = spec
            .cores_per_node
            .or_else(|| record.and_then(|r| r.cores))
            .ok_or_else(|| {
                DispatchError::ConfigError(format!(
                    "Queue {name}: no cores-per-node given and none known for this queue"
                ))
            })?;
        if cores_per_node == 0 {
            return Err(DispatchError::ConfigError(format!(
                "Queue {name}: cores-per-node must be at least 1"
            )));
        }

        let gpus_per_node = spec
            .gpus_per_node
            .unwrap_or_else(|| record.map(|r| r.gpus).unwrap_or(0));
        let mem_per_node = spec.mem_per_node.or_else(|| record.and_then(|r| r.ram));
        let modules = spec
            .modules
            .unwrap_or_else(|| record.map(|r| r.modules.clone()).unwrap_or_default());

        Ok(QueueProfile {
            name: name.to_string(),
            walltime,
            cores_per_node,
            gpus_per_node,
            mem_per_node,
            modules,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn walltime(&self) -> Duration {
        self.walltime
    }

    pub fn cores_per_node(&self) -> u32 {
        self.cores_per_node
    }

    pub fn gpus_per_node(&self) -> u32 {
        self.gpus_per_node
    }

    pub fn mem_per_node(&self) -> Option<u32> {
        self.mem_per_node
    }

    pub fn modules(&self) -> &[String] {
        &self.modules
    }
}
