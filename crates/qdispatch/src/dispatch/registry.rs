use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{Read, Seek, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cluster::Cluster;
use crate::common::lockfile::{RetryPolicy, open_with_lock};

/// One dispatched batch, as recorded in the shared registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub cluster: Cluster,
    pub queue: String,
    pub launcher: String,
    pub job_files: Vec<String>,
}

/// Registry contents: batch name to its record.
pub type Registry = BTreeMap<String, BatchRecord>;

/// Read the registry at `path` without taking the lock. A missing or empty
/// file is an empty registry.
pub fn read_registry(path: &Path) -> crate::Result<Registry> {
    match std::fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Ok(Registry::new()),
        Ok(text) => Ok(serde_json::from_str(&text)?),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Registry::new()),
        Err(error) => Err(error.into()),
    }
}

/// Insert `record` under `batch` in the registry at `path`, holding the lock
/// marker for the whole read-modify-write.
///
/// Concurrent invocations may be dispatching into the same registry;
/// exhausting the lock retry budget surfaces as `LockTimeout`.
pub fn record_batch(
    path: &Path,
    batch: &str,
    record: BatchRecord,
    policy: RetryPolicy,
) -> crate::Result<()> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true);

    let mut file = open_with_lock(path, &options, policy)?;

    let mut text = String::new();
    file.read_to_string(&mut text)?;
    let mut registry: Registry = if text.trim().is_empty() {
        Registry::new()
    } else {
        serde_json::from_str(&text)?
    };
    registry.insert(batch.to_string(), record);

    file.set_len(0)?;
    file.rewind()?;
    file.write_all(to_registry_json(&registry)?.as_bytes())?;
    Ok(())
}

/// Serialize with 4-space indentation. Other tools read the registry and
/// expect that layout; the default pretty printer indents by 2.
fn to_registry_json(registry: &Registry) -> crate::Result<String> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    registry.serialize(&mut serializer)?;
    Ok(String::from_utf8(buffer).expect("serde_json emits UTF-8"))
}
