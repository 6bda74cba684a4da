use std::fmt::{Display, Formatter};
use std::process::Command;

use bstr::ByteSlice;
use serde::{Deserialize, Serialize};

/// Clusters with known submission quirks. Everything else is `Unknown`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cluster {
    Mammouth,
    Guillimin,
    Helios,
    Unknown,
}

impl Cluster {
    /// Program used to submit the generated job files on this cluster.
    pub fn launcher(&self) -> &'static str {
        match self {
            Cluster::Helios => "msub",
            _ => "qsub",
        }
    }
}

impl Display for Cluster {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Cluster::Mammouth => f.write_str("mammouth"),
            Cluster::Guillimin => f.write_str("guillimin"),
            Cluster::Helios => f.write_str("helios"),
            Cluster::Unknown => f.write_str("unknown"),
        }
    }
}

/// Identify the cluster from the output of `qstat -B`.
///
/// The server name sits in the first column of the third line (after the
/// header and its underline); the trailing domain component selects the
/// cluster.
pub fn parse_cluster_name(output: &str) -> Cluster {
    let server_name = output
        .lines()
        .nth(2)
        .and_then(|line| line.split(' ').next())
        .unwrap_or("");

    match server_name.split('.').next_back() {
        Some("m") => Cluster::Mammouth,
        Some("guil") => Cluster::Guillimin,
        Some("helios") => Cluster::Helios,
        _ => Cluster::Unknown,
    }
}

/// Detect the cluster by querying the scheduler server status.
/// A missing `qstat` binary or a failing command selects `Unknown`.
pub fn detect_cluster() -> Cluster {
    log::debug!("Running PBS command `qstat -B`");
    let result = Command::new("qstat").arg("-B").output();

    let output = match result {
        Ok(output) if output.status.success() => output.stdout,
        Ok(output) => {
            log::debug!(
                "qstat exited with {}: {}",
                output.status,
                output.stderr.to_str_lossy().trim()
            );
            return Cluster::Unknown;
        }
        Err(error) => {
            log::debug!("Cannot run qstat: {error}");
            return Cluster::Unknown;
        }
    };

    parse_cluster_name(&output.to_str_lossy())
}
