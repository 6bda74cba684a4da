//! The planning pipeline: resolve a queue profile, pack commands into job
//! units, apply the cluster policy, render and persist PBS job files.

pub mod pbs;
pub mod plan;
pub mod queue;
pub mod registry;
pub mod variant;

pub use plan::{CommandResourceNeed, JobUnit, commands_per_node, plan_jobs};
pub use queue::{QueueProfile, QueueRecord, QueueSpec, QueueTable, load_queue_table};
pub use variant::ClusterVariant;
