use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::Duration;

use crate::common::error::DispatchError;
use crate::dispatch::queue::QueueProfile;

/// Resources consumed by a single command.
#[derive(Debug, Clone, Copy)]
pub struct CommandResourceNeed {
    pub cores_per_command: u32,
    pub gpus_per_command: u32,
}

impl Default for CommandResourceNeed {
    fn default() -> Self {
        Self {
            cores_per_command: 1,
            gpus_per_command: 1,
        }
    }
}

/// One submittable job: a single node's resource request plus the commands
/// that share it. Built by the planner, optionally stamped with extra
/// scheduler options by a cluster variant, then rendered to a job file.
#[derive(Debug, Clone, PartialEq)]
pub struct JobUnit {
    queue: String,
    walltime: Duration,
    resources: String,
    mem: Option<u32>,
    modules: Vec<String>,
    commands: Vec<String>,
    options: BTreeMap<String, String>,
}

impl JobUnit {
    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn walltime(&self) -> Duration {
        self.walltime
    }

    /// Node request in PBS syntax, e.g. `1:ppn=4:gpus=2`.
    pub fn resources(&self) -> &str {
        &self.resources
    }

    /// Memory request in gibibytes, when the queue resolved one.
    pub fn mem(&self) -> Option<u32> {
        self.mem
    }

    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Extra scheduler options, rendered as `#PBS -<key> <value>`.
    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    pub fn add_option(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.options.insert(key.into(), value.into());
    }
}

/// How many commands fit onto one node of `profile`, given the per-command
/// resource need. Cores always bound the count; GPUs tighten it on queues
/// that offer them.
pub fn commands_per_node(
    profile: &QueueProfile,
    need: &CommandResourceNeed,
) -> crate::Result<usize> {
    if need.cores_per_command == 0 || need.gpus_per_command == 0 {
        return Err(DispatchError::ConfigError(
            "Per-command core and GPU requirements must be at least 1".to_string(),
        ));
    }
    if profile.cores_per_node() == 0 {
        return Err(DispatchError::ConfigError(format!(
            "Queue {}: cores-per-node must be at least 1",
            profile.name()
        )));
    }

    let mut count = profile.cores_per_node() / need.cores_per_command;
    if profile.gpus_per_node() > 0 {
        count = count.min(profile.gpus_per_node() / need.gpus_per_command);
    }

    if count < 1 {
        return Err(DispatchError::UnfittableRequest(format!(
            "A command requiring {} core(s) and {} GPU(s) does not fit onto one {} node \
             ({} cores, {} GPUs)",
            need.cores_per_command,
            need.gpus_per_command,
            profile.name(),
            profile.cores_per_node(),
            profile.gpus_per_node()
        )));
    }
    Ok(count as usize)
}

/// Pack `commands` into job units for `profile`, preserving their order.
/// Every unit except possibly the last holds exactly [`commands_per_node`]
/// commands; an empty command list yields no units.
pub fn plan_jobs(
    profile: &QueueProfile,
    need: &CommandResourceNeed,
    commands: &[String],
) -> crate::Result<Vec<JobUnit>> {
    let per_node = commands_per_node(profile, need)?;

    Ok(commands
        .chunks(per_node)
        .map(|group| JobUnit {
            queue: profile.name().to_string(),
            walltime: profile.walltime(),
            resources: node_resources(profile, need, group.len()),
            mem: profile.mem_per_node(),
            modules: profile.modules().to_vec(),
            commands: group.to_vec(),
            options: BTreeMap::new(),
        })
        .collect())
}

/// Resource request for one node shared by `count` commands.
fn node_resources(profile: &QueueProfile, need: &CommandResourceNeed, count: usize) -> String {
    let mut resources = format!("1:ppn={}", count as u32 * need.cores_per_command);
    if profile.gpus_per_node() > 0 {
        write!(resources, ":gpus={}", count as u32 * need.gpus_per_command).unwrap();
    }
    resources
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::Error;
    use crate::dispatch::plan::{CommandResourceNeed, commands_per_node, plan_jobs};
    use crate::dispatch::queue::QueueProfile;

    fn profile(cores: u32, gpus: u32) -> QueueProfile {
        QueueProfile::new(
            "qtest".to_string(),
            Duration::from_secs(3600),
            cores,
            gpus,
            None,
            vec![],
        )
    }

    fn need(cores: u32, gpus: u32) -> CommandResourceNeed {
        CommandResourceNeed {
            cores_per_command: cores,
            gpus_per_command: gpus,
        }
    }

    fn commands(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("./run.sh {i}")).collect()
    }

    #[test]
    fn test_gpu_aware_packing() {
        // 8 cores / 2 = 4, tightened by 2 GPUs / 1 = 2
        assert_eq!(commands_per_node(&profile(8, 2), &need(2, 1)).unwrap(), 2);
    }

    #[test]
    fn test_node_only_packing() {
        assert_eq!(commands_per_node(&profile(12, 0), &need(4, 1)).unwrap(), 3);
    }

    #[test]
    fn test_unfittable_request() {
        assert!(matches!(
            commands_per_node(&profile(4, 0), &need(8, 1)),
            Err(Error::UnfittableRequest(_))
        ));
        assert!(matches!(
            plan_jobs(&profile(4, 0), &need(8, 1), &commands(3)),
            Err(Error::UnfittableRequest(_))
        ));
    }

    #[test]
    fn test_unfittable_gpu_request() {
        assert!(matches!(
            commands_per_node(&profile(8, 2), &need(1, 4)),
            Err(Error::UnfittableRequest(_))
        ));
    }

    #[test]
    fn test_zero_need_is_rejected() {
        assert!(matches!(
            commands_per_node(&profile(8, 0), &need(0, 1)),
            Err(Error::ConfigError(_))
        ));
        assert!(matches!(
            commands_per_node(&profile(8, 2), &need(1, 0)),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_empty_command_list() {
        let jobs = plan_jobs(&profile(8, 0), &need(1, 1), &[]).unwrap();
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_partition_preserves_order_and_sizes() {
        let input = commands(5);
        let jobs = plan_jobs(&profile(8, 0), &need(4, 1), &input).unwrap();

        // ceil(5 / 2) groups: [2, 2, 1]
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[0].commands().len(), 2);
        assert_eq!(jobs[1].commands().len(), 2);
        assert_eq!(jobs[2].commands().len(), 1);

        let rejoined: Vec<String> = jobs
            .iter()
            .flat_map(|job| job.commands().iter().cloned())
            .collect();
        assert_eq!(rejoined, input);
    }

    #[test]
    fn test_exact_partition() {
        let jobs = plan_jobs(&profile(12, 0), &need(4, 1), &commands(6)).unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|job| job.commands().len() == 3));
    }

    #[test]
    fn test_resource_strings() {
        let jobs = plan_jobs(&profile(8, 2), &need(2, 1), &commands(3)).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].resources(), "1:ppn=4:gpus=2");
        // The trailing group only requests what its single command needs
        assert_eq!(jobs[1].resources(), "1:ppn=2:gpus=1");
    }

    #[test]
    fn test_resource_string_without_gpus() {
        let jobs = plan_jobs(&profile(12, 0), &need(4, 1), &commands(3)).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].resources(), "1:ppn=12");
        assert!(!jobs[0].resources().contains("gpus"));
    }

    #[test]
    fn test_job_unit_carries_queue_attributes() {
        let profile = QueueProfile::new(
            "gpu_1".to_string(),
            Duration::from_secs(7200),
            8,
            2,
            Some(46),
            vec!["cuda/7.5".to_string()],
        );
        let jobs = plan_jobs(&profile, &need(2, 1), &commands(2)).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].queue(), "gpu_1");
        assert_eq!(jobs[0].walltime(), Duration::from_secs(7200));
        assert_eq!(jobs[0].mem(), Some(46));
        assert_eq!(jobs[0].modules(), ["cuda/7.5".to_string()]);
        assert!(jobs[0].options().is_empty());
    }
}
