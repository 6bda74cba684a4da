use crate::cluster::Cluster;
use crate::common::error::DispatchError;
use crate::dispatch::plan::{CommandResourceNeed, JobUnit, plan_jobs};
use crate::dispatch::queue::QueueProfile;

/// Scheduler option carrying the billing account on clusters that demand one.
const ACCOUNT_OPTION: &str = "A";

/// Per-cluster planning policy. The default passes the planner output
/// through unchanged; clusters with extra submission requirements
/// post-process it.
#[derive(Debug, Clone)]
pub enum ClusterVariant {
    Default,
    /// Stamps every planned job with a billing account and refuses to plan
    /// without one.
    AccountTagging { account: Option<String> },
}

impl ClusterVariant {
    /// Select the variant for a detected cluster. The account is resolved by
    /// the caller (from the environment) and is only consulted on clusters
    /// that tag accounts.
    pub fn for_cluster(cluster: Cluster, account: Option<String>) -> ClusterVariant {
        match cluster {
            Cluster::Guillimin => ClusterVariant::AccountTagging { account },
            _ => ClusterVariant::Default,
        }
    }

    /// Produce the final job units for the given commands.
    pub fn plan(
        &self,
        profile: &QueueProfile,
        need: &CommandResourceNeed,
        commands: &[String],
    ) -> crate::Result<Vec<JobUnit>> {
        let jobs = plan_jobs(profile, need, commands)?;
        match self {
            ClusterVariant::Default => Ok(jobs),
            ClusterVariant::AccountTagging { account } => tag_account(jobs, account.as_deref()),
        }
    }
}

fn tag_account(mut jobs: Vec<JobUnit>, account: Option<&str>) -> crate::Result<Vec<JobUnit>> {
    let account = match account {
        Some(account) if !account.is_empty() => account,
        _ => {
            return Err(DispatchError::MissingCredential(
                "This cluster requires a billing account: set $HOME_GROUP to your group directory"
                    .to_string(),
            ));
        }
    };

    for job in &mut jobs {
        job.add_option(ACCOUNT_OPTION, account);
    }
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::Error;
    use crate::cluster::Cluster;
    use crate::dispatch::plan::CommandResourceNeed;
    use crate::dispatch::queue::QueueProfile;
    use crate::dispatch::variant::ClusterVariant;

    fn profile() -> QueueProfile {
        QueueProfile::new(
            "qtest".to_string(),
            Duration::from_secs(3600),
            8,
            0,
            None,
            vec![],
        )
    }

    fn commands() -> Vec<String> {
        vec!["echo a".to_string(), "echo b".to_string()]
    }

    #[test]
    fn test_variant_selection() {
        assert!(matches!(
            ClusterVariant::for_cluster(Cluster::Guillimin, None),
            ClusterVariant::AccountTagging { .. }
        ));
        assert!(matches!(
            ClusterVariant::for_cluster(Cluster::Mammouth, None),
            ClusterVariant::Default
        ));
        assert!(matches!(
            ClusterVariant::for_cluster(Cluster::Unknown, None),
            ClusterVariant::Default
        ));
    }

    #[test]
    fn test_default_passes_planner_output_through() {
        let jobs = ClusterVariant::Default
            .plan(&profile(), &CommandResourceNeed::default(), &commands())
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].options().is_empty());
    }

    #[test]
    fn test_account_is_stamped_on_every_job() {
        let variant = ClusterVariant::AccountTagging {
            account: Some("xyz-123-aa".to_string()),
        };
        let need = CommandResourceNeed {
            cores_per_command: 4,
            gpus_per_command: 1,
        };
        let jobs = variant.plan(&profile(), &need, &commands()).unwrap();
        assert_eq!(jobs.len(), 2);
        for job in &jobs {
            assert_eq!(job.options().get("A").map(String::as_str), Some("xyz-123-aa"));
        }
    }

    #[test]
    fn test_missing_account_fails_after_planning() {
        for account in [None, Some(String::new())] {
            let variant = ClusterVariant::AccountTagging { account };
            let result = variant.plan(&profile(), &CommandResourceNeed::default(), &commands());
            assert!(matches!(result, Err(Error::MissingCredential(_))));
        }
    }

    #[test]
    fn test_planning_errors_win_over_credential_errors() {
        let variant = ClusterVariant::AccountTagging { account: None };
        let need = CommandResourceNeed {
            cores_per_command: 16,
            gpus_per_command: 1,
        };
        let result = variant.plan(&profile(), &need, &commands());
        assert!(matches!(result, Err(Error::UnfittableRequest(_))));
    }
}
