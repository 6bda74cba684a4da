use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use qdispatch::Error;
use qdispatch::cluster::detect_cluster;
use qdispatch::common::fsutils::absolute_path;
use qdispatch::common::lockfile::RetryPolicy;
use qdispatch::common::setup::setup_logging;
use qdispatch::common::timeutils::parse_walltime;
use qdispatch::dispatch::pbs::write_job_files;
use qdispatch::dispatch::registry::{BatchRecord, record_batch};
use qdispatch::dispatch::{
    ClusterVariant, CommandResourceNeed, QueueProfile, QueueSpec, QueueTable, load_queue_table,
};

const QUEUE_TABLE_FILE: &str = "queues.json";
const REGISTRY_FILE: &str = "job_registry.json";

/// Generates PBS job files that execute the given commands on a cluster
/// queue, packing as many commands per node as the queue's resources allow.
#[derive(Parser)]
#[command(version)]
struct Opts {
    /// Queue to generate job files for.
    #[arg(long, short = 'q')]
    queue: String,

    /// Walltime of each job, `HH:MM:SS` or humantime format (2hours).
    /// Defaults to the queue's maximum walltime.
    #[arg(long, value_parser = parse_walltime)]
    walltime: Option<Duration>,

    /// Number of cores per node. Defaults to the queue table value.
    #[arg(long)]
    cores_per_node: Option<u32>,

    /// Number of GPUs per node. Defaults to the queue table value.
    #[arg(long)]
    gpus_per_node: Option<u32>,

    /// Memory per node in gibibytes. Defaults to the queue table value.
    #[arg(long)]
    mem_per_node: Option<u32>,

    /// Modules to load in each job, overriding the queue defaults.
    #[arg(long, num_args = 1..)]
    modules: Option<Vec<String>>,

    /// Number of cores required by each command.
    #[arg(long, default_value_t = 1)]
    cores_per_command: u32,

    /// Number of GPUs required by each command (ignored on queues without
    /// GPUs).
    #[arg(long, default_value_t = 1)]
    gpus_per_command: u32,

    /// Name under which the batch is recorded in the job registry.
    /// Defaults to the base name of the first command.
    #[arg(long)]
    batch_name: Option<String>,

    /// Directory where job files and the registry are written.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Path of the queue table (JSON). Defaults to
    /// `<config-dir>/qdispatch/queues.json`.
    #[arg(long)]
    queue_table: Option<PathBuf>,

    /// Billing account for clusters that require one. Defaults to the base
    /// name of `$HOME_GROUP`.
    #[arg(long, env = "QDISPATCH_ACCOUNT")]
    account: Option<String>,

    /// Read commands from this file, one per line, instead of the command
    /// line. Blank lines and `#` comments are skipped.
    #[arg(long, short = 'f')]
    commands_file: Option<PathBuf>,

    /// Enable debug output.
    #[arg(long)]
    debug: bool,

    /// The command to dispatch, with its arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() {
    let opts = Opts::parse();
    setup_logging(opts.debug);

    if let Err(error) = run(opts) {
        eprintln!("{error:?}");
        std::process::exit(1);
    }
}

fn run(opts: Opts) -> anyhow::Result<()> {
    let commands = collect_commands(&opts)?;
    if commands.is_empty() {
        anyhow::bail!("No commands given");
    }

    let table = load_table(opts.queue_table.clone())?;
    let spec = QueueSpec {
        walltime: opts.walltime,
        cores_per_node: opts.cores_per_node,
        gpus_per_node: opts.gpus_per_node,
        mem_per_node: opts.mem_per_node,
        modules: opts.modules.clone(),
    };
    let profile = QueueProfile::resolve(&opts.queue, spec, &table)?;
    let need = CommandResourceNeed {
        cores_per_command: opts.cores_per_command,
        gpus_per_command: opts.gpus_per_command,
    };

    let cluster = detect_cluster();
    log::debug!("Detected cluster: {cluster}");
    let account = opts.account.clone().or_else(account_from_env);
    let variant = ClusterVariant::for_cluster(cluster, account);

    let jobs = variant.plan(&profile, &need, &commands)?;

    let output_dir = absolute_path(opts.output_dir.clone());
    let paths = write_job_files(&output_dir, &jobs)?;
    log::info!(
        "Generated {} job file(s) for {} command(s) on queue {}",
        paths.len(),
        commands.len(),
        profile.name()
    );

    let batch = opts
        .batch_name
        .clone()
        .unwrap_or_else(|| default_batch_name(&commands));
    let record = BatchRecord {
        cluster,
        queue: profile.name().to_string(),
        launcher: cluster.launcher().to_string(),
        job_files: paths.iter().map(|p| p.display().to_string()).collect(),
    };
    let registry_path = output_dir.join(REGISTRY_FILE);
    match record_batch(&registry_path, &batch, record, RetryPolicy::default()) {
        Err(Error::LockTimeout { path, attempts }) => {
            log::warn!(
                "Registry {path:?} is still locked after {attempts} attempts; \
                 batch {batch} was not recorded"
            );
        }
        result => result?,
    }

    for path in &paths {
        println!("{}", path.display());
    }
    println!("Submit with: {}", cluster.launcher());
    Ok(())
}

fn collect_commands(opts: &Opts) -> anyhow::Result<Vec<String>> {
    if let Some(path) = &opts.commands_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read commands file {path:?}"))?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect())
    } else if opts.command.is_empty() {
        Ok(Vec::new())
    } else {
        Ok(vec![opts.command.join(" ")])
    }
}

fn load_table(path: Option<PathBuf>) -> anyhow::Result<QueueTable> {
    let path = path.or_else(default_queue_table_path);
    match path {
        Some(path) if path.is_file() => {
            log::debug!("Loading queue table from {path:?}");
            Ok(load_queue_table(&path)?)
        }
        _ => Ok(QueueTable::new()),
    }
}

fn default_queue_table_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("qdispatch").join(QUEUE_TABLE_FILE))
}

/// On account-tagged clusters the billing account is the base name of the
/// user's group directory.
fn account_from_env() -> Option<String> {
    std::env::var("HOME_GROUP").ok().and_then(|group| {
        Path::new(&group)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    })
}

fn default_batch_name(commands: &[String]) -> String {
    commands
        .first()
        .and_then(|command| command.split_whitespace().next())
        .and_then(|word| word.rsplit('/').next())
        .map(str::to_string)
        .unwrap_or_else(|| "batch".to_string())
}
