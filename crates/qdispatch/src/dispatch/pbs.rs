use std::fmt::Write;
use std::path::{Path, PathBuf};

use crate::common::timeutils::format_walltime;
use crate::dispatch::plan::JobUnit;

/// File-name prefix of generated job files.
const JOB_FILE_PREFIX: &str = "job_commands_";

/// Render a job unit into the PBS directive format consumed by `qsub`.
///
/// Commands packed onto the same node are started concurrently and the job
/// waits for all of them.
pub fn render_job_file(job: &JobUnit) -> String {
    let mut script = format!(
        r##"#!/bin/bash
#PBS -q {queue}
#PBS -l nodes={resources}
#PBS -l walltime={walltime}
"##,
        queue = job.queue(),
        resources = job.resources(),
        walltime = format_walltime(&job.walltime())
    );

    if let Some(mem) = job.mem() {
        writeln!(script, "#PBS -l mem={mem}gb").unwrap();
    }
    for (key, value) in job.options() {
        writeln!(script, "#PBS -{key} {value}").unwrap();
    }

    if !job.modules().is_empty() {
        script.push('\n');
        for module in job.modules() {
            writeln!(script, "module load {module}").unwrap();
        }
    }

    script.push('\n');
    for command in job.commands() {
        writeln!(script, "{command} &").unwrap();
    }
    script.push_str("wait\n");
    script
}

/// Path of the `index`-th job file inside `directory`.
pub fn job_file_path(directory: &Path, index: usize) -> PathBuf {
    directory.join(format!("{JOB_FILE_PREFIX}{index}.sh"))
}

/// Write one file per job unit into `directory` and return the paths, in
/// planning order.
pub fn write_job_files(directory: &Path, jobs: &[JobUnit]) -> crate::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(directory)?;

    let mut paths = Vec::with_capacity(jobs.len());
    for (index, job) in jobs.iter().enumerate() {
        let path = job_file_path(directory, index);
        std::fs::write(&path, render_job_file(job))?;
        paths.push(path);
    }
    Ok(paths)
}
