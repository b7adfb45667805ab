use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use crate::config::ScriptsConfig;
use crate::error::{AppError, Result};

/// Captured output of a script that exited successfully.
#[derive(Debug, Clone, Default)]
pub struct ScriptOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Validate a branch name to prevent argument injection.
/// Rejects names starting with `-` as defence in depth.
pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('-') {
        return Err(AppError::ScriptExecution(format!(
            "Invalid branch name: {name:?}"
        )));
    }
    Ok(())
}

/// An external executable invoked as `<script> <branch> <pr_number>`.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    script: PathBuf,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl ScriptRunner {
    pub fn new(script: impl Into<PathBuf>, working_dir: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            script: script.into(),
            working_dir,
            timeout,
        }
    }

    pub fn provision(config: &ScriptsConfig) -> Self {
        Self::new(&config.provision, config.working_dir.clone(), config.timeout())
    }

    pub fn cleanup(config: &ScriptsConfig) -> Self {
        Self::new(&config.cleanup, config.working_dir.clone(), config.timeout())
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Run the script for a branch and PR, bounded by the configured timeout.
    ///
    /// A non-zero exit is `ScriptExecution` carrying the exit code and stderr.
    /// On timeout the script's whole process group is killed and `ScriptTimeout`
    /// is returned.
    pub async fn run(&self, branch: &str, pr_number: u64) -> Result<ScriptOutput> {
        validate_branch_name(branch)?;

        let mut command = tokio::process::Command::new(&self.script);
        command
            .arg(branch)
            .arg(pr_number.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout reaches everything the script started.
        #[cfg(unix)]
        command.process_group(0);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        tracing::info!(
            script = %self.script.display(),
            branch = branch,
            pr = pr_number,
            "Running script"
        );

        let child = command.spawn().map_err(|e| {
            AppError::ScriptExecution(format!("Failed to spawn {}: {e}", self.script.display()))
        })?;
        let pid = child.id();

        // Dropping the output future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| {
                AppError::ScriptExecution(format!(
                    "Failed to wait for {}: {e}",
                    self.script.display()
                ))
            })?,
            Err(_) => {
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                return Err(AppError::ScriptTimeout {
                    script: self.script.display().to_string(),
                    timeout: self.timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(AppError::ScriptExecution(format!(
                "{} exited with {code}: {}",
                self.script.display(),
                stderr.trim()
            )));
        }

        Ok(ScriptOutput { stdout, stderr })
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        // ESRCH: the group already exited.
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pgid = pgid, error = %e, "Failed to kill script process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}
