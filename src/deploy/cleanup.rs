use super::script::ScriptRunner;

/// Runs the teardown script for a pull request branch.
#[derive(Debug, Clone)]
pub struct CleanupRunner {
    runner: ScriptRunner,
}

impl CleanupRunner {
    pub fn new(runner: ScriptRunner) -> Self {
        Self { runner }
    }

    /// Tear down the environment for `branch`. Returns whether the script succeeded.
    pub async fn run(&self, branch: &str, pr_number: u64) -> bool {
        match self.runner.run(branch, pr_number).await {
            Ok(_) => {
                tracing::info!(branch = branch, pr = pr_number, "Cleanup completed");
                true
            }
            Err(e) => {
                tracing::warn!(
                    script = %self.runner.script().display(),
                    branch = branch,
                    pr = pr_number,
                    error = %e,
                    "Cleanup script failed"
                );
                false
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::deploy::script::test_support::write_script;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cleanup_success_and_args() {
        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("calls.log");
        let script = write_script(
            tmp.path(),
            "cleanup.sh",
            &format!("echo \"$1 $2\" >> {}\n", log.display()),
        );
        let runner = CleanupRunner::new(ScriptRunner::new(script, None, Duration::from_secs(10)));

        assert!(runner.run("feature-x", 42).await);
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "feature-x 42\n");
    }

    #[tokio::test]
    async fn test_cleanup_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "cleanup.sh", "exit 2\n");
        let runner = CleanupRunner::new(ScriptRunner::new(script, None, Duration::from_secs(10)));

        assert!(!runner.run("feature-x", 42).await);
    }

    #[tokio::test]
    async fn test_cleanup_timeout() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "cleanup.sh", "sleep 30\n");
        let runner = CleanupRunner::new(ScriptRunner::new(
            script,
            None,
            Duration::from_millis(200),
        ));

        assert!(!runner.run("feature-x", 42).await);
    }
}
