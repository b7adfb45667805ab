use std::sync::LazyLock;

use regex::Regex;

use super::script::ScriptRunner;

// Output markers printed by the provisioning script, one per line:
//
//   Container name: <name>
//   Deployment complete: http(s)://<host>[/path]
//
// Either may be absent. The first occurrence of each wins.
static CONTAINER_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Container name:[ \t]*(\S+)[ \t]*\r?$").expect("valid regex")
});

static DEPLOYMENT_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Deployment complete:[ \t]*(https?://\S+)[ \t]*\r?$").expect("valid regex")
});

/// Outcome of one provisioning run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentResult {
    pub environment_name: Option<String>,
    pub url: Option<String>,
    pub succeeded: bool,
}

impl DeploymentResult {
    pub fn failed() -> Self {
        Self::default()
    }

    /// Extract the markers from the stdout of a successful run.
    pub fn from_stdout(stdout: &str) -> Self {
        let first_capture = |re: &Regex| {
            re.captures(stdout)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        };

        Self {
            environment_name: first_capture(&*CONTAINER_NAME),
            url: first_capture(&*DEPLOYMENT_URL),
            succeeded: true,
        }
    }
}

/// Runs the provisioning script for a pull request branch.
#[derive(Debug, Clone)]
pub struct DeploymentRunner {
    runner: ScriptRunner,
}

impl DeploymentRunner {
    pub fn new(runner: ScriptRunner) -> Self {
        Self { runner }
    }

    /// Deploy `branch`. Failures are logged and reported in the result, never returned.
    pub async fn run(&self, branch: &str, pr_number: u64) -> DeploymentResult {
        let output = match self.runner.run(branch, pr_number).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(
                    script = %self.runner.script().display(),
                    branch = branch,
                    pr = pr_number,
                    error = %e,
                    "Deployment script failed"
                );
                return DeploymentResult::failed();
            }
        };

        let result = DeploymentResult::from_stdout(&output.stdout);

        if result.environment_name.is_none() && result.url.is_none() {
            tracing::warn!(
                branch = branch,
                pr = pr_number,
                "Deployment script succeeded but printed no recognised markers"
            );
        } else {
            tracing::info!(
                branch = branch,
                pr = pr_number,
                environment = ?result.environment_name,
                url = ?result.url,
                "Deployment completed"
            );
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_markers() {
        let result = DeploymentResult::from_stdout(
            "Building...\nContainer name: widgets-pr42\nDeployment complete: http://widgets-pr42.example.com\n",
        );
        assert_eq!(
            result,
            DeploymentResult {
                environment_name: Some("widgets-pr42".to_string()),
                url: Some("http://widgets-pr42.example.com".to_string()),
                succeeded: true,
            }
        );
    }

    #[test]
    fn test_markers_in_reverse_order() {
        let result = DeploymentResult::from_stdout(
            "Deployment complete: https://preview.example.com/app\nContainer name: app-7\n",
        );
        assert_eq!(result.environment_name.as_deref(), Some("app-7"));
        assert_eq!(result.url.as_deref(), Some("https://preview.example.com/app"));
    }

    #[test]
    fn test_only_url_marker() {
        let result = DeploymentResult::from_stdout("Deployment complete: http://x.example.com\n");
        assert!(result.succeeded);
        assert_eq!(result.environment_name, None);
        assert_eq!(result.url.as_deref(), Some("http://x.example.com"));
    }

    #[test]
    fn test_first_marker_wins() {
        let result = DeploymentResult::from_stdout(
            "Container name: first\nContainer name: second\n\
             Deployment complete: http://one.example.com\nDeployment complete: http://two.example.com\n",
        );
        assert_eq!(result.environment_name.as_deref(), Some("first"));
        assert_eq!(result.url.as_deref(), Some("http://one.example.com"));
    }

    #[test]
    fn test_markers_must_start_the_line() {
        let result = DeploymentResult::from_stdout(
            "echo Container name: nope\nlog: Deployment complete: http://nope.example.com\n",
        );
        assert_eq!(result.environment_name, None);
        assert_eq!(result.url, None);
        assert!(result.succeeded);
    }

    #[test]
    fn test_url_requires_scheme() {
        let result = DeploymentResult::from_stdout("Deployment complete: ftp://files.example.com\n");
        assert_eq!(result.url, None);
    }

    #[test]
    fn test_crlf_output() {
        let result = DeploymentResult::from_stdout(
            "Container name: win-1\r\nDeployment complete: http://win.example.com\r\n",
        );
        assert_eq!(result.environment_name.as_deref(), Some("win-1"));
        assert_eq!(result.url.as_deref(), Some("http://win.example.com"));
    }

    #[cfg(unix)]
    mod runner {
        use super::super::*;
        use crate::deploy::script::test_support::write_script;
        use std::time::Duration;

        fn runner_for(body: &str) -> (tempfile::TempDir, DeploymentRunner) {
            let tmp = tempfile::tempdir().unwrap();
            let script = write_script(tmp.path(), "provision.sh", body);
            let runner = DeploymentRunner::new(ScriptRunner::new(
                script,
                None,
                Duration::from_secs(10),
            ));
            (tmp, runner)
        }

        #[tokio::test]
        async fn test_successful_deploy() {
            let (_tmp, runner) = runner_for(
                "echo \"Container name: widgets-pr$2\"\necho \"Deployment complete: http://$1.example.com\"\n",
            );
            let result = runner.run("feature-x", 42).await;
            assert_eq!(
                result,
                DeploymentResult {
                    environment_name: Some("widgets-pr42".to_string()),
                    url: Some("http://feature-x.example.com".to_string()),
                    succeeded: true,
                }
            );
        }

        #[tokio::test]
        async fn test_non_zero_exit_ignores_stdout() {
            let (_tmp, runner) = runner_for(
                "echo 'Container name: half-done'\necho 'Deployment complete: http://half.example.com'\nexit 1\n",
            );
            assert_eq!(runner.run("feature-x", 42).await, DeploymentResult::failed());
        }

        #[tokio::test]
        async fn test_success_without_markers() {
            let (_tmp, runner) = runner_for("echo done\n");
            let result = runner.run("feature-x", 42).await;
            assert!(result.succeeded);
            assert_eq!(result.environment_name, None);
            assert_eq!(result.url, None);
        }

        #[tokio::test]
        async fn test_timeout_is_failure() {
            let tmp = tempfile::tempdir().unwrap();
            let script = write_script(tmp.path(), "provision.sh", "sleep 30\n");
            let runner = DeploymentRunner::new(ScriptRunner::new(
                script,
                None,
                Duration::from_millis(200),
            ));
            assert_eq!(runner.run("feature-x", 42).await, DeploymentResult::failed());
        }
    }
}
