//! Quality gates run on `STATUS: DONE` (spec §4.4 termination-gate step 1).
//! The configured gate commands run inside the worktree; the first failure
//! stops the run and its output is what gets logged and posted.

use std::path::Path;

use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub passed: bool,
    /// The command that failed, if any.
    pub failed_command: Option<String>,
    pub output: String,
}

pub async fn run_gates(worktree: &Path, gates: &[String]) -> GateOutcome {
    let mut output = String::new();
    for gate in gates {
        let result = Command::new("sh")
            .arg("-c")
            .arg(gate)
            .current_dir(worktree)
            .output()
            .await;

        let (success, combined) = match result {
            Ok(out) => (
                out.status.success(),
                format!(
                    "$ {gate}\n{}{}",
                    String::from_utf8_lossy(&out.stdout),
                    String::from_utf8_lossy(&out.stderr)
                ),
            ),
            Err(e) => (false, format!("$ {gate}\nfailed to run: {e}")),
        };

        output.push_str(&combined);
        output.push('\n');

        if !success {
            return GateOutcome {
                passed: false,
                failed_command: Some(gate.clone()),
                output,
            };
        }
    }
    GateOutcome { passed: true, failed_command: None, output }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn all_gates_passing_reports_success() {
        let tmp = tempdir().unwrap();
        let gates = vec!["true".to_string(), "echo ok".to_string()];
        let outcome = run_gates(tmp.path(), &gates).await;
        assert!(outcome.passed);
        assert!(outcome.output.contains("ok"));
    }

    #[tokio::test]
    async fn first_failure_stops_and_is_reported() {
        let tmp = tempdir().unwrap();
        let gates = vec!["false".to_string(), "echo should-not-run".to_string()];
        let outcome = run_gates(tmp.path(), &gates).await;
        assert!(!outcome.passed);
        assert_eq!(outcome.failed_command.as_deref(), Some("false"));
        assert!(!outcome.output.contains("should-not-run"));
    }
}
