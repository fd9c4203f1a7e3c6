//! Diff, upgrade and status of the release, and the deployment
//! artifacts recording what happened.

use std::path::{Path, PathBuf};

use log::info;
use thiserror::Error;

use crate::helm::{self, DiffStatus, Helm, ReleaseRequest, StatusRequest};

/// Chart directory whose artifacts carry no prefix.
const DEFAULT_CHART_DIR: &str = "chart";

const DETAILED_EXITCODE_NOTICE: &str = "Error: identified at least one change, exiting with non-zero exit code (detailed-exitcode parameter enabled)";

#[derive(Error, Debug)]
pub enum Error {
    #[error("helm diff: {0}")]
    Diff(helm::Error),

    #[error("helm diff failed with exit code {0:?}")]
    DiffFailed(Option<i32>),

    #[error("helm upgrade: {0}")]
    Upgrade(helm::Error),

    #[error("helm status: {0}")]
    Status(helm::Error),

    #[error("write {path}: {err}")]
    WriteArtifact { path: String, err: std::io::Error },
}

/// What the diff found, or why nothing should be applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Apply,
    Skip(String),
}

pub struct Reconciler<'a> {
    pub helm: &'a dyn Helm,
    pub deployments_dir: PathBuf,
    /// Chart directory as configured, used to name artifacts.
    pub chart_dir: &'a str,
    pub namespace: &'a str,
}

impl Reconciler<'_> {
    /// Diff the release and decide whether to upgrade it. The diff is stored
    /// as an artifact only if an upgrade follows.
    pub fn diff(&self, request: &ReleaseRequest, diff_only: bool) -> Result<Decision, Error> {
        info!("Diffing Helm release against {}...", request.archive.display());
        let report = self.helm.diff(request).map_err(Error::Diff)?;
        print!("{}", report.stdout);
        eprint!("{}", clean_diff_output(&report.stderr));

        let in_sync = match report.status {
            DiffStatus::InSync => true,
            DiffStatus::Drift => false,
            DiffStatus::Failed(code) => return Err(Error::DiffFailed(code)),
        };
        if diff_only {
            return Ok(Decision::Skip(
                "Only diff was requested, skipping helm upgrade.".into(),
            ));
        }
        if in_sync {
            return Ok(Decision::Skip(
                "No diff detected, skipping helm upgrade.".into(),
            ));
        }
        let path = self.artifact_path("diff", ".txt");
        write_artifact(&path, report.stdout.as_bytes())?;
        Ok(Decision::Apply)
    }

    /// Upgrade the release and store the upgrade output as artifact.
    pub fn upgrade(&self, request: &ReleaseRequest) -> Result<PathBuf, Error> {
        info!("Upgrading Helm release to {}...", request.archive.display());
        let output = self.helm.upgrade(request).map_err(Error::Upgrade)?;
        let path = self.artifact_path("release", ".txt");
        write_artifact(&path, output.as_bytes())?;
        Ok(path)
    }

    /// Store the status of the release as YAML artifact.
    pub fn gather_status(&self, request: &StatusRequest) -> Result<PathBuf, Error> {
        info!("Gathering Helm status of release {}...", request.release_name);
        let status = self.helm.status(request).map_err(Error::Status)?;
        let path = self.artifact_path(&format!("release-{}", request.release_name), ".yaml");
        write_artifact(&path, status.as_bytes())?;
        Ok(path)
    }

    fn artifact_path(&self, name: &str, extension: &str) -> PathBuf {
        self.deployments_dir.join(format!(
            "{}{extension}",
            artifact_filename(name, self.chart_dir, self.namespace)
        ))
    }
}

/// `<name>-<namespace>`, prefixed with the chart directory unless it is the
/// default one. Runs against the same namespace overwrite each other.
pub fn artifact_filename(name: &str, chart_dir: &str, namespace: &str) -> String {
    let chart_dir = chart_dir.strip_prefix("./").unwrap_or(chart_dir);
    if chart_dir == DEFAULT_CHART_DIR {
        format!("{name}-{namespace}")
    } else {
        format!("{}-{name}-{namespace}", chart_dir.replace('/', "-"))
    }
}

/// helm-diff reports found changes as errors, which reads like the
/// deployment failed. Reword them.
pub fn clean_diff_output(stderr: &str) -> String {
    if !stderr.contains(DETAILED_EXITCODE_NOTICE) {
        return stderr.to_string();
    }
    stderr
        .lines()
        .filter(|line| !is_plugin_exit_error(line))
        .map(|line| {
            if line.trim() == DETAILED_EXITCODE_NOTICE {
                "Note: Found differences between the current and desired state."
            } else {
                line
            }
        })
        .map(|line| format!("{line}\n"))
        .collect()
}

fn is_plugin_exit_error(line: &str) -> bool {
    let line = line.trim();
    line.starts_with("Error: plugin \"") && line.ends_with("\" exited with error")
}

fn write_artifact(path: &Path, content: &[u8]) -> Result<(), Error> {
    std::fs::write(path, content).map_err(|err| Error::WriteArtifact {
        path: path.display().to_string(),
        err,
    })?;
    info!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingHelm;

    fn reconciler<'a>(helm: &'a RecordingHelm, dir: &Path) -> Reconciler<'a> {
        Reconciler {
            helm,
            deployments_dir: dir.to_path_buf(),
            chart_dir: "./chart",
            namespace: "qa",
        }
    }

    #[test]
    fn artifact_filenames() {
        assert_eq!(artifact_filename("diff", "./chart", "qa"), "diff-qa");
        assert_eq!(artifact_filename("diff", "chart", "qa"), "diff-qa");
        assert_eq!(
            artifact_filename("diff", "./deploy/chart", "qa"),
            "deploy-chart-diff-qa"
        );
        assert_eq!(
            artifact_filename("release-app", "./other", "prod"),
            "other-release-app-prod"
        );
    }

    #[test]
    fn cleans_false_positive_errors() {
        let stderr = format!(
            "some warning\n{DETAILED_EXITCODE_NOTICE}\nError: plugin \"diff\" exited with error\n"
        );
        assert_eq!(
            clean_diff_output(&stderr),
            "some warning\nNote: Found differences between the current and desired state.\n"
        );
        assert_eq!(clean_diff_output(""), "");
    }

    #[test]
    fn keeps_plugin_error_of_failed_diff() {
        let stderr = "Error: UPGRADE FAILED: cannot reach cluster\nError: plugin \"diff\" exited with error\n";
        assert_eq!(clean_diff_output(stderr), stderr);
    }

    #[test]
    fn upgrade_output_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let helm = RecordingHelm::default();
        let path = reconciler(&helm, dir.path())
            .upgrade(&ReleaseRequest::default())
            .unwrap();
        assert_eq!(path, dir.path().join("release-qa.txt"));
        assert!(std::fs::read_to_string(path).unwrap().contains("Installing it now."));
    }

    #[test]
    fn failed_upgrade_writes_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut helm = RecordingHelm::default();
        helm.fail_upgrade = true;
        let err = reconciler(&helm, dir.path())
            .upgrade(&ReleaseRequest::default())
            .unwrap_err();
        assert!(matches!(err, Error::Upgrade(_)));
        assert!(!dir.path().join("release-qa.txt").exists());
    }

    #[test]
    fn failed_status_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut helm = RecordingHelm::default();
        helm.fail_status = true;
        let err = reconciler(&helm, dir.path())
            .gather_status(&StatusRequest::default())
            .unwrap_err();
        assert!(matches!(err, Error::Status(_)));
    }

    #[test]
    fn in_sync_skips_without_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let helm = RecordingHelm::with_diff(DiffStatus::InSync, "");
        let decision = reconciler(&helm, dir.path())
            .diff(&ReleaseRequest::default(), false)
            .unwrap();
        assert_eq!(
            decision,
            Decision::Skip("No diff detected, skipping helm upgrade.".into())
        );
        assert!(!dir.path().join("diff-qa.txt").exists());
    }

    #[test]
    fn diff_only_skips_even_with_drift() {
        let dir = tempfile::tempdir().unwrap();
        let helm = RecordingHelm::with_diff(DiffStatus::Drift, "changes");
        let decision = reconciler(&helm, dir.path())
            .diff(&ReleaseRequest::default(), true)
            .unwrap();
        assert!(matches!(decision, Decision::Skip(reason) if reason.contains("Only diff")));
        assert!(!dir.path().join("diff-qa.txt").exists());
    }

    #[test]
    fn drift_writes_diff_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let helm = RecordingHelm::with_diff(DiffStatus::Drift, "+ kind: Deployment\n");
        let decision = reconciler(&helm, dir.path())
            .diff(&ReleaseRequest::default(), false)
            .unwrap();
        assert_eq!(decision, Decision::Apply);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("diff-qa.txt")).unwrap(),
            "+ kind: Deployment\n"
        );
    }

    #[test]
    fn failed_diff_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let helm = RecordingHelm::with_diff(DiffStatus::Failed(Some(1)), "");
        let err = reconciler(&helm, dir.path())
            .diff(&ReleaseRequest::default(), true)
            .unwrap_err();
        assert!(matches!(err, Error::DiffFailed(Some(1))));
    }

    #[test]
    fn status_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let helm = RecordingHelm::default();
        let path = reconciler(&helm, dir.path())
            .gather_status(&StatusRequest {
                release_name: "app".into(),
                namespace: "qa".into(),
                kube_args: vec![],
            })
            .unwrap();
        assert_eq!(path, dir.path().join("release-app-qa.yaml"));
        assert!(std::fs::read_to_string(path).unwrap().contains("STATUS: deployed"));
    }
}
