use std::path::PathBuf;
use std::process::{ExitStatus, Output, Stdio};

use log::debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("helm plugin list failed with exit code {0}")]
    PluginList(ExitStatus),

    #[error("helm package {chart} failed with exit code {status}")]
    Package { chart: String, status: ExitStatus },

    #[error("helm upgrade failed with exit code {0}")]
    Upgrade(ExitStatus),

    #[error("helm status failed with exit code {0}")]
    Status(ExitStatus),

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

/// Package a chart directory into an archive.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageRequest {
    pub chart_dir: PathBuf,
    /// Declared chart name, used to predict the archive name.
    pub chart_name: String,
    pub version: String,
    pub app_version: String,
    pub destination: PathBuf,
    pub debug: bool,
}

impl PackageRequest {
    pub fn archive(&self) -> PathBuf {
        self.destination
            .join(format!("{}-{}.tgz", self.chart_name, self.version))
    }
}

/// Diff or upgrade of a release against a packaged chart.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReleaseRequest {
    pub release_name: String,
    pub namespace: String,
    pub archive: PathBuf,
    pub values_files: Vec<PathBuf>,
    /// `key=value` pairs passed with `--set`.
    pub set_values: Vec<String>,
    /// Remote API server flags, see `TargetEnvironment::kube_args`.
    pub kube_args: Vec<String>,
    /// User supplied flags for the subcommand.
    pub flags: Vec<String>,
    pub debug: bool,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct StatusRequest {
    pub release_name: String,
    pub namespace: String,
    pub kube_args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiffStatus {
    InSync,
    Drift,
    Failed(Option<i32>),
}

/// Captured result of `helm diff`.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffReport {
    pub status: DiffStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Chart and release operations.
pub trait Helm {
    fn plugin_list(&self, debug: bool) -> Result<(), Error>;

    /// Returns the path of the created archive.
    fn package(&self, request: &PackageRequest) -> Result<PathBuf, Error>;

    fn diff(&self, request: &ReleaseRequest) -> Result<DiffReport, Error>;

    /// Returns the output of the upgrade.
    fn upgrade(&self, request: &ReleaseRequest) -> Result<String, Error>;

    /// Returns the release status as YAML.
    fn status(&self, request: &StatusRequest) -> Result<String, Error>;
}

/// The `helm` command line tool.
pub struct HelmCli {
    pub bin: String,
    /// Run diff and upgrade through `helm secrets`.
    pub secrets_plugin: bool,
}

/// Exit code of `helm diff --detailed-exitcode` when changes were found.
const DIFF_DRIFT_EXIT_CODE: i32 = 2;

impl HelmCli {
    pub fn package_args(&self, request: &PackageRequest) -> Vec<String> {
        let mut args = vec![
            "package".to_string(),
            format!("--app-version={}", request.app_version),
            format!("--version={}", request.version),
            format!("--destination={}", request.destination.display()),
        ];
        if request.debug {
            args.push("--debug".to_string());
        }
        args.push(request.chart_dir.display().to_string());
        args
    }

    pub fn diff_args(&self, request: &ReleaseRequest) -> Vec<String> {
        let mut args = self.namespaced(&request.namespace);
        args.extend(
            [
                "diff",
                "upgrade",
                "--detailed-exitcode",
                "--no-color",
                "--normalize-manifests",
            ]
            .map(String::from),
        );
        args.extend(request.flags.iter().cloned());
        args.extend(common_release_args(request));
        args
    }

    pub fn upgrade_args(&self, request: &ReleaseRequest) -> Vec<String> {
        let mut args = self.namespaced(&request.namespace);
        args.push("upgrade".to_string());
        if request.debug {
            args.push("--debug".to_string());
        }
        args.extend(request.flags.iter().cloned());
        args.extend(common_release_args(request));
        args
    }

    pub fn status_args(&self, request: &StatusRequest) -> Vec<String> {
        let mut args = vec![format!("--namespace={}", request.namespace)];
        args.extend(request.kube_args.iter().cloned());
        args.extend(["status", request.release_name.as_str(), "-o", "yaml"].map(String::from));
        args
    }

    fn namespaced(&self, namespace: &str) -> Vec<String> {
        let mut args = vec![format!("--namespace={namespace}")];
        if self.secrets_plugin {
            args.push("secrets".to_string());
        }
        args
    }

    fn command(&self, args: &[String]) -> std::process::Command {
        debug!("{} {}", self.bin, redact(args).join(" "));
        let mut command = std::process::Command::new(&self.bin);
        command.args(args);
        command
    }
}

impl Helm for HelmCli {
    fn plugin_list(&self, debug: bool) -> Result<(), Error> {
        let mut args = vec!["plugin".to_string(), "list".to_string()];
        if debug {
            args.push("--debug".to_string());
        }
        let status = self
            .command(&args)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::PluginList(status))
        }
    }

    fn package(&self, request: &PackageRequest) -> Result<PathBuf, Error> {
        let status = self
            .command(&self.package_args(request))
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()?;
        if status.success() {
            Ok(request.archive())
        } else {
            Err(Error::Package {
                chart: request.chart_dir.display().to_string(),
                status,
            })
        }
    }

    fn diff(&self, request: &ReleaseRequest) -> Result<DiffReport, Error> {
        let Output {
            status,
            stdout,
            stderr,
        } = self.command(&self.diff_args(request)).output()?;
        let status = match status.code() {
            Some(0) => DiffStatus::InSync,
            Some(DIFF_DRIFT_EXIT_CODE) => DiffStatus::Drift,
            code => DiffStatus::Failed(code),
        };
        debug!("helm diff finished: {status:?}");
        Ok(DiffReport {
            status,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    fn upgrade(&self, request: &ReleaseRequest) -> Result<String, Error> {
        let output = self
            .command(&self.upgrade_args(request))
            .stderr(Stdio::inherit())
            .output()?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        // Captured for the release artifact, still shown to the user.
        print!("{stdout}");
        if output.status.success() {
            Ok(stdout)
        } else {
            Err(Error::Upgrade(output.status))
        }
    }

    fn status(&self, request: &StatusRequest) -> Result<String, Error> {
        let output = self
            .command(&self.status_args(request))
            .stderr(Stdio::inherit())
            .output()?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(Error::Status(output.status))
        }
    }
}

/// Arguments shared by diff and upgrade, in the order helm expects them.
fn common_release_args(request: &ReleaseRequest) -> Vec<String> {
    let mut args = request.kube_args.clone();
    args.extend(
        request
            .values_files
            .iter()
            .map(|file| format!("--values={}", file.display())),
    );
    args.extend(request.set_values.iter().map(|value| format!("--set={value}")));
    args.push(request.release_name.clone());
    args.push(request.archive.display().to_string());
    args
}

/// Mask the API token before a command line gets printed.
pub fn redact(args: &[String]) -> Vec<String> {
    args.iter()
        .map(|arg| {
            if arg.starts_with("--kube-token=") {
                "--kube-token=***".to_string()
            } else {
                arg.clone()
            }
        })
        .collect()
}
