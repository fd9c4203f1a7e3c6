//! Fakes of the external tools, and fixtures shared by the tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::artifact::Image;
use crate::cluster::{self, SecretReader};
use crate::config::file::File;
use crate::config::options::{Flags, Options};
use crate::helm::{self, DiffReport, DiffStatus, Helm, PackageRequest, ReleaseRequest, StatusRequest};
use crate::skopeo::{self, CopyRequest, ImageCopier};

pub fn options() -> Options {
    Options::new(File::default(), Flags::default())
}

pub fn image(registry: &str, repository: &str, name: &str, tag: &str) -> Image {
    Image {
        reference: format!("{registry}/{repository}/{name}:{tag}"),
        registry: registry.to_string(),
        repository: repository.to_string(),
        name: name.to_string(),
        tag: tag.to_string(),
        digest: "sha256:e3b0c44298fc1c149afbf4c8996fb924".to_string(),
    }
}

pub fn write_chart(chart_dir: &Path, name: &str) {
    std::fs::create_dir_all(chart_dir).unwrap();
    std::fs::write(
        chart_dir.join("Chart.yaml"),
        format!("apiVersion: v2\nname: {name}\nversion: 0.1.0\n"),
    )
    .unwrap();
}

/// Sorted file names in `dir`, empty if it does not exist.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    PluginList,
    Package { chart: String, subcharts: Vec<String> },
    Diff(ReleaseRequest),
    Upgrade { request: ReleaseRequest, artifacts: Vec<String> },
    Status(StatusRequest),
}

/// Helm that records its calls. Packaging creates empty archives.
#[derive(Clone)]
pub struct RecordingHelm {
    pub calls: Rc<RefCell<Vec<Call>>>,
    pub diff_status: DiffStatus,
    pub diff_stdout: String,
    /// Listed on upgrade, to see which artifacts existed by then.
    pub artifacts_dir: Option<PathBuf>,
    pub fail_upgrade: bool,
    pub fail_status: bool,
}

fn tool_failure(what: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, format!("{what} exited with code 1"))
}

impl Default for RecordingHelm {
    fn default() -> Self {
        Self::with_diff(DiffStatus::Drift, "")
    }
}

impl RecordingHelm {
    pub fn with_diff(status: DiffStatus, stdout: &str) -> Self {
        Self {
            calls: Rc::new(RefCell::new(vec![])),
            diff_status: status,
            diff_stdout: stdout.to_string(),
            artifacts_dir: None,
            fail_upgrade: false,
            fail_status: false,
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn packaged_charts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Package { chart, .. } => Some(chart),
                _ => None,
            })
            .collect()
    }

    /// Contents of the chart's subcharts directory at the time it was packaged.
    pub fn subcharts_when_packaged(&self, chart: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .find_map(|call| match call {
                Call::Package { chart: c, subcharts } if c == chart => Some(subcharts),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn upgraded(&self) -> bool {
        self.calls()
            .iter()
            .any(|call| matches!(call, Call::Upgrade { .. }))
    }
}

impl Helm for RecordingHelm {
    fn plugin_list(&self, _debug: bool) -> Result<(), helm::Error> {
        self.calls.borrow_mut().push(Call::PluginList);
        Ok(())
    }

    fn package(&self, request: &PackageRequest) -> Result<PathBuf, helm::Error> {
        self.calls.borrow_mut().push(Call::Package {
            chart: request.chart_name.clone(),
            subcharts: file_names(&request.chart_dir.join("charts")),
        });
        let archive = request.archive();
        std::fs::write(&archive, b"")?;
        Ok(archive)
    }

    fn diff(&self, request: &ReleaseRequest) -> Result<DiffReport, helm::Error> {
        self.calls.borrow_mut().push(Call::Diff(request.clone()));
        Ok(DiffReport {
            status: self.diff_status,
            stdout: self.diff_stdout.clone(),
            stderr: "Error: plugin \"diff\" exited with error\n".to_string(),
        })
    }

    fn upgrade(&self, request: &ReleaseRequest) -> Result<String, helm::Error> {
        let artifacts = self
            .artifacts_dir
            .as_deref()
            .map(file_names)
            .unwrap_or_default();
        self.calls.borrow_mut().push(Call::Upgrade {
            request: request.clone(),
            artifacts,
        });
        if self.fail_upgrade {
            return Err(tool_failure("helm upgrade").into());
        }
        Ok(format!(
            "Release \"{}\" does not exist. Installing it now.\nNAMESPACE: {}\nSTATUS: deployed\n",
            request.release_name, request.namespace
        ))
    }

    fn status(&self, request: &StatusRequest) -> Result<String, helm::Error> {
        self.calls.borrow_mut().push(Call::Status(request.clone()));
        if self.fail_status {
            return Err(tool_failure("helm status").into());
        }
        Ok(format!(
            "NAME: {}\nNAMESPACE: {}\nSTATUS: deployed\n",
            request.release_name, request.namespace
        ))
    }
}

/// Image copier that records requests.
#[derive(Clone, Default)]
pub struct RecordingCopier {
    pub requests: Rc<RefCell<Vec<CopyRequest>>>,
    pub fail: bool,
}

impl RecordingCopier {
    pub fn requests(&self) -> Vec<CopyRequest> {
        self.requests.borrow().clone()
    }
}

impl ImageCopier for RecordingCopier {
    fn copy(&self, request: &CopyRequest) -> Result<(), skopeo::Error> {
        self.requests.borrow_mut().push(request.clone());
        if self.fail {
            return Err(skopeo::Error::IOError {
                src: request.src.clone(),
                err: tool_failure("skopeo copy"),
            });
        }
        Ok(())
    }
}

/// Secrets keyed by namespace, name and field.
#[derive(Clone, Default)]
pub struct FakeSecrets {
    pub data: HashMap<(String, String, String), Vec<u8>>,
}

impl FakeSecrets {
    pub fn with(mut self, namespace: &str, name: &str, field: &str, value: &str) -> Self {
        self.data.insert(
            (namespace.into(), name.into(), field.into()),
            value.as_bytes().to_vec(),
        );
        self
    }
}

impl SecretReader for FakeSecrets {
    fn secret_field(&self, namespace: &str, name: &str, field: &str) -> Result<Vec<u8>, cluster::Error> {
        self.data
            .get(&(namespace.to_string(), name.to_string(), field.to_string()))
            .cloned()
            .ok_or_else(|| cluster::Error::SecretNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}
