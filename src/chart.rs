//! Packaging of the release chart, with the charts of all subrepos
//! embedded as dependencies.

use std::path::{Path, PathBuf};

use log::info;
use serde::Deserialize;
use thiserror::Error;

use crate::context::{self, Subrepo};
use crate::helm::{self, Helm, PackageRequest};

/// Directory in a chart holding packaged dependencies.
pub const SUBCHARTS_DIR: &str = "charts";

#[derive(Error, Debug)]
pub enum Error {
    #[error("read {path}: {err}")]
    ReadFile { path: String, err: std::io::Error },

    #[error("deserialize {path}: {err}")]
    Deserialize { path: String, err: serde_yaml::Error },

    #[error("create {path}: {err}")]
    CreateDir { path: String, err: std::io::Error },

    #[error("copy {from} into {to}: {err}")]
    Copy {
        from: String,
        to: String,
        err: std::io::Error,
    },

    #[error("get commit SHA of {subrepo}: {err}")]
    CommitSha { subrepo: String, err: context::Error },

    #[error("package Helm chart of {chart}: {err}")]
    Package { chart: String, err: helm::Error },
}

/// The parts of Chart.yaml we care about.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Chart {
    pub name: String,
    pub version: String,
}

impl Chart {
    pub fn read(chart_dir: &Path) -> Result<Self, Error> {
        let path = chart_dir.join("Chart.yaml");
        let display = path.display().to_string();
        let data = std::fs::read_to_string(&path).map_err(|err| Error::ReadFile {
            path: display.clone(),
            err,
        })?;
        serde_yaml::from_str(&data).map_err(|err| Error::Deserialize { path: display, err })
    }
}

/// Everything needed to package the release chart.
pub struct Assembly<'a> {
    /// Top-level chart directory.
    pub chart_dir: PathBuf,
    /// Chart directory relative to a checkout, used to find subrepo charts.
    pub chart_subpath: &'a str,
    pub subrepos: &'a [Subrepo],
    pub git_commit_sha: &'a str,
    /// Subcharts get a fullname override when the release carries the component name.
    pub override_fullnames: bool,
    /// Where packaged archives are written.
    pub destination: PathBuf,
    pub debug: bool,
}

/// Result of packaging: the archive and the `--set` values pinning image tags.
#[derive(Debug, Clone, PartialEq)]
pub struct Packaged {
    pub archive: PathBuf,
    pub set_values: Vec<String>,
}

impl Assembly<'_> {
    /// Package every subrepo chart into the subcharts directory, then the
    /// top-level chart.
    pub fn package(&self, helm: &dyn Helm) -> Result<Packaged, Error> {
        let mut set_values = vec![format!("image.tag={}", self.git_commit_sha)];

        info!("Adding dependencies from subrepos into the {SUBCHARTS_DIR}/ directory ...");
        let charts_dir = self.chart_dir.join(SUBCHARTS_DIR);
        std::fs::create_dir_all(&charts_dir).map_err(|err| Error::CreateDir {
            path: charts_dir.display().to_string(),
            err,
        })?;

        for subrepo in self.subrepos {
            let subchart = subrepo.path.join(self.chart_subpath);
            if !subchart.is_dir() {
                info!("No chart in {}", subrepo.name);
                continue;
            }
            let git_commit_sha = subrepo.git_commit_sha().map_err(|err| Error::CommitSha {
                subrepo: subrepo.name.clone(),
                err,
            })?;
            let chart = Chart::read(&subchart)?;
            set_values.push(format!("{}.image.tag={git_commit_sha}", chart.name));
            if self.override_fullnames {
                set_values.push(format!("{0}.fullnameOverride={0}", chart.name));
            }

            let archive = self.package_chart(helm, &subchart, &chart, &git_commit_sha)?;
            let archive_name = archive.file_name().unwrap_or_default();
            let target = charts_dir.join(archive_name);
            info!(
                "Copying {} into {}",
                archive_name.to_string_lossy(),
                charts_dir.display()
            );
            std::fs::copy(&archive, &target).map_err(|err| Error::Copy {
                from: archive.display().to_string(),
                to: target.display().to_string(),
                err,
            })?;
        }

        self.log_subcharts(&charts_dir);

        info!("Packaging Helm chart ...");
        let chart = Chart::read(&self.chart_dir)?;
        let archive = self.package_chart(helm, &self.chart_dir, &chart, self.git_commit_sha)?;
        Ok(Packaged {
            archive,
            set_values,
        })
    }

    fn package_chart(
        &self,
        helm: &dyn Helm,
        chart_dir: &Path,
        chart: &Chart,
        git_commit_sha: &str,
    ) -> Result<PathBuf, Error> {
        let request = PackageRequest {
            chart_dir: chart_dir.to_path_buf(),
            chart_name: chart.name.clone(),
            version: format!("{}+{git_commit_sha}", chart.version),
            app_version: git_commit_sha.to_string(),
            destination: self.destination.clone(),
            debug: self.debug,
        };
        helm.package(&request).map_err(|err| Error::Package {
            chart: chart.name.clone(),
            err,
        })
    }

    fn log_subcharts(&self, charts_dir: &Path) {
        let Ok(entries) = std::fs::read_dir(charts_dir) else {
            return;
        };
        let mut names = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        if names.is_empty() {
            return;
        }
        names.sort();
        info!("Subcharts in {}:", charts_dir.display());
        for name in names {
            info!("{name}");
        }
    }
}
