//! Deploy a Helm chart, together with the charts of all subrepos, into a
//! target namespace.
//!
//! Images built earlier in the pipeline are promoted into the release
//! namespace, the chart is packaged with pinned image tags, and the
//! release is only upgraded when `helm diff` finds drift.

use thiserror::Error;

pub mod artifact;
pub mod chart;
pub mod cluster;
pub mod config;
pub mod context;
pub mod deploy;
pub mod helm;
pub mod pipeline;
pub mod promote;
pub mod reconcile;
pub mod skopeo;
pub mod target;
pub mod values;

#[cfg(test)]
mod testing;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration file: {0}")]
    ConfigFile(#[from] config::file::Error),

    #[error(transparent)]
    Context(#[from] context::Error),

    #[error("create {path}: {err}")]
    CreateDir { path: String, err: std::io::Error },

    #[error("release namespace: {namespace} must match {pattern}")]
    InvalidNamespace { namespace: String, pattern: String },

    #[error("no API credentials secret configured for API server {0}")]
    MissingCredentialsSecret(String),

    #[error("get API token from secret {secret}: {err}")]
    ApiToken { secret: String, err: cluster::Error },

    #[error("kubernetes client: {0}")]
    Cluster(#[from] cluster::Error),

    #[error(transparent)]
    Artifact(#[from] artifact::Error),

    #[error("get destination registry token: {0}")]
    RegistryToken(context::Error),

    #[error("copy image {name}: {err}")]
    CopyImage { name: String, err: skopeo::Error },

    #[error("list Helm plugins: {0}")]
    PluginList(helm::Error),

    #[error(transparent)]
    Chart(#[from] chart::Error),

    #[error("store age key: {0}")]
    StoreAgeKey(std::io::Error),

    #[error(transparent)]
    Reconcile(#[from] reconcile::Error),
}
