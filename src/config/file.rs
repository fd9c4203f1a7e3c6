use serde::Deserialize;
use serde_inline_default::serde_inline_default;
use std::path::Path;
use thiserror::Error;

const DEFAULT_CONFIG: &str = include_str!("../../default.toml");

/// Name of the config file picked up implicitly from the checkout directory.
pub const DEFAULT_CONFIG_FILE: &str = "deploy-helm.toml";

#[derive(Error, Debug)]
pub enum Error {
    #[error("read {path}: {err}")]
    Read { path: String, err: std::io::Error },

    #[error("parse {path}: {err}")]
    Parse { path: String, err: toml::de::Error },
}

/// A deploy-helm.toml file.
///
/// Fields missing from a user file fall back to the same values as the
/// built-in `default.toml`.
#[derive(Deserialize, Debug, Clone)]
pub struct File {
    pub description: Option<String>,
    #[serde(default)]
    pub helm: Helm,
    #[serde(default)]
    pub registry: Registry,
}

impl Default for File {
    fn default() -> Self {
        // The default config is compiled into the program, so
        // make sure to test default() to catch panics compile-time.
        toml::from_str(DEFAULT_CONFIG).unwrap()
    }
}

impl File {
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let display = path.display().to_string();
        let data = std::fs::read_to_string(path).map_err(|err| Error::Read {
            path: display.clone(),
            err,
        })?;
        toml::from_str(&data).map_err(|err| Error::Parse { path: display, err })
    }
}

#[serde_inline_default]
#[derive(Deserialize, Debug, Clone)]
pub struct Helm {
    #[serde_inline_default("helm".into())]
    pub bin: String,
    #[serde_inline_default("./chart".into())]
    pub chart_dir: String,
    #[serde_inline_default(vec!["--three-way-merge".into()])]
    pub diff_flags: Vec<String>,
    #[serde_inline_default(vec!["--install".into(), "--wait".into()])]
    pub upgrade_flags: Vec<String>,
    /// Run diff and upgrade through the helm-secrets wrapper.
    #[serde_inline_default(true)]
    pub secrets_plugin: bool,
    #[serde_inline_default("key.txt".into())]
    pub age_key_secret_field: String,
    pub age_key_file: Option<String>,
}

impl Default for Helm {
    fn default() -> Self {
        toml::from_str("").unwrap()
    }
}

#[serde_inline_default]
#[derive(Deserialize, Debug, Clone)]
pub struct Registry {
    #[serde_inline_default("skopeo".into())]
    pub skopeo_bin: String,
    #[serde_inline_default("/etc/containers/certs.d".into())]
    pub cert_dir: String,
    #[serde_inline_default(true)]
    pub src_tls_verify: bool,
    /// Hostname prefixes of registries that cannot be reached over TLS.
    #[serde_inline_default(vec!["ods-pipeline-registry.kind".into()])]
    pub insecure_hosts: Vec<String>,
    #[serde_inline_default("/var/run/secrets/kubernetes.io/serviceaccount/token".into())]
    pub token_file: String,
}

impl Default for Registry {
    fn default() -> Self {
        toml::from_str("").unwrap()
    }
}
