//! Release name, release namespace and target environment.

use std::sync::OnceLock;

use regex::Regex;

use crate::config::options::Options;
use crate::context::Context;
use crate::Error;

pub const NAMESPACE_PATTERN: &str = "^[a-z][a-z0-9-]{0,61}[a-z]$";

/// Where the release goes.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TargetEnvironment {
    /// Empty for the cluster this pipeline runs in.
    pub api_server: String,
    pub namespace: String,
    pub api_token: Option<String>,
    /// Empty to promote images within the source registry.
    pub registry_host: String,
    pub registry_tls_verify: Option<bool>,
}

impl TargetEnvironment {
    /// Flags pointing helm at a remote API server, if one is targeted.
    pub fn kube_args(&self) -> Vec<String> {
        if self.api_server.is_empty() {
            return vec![];
        }
        let mut args = vec![format!("--kube-apiserver={}", self.api_server)];
        if let Some(token) = &self.api_token {
            args.push(format!("--kube-token={token}"));
        }
        args
    }
}

/// The explicit release name wins over the component name.
pub fn release_name(opts: &Options, ctxt: &Context) -> String {
    opts.release_name
        .clone()
        .unwrap_or_else(|| ctxt.component.clone())
}

/// Build the target environment. `fetch_token` is only called when a remote
/// API server is configured.
pub fn target_environment<F>(opts: &Options, fetch_token: F) -> Result<TargetEnvironment, Error>
where
    F: FnOnce() -> Result<String, Error>,
{
    let api_token = if opts.api_server.is_empty() {
        None
    } else {
        Some(fetch_token()?)
    };
    Ok(TargetEnvironment {
        api_server: opts.api_server.clone(),
        namespace: opts.namespace.clone(),
        api_token,
        registry_host: opts.registry_host.clone(),
        registry_tls_verify: opts.registry_tls_verify,
    })
}

pub fn validate_namespace(namespace: &str) -> Result<(), Error> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(NAMESPACE_PATTERN).unwrap());
    if pattern.is_match(namespace) {
        Ok(())
    } else {
        Err(Error::InvalidNamespace {
            namespace: namespace.to_string(),
            pattern: NAMESPACE_PATTERN.to_string(),
        })
    }
}
