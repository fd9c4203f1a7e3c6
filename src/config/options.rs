use std::path::PathBuf;

use clap::Args;

use super::file::File;

/// Deployment flags. Each one overrides the matching config file value.
#[derive(Args, Debug, Default, Clone)]
pub struct Flags {
    /// Root of the checkout, holding the `.ods` cache of earlier pipeline stages.
    #[arg(long, env = "DEPLOY_HELM_CHECKOUT_DIR", default_value = ".")]
    pub checkout_dir: PathBuf,

    /// Helm chart directory, relative to the checkout.
    #[arg(long, env = "DEPLOY_HELM_CHART_DIR")]
    pub chart_dir: Option<String>,

    /// Target namespace. Deployment is skipped if empty.
    #[arg(long, env = "DEPLOY_HELM_NAMESPACE", default_value = "")]
    pub namespace: String,

    /// Release name. Defaults to the component name.
    #[arg(long, env = "DEPLOY_HELM_RELEASE_NAME")]
    pub release_name: Option<String>,

    /// API server of a remote target cluster. Empty means the current cluster.
    #[arg(long, env = "DEPLOY_HELM_API_SERVER")]
    pub api_server: Option<String>,

    /// Secret holding the token for the remote API server.
    #[arg(long, env = "DEPLOY_HELM_API_CREDENTIALS_SECRET")]
    pub api_credentials_secret: Option<String>,

    /// Host of the destination registry. Empty means the source registry.
    #[arg(long, env = "DEPLOY_HELM_REGISTRY_HOST")]
    pub registry_host: Option<String>,

    /// Whether to verify TLS of the destination registry.
    #[arg(long, env = "DEPLOY_HELM_REGISTRY_TLS_VERIFY")]
    pub registry_tls_verify: Option<bool>,

    /// Whether to verify TLS of the source registry.
    #[arg(long, env = "DEPLOY_HELM_SRC_REGISTRY_TLS_VERIFY")]
    pub src_registry_tls_verify: Option<bool>,

    /// Directory containing registry certificates.
    #[arg(long, env = "DEPLOY_HELM_CERT_DIR")]
    pub cert_dir: Option<String>,

    #[arg(long, env = "DEPLOY_HELM_DEBUG")]
    pub debug: bool,

    /// Only show the diff, never upgrade the release.
    #[arg(long, env = "DEPLOY_HELM_DIFF_ONLY")]
    pub diff_only: bool,

    /// Store the release status as a deployment artifact.
    #[arg(long, env = "DEPLOY_HELM_GATHER_STATUS")]
    pub gather_status: bool,

    /// Secret holding the age key used by helm-secrets.
    #[arg(long, env = "DEPLOY_HELM_AGE_KEY_SECRET")]
    pub age_key_secret: Option<String>,

    /// Field of the age key secret.
    #[arg(long, env = "DEPLOY_HELM_AGE_KEY_SECRET_FIELD")]
    pub age_key_secret_field: Option<String>,

    /// Extra flag for `helm diff upgrade`. Repeatable, replaces the configured list.
    #[arg(long = "diff-flag", value_name = "FLAG", allow_hyphen_values = true)]
    pub diff_flags: Vec<String>,

    /// Extra flag for `helm upgrade`. Repeatable, replaces the configured list.
    #[arg(long = "upgrade-flag", value_name = "FLAG", allow_hyphen_values = true)]
    pub upgrade_flags: Vec<String>,
}

/// Deployment options, fixed for the whole run.
#[derive(Debug, Clone)]
pub struct Options {
    pub checkout_dir: PathBuf,
    pub chart_dir: String,
    pub namespace: String,
    pub release_name: Option<String>,
    pub api_server: String,
    pub api_credentials_secret: String,
    pub registry_host: String,
    pub registry_tls_verify: Option<bool>,
    pub src_registry_tls_verify: bool,
    pub cert_dir: String,
    pub debug: bool,
    pub diff_only: bool,
    pub gather_status: bool,
    pub age_key_secret: String,
    pub age_key_secret_field: String,
    pub age_key_file: PathBuf,
    pub diff_flags: Vec<String>,
    pub upgrade_flags: Vec<String>,
    pub helm_bin: String,
    pub skopeo_bin: String,
    pub secrets_plugin: bool,
    pub insecure_hosts: Vec<String>,
    pub token_file: PathBuf,
}

impl Options {
    pub fn new(file: File, flags: Flags) -> Self {
        let or_empty = |v: Option<String>| v.unwrap_or_default();
        Self {
            checkout_dir: flags.checkout_dir,
            chart_dir: flags.chart_dir.unwrap_or(file.helm.chart_dir),
            namespace: flags.namespace,
            release_name: flags.release_name.filter(|name| !name.is_empty()),
            api_server: or_empty(flags.api_server),
            api_credentials_secret: or_empty(flags.api_credentials_secret),
            registry_host: or_empty(flags.registry_host),
            registry_tls_verify: flags.registry_tls_verify,
            src_registry_tls_verify: flags
                .src_registry_tls_verify
                .unwrap_or(file.registry.src_tls_verify),
            cert_dir: flags.cert_dir.unwrap_or(file.registry.cert_dir),
            debug: flags.debug,
            diff_only: flags.diff_only,
            gather_status: flags.gather_status,
            age_key_secret: or_empty(flags.age_key_secret),
            age_key_secret_field: flags
                .age_key_secret_field
                .unwrap_or(file.helm.age_key_secret_field),
            age_key_file: file
                .helm
                .age_key_file
                .map(PathBuf::from)
                .unwrap_or_else(default_age_key_file),
            diff_flags: non_empty_or(flags.diff_flags, file.helm.diff_flags),
            upgrade_flags: non_empty_or(flags.upgrade_flags, file.helm.upgrade_flags),
            helm_bin: file.helm.bin,
            skopeo_bin: file.registry.skopeo_bin,
            secrets_plugin: file.helm.secrets_plugin,
            insecure_hosts: file.registry.insecure_hosts,
            token_file: PathBuf::from(file.registry.token_file),
        }
    }
}

fn non_empty_or(flags: Vec<String>, configured: Vec<String>) -> Vec<String> {
    if flags.is_empty() {
        configured
    } else {
        flags
    }
}

/// Where sops looks for age keys.
fn default_age_key_file() -> PathBuf {
    if let Ok(path) = std::env::var("SOPS_AGE_KEY_FILE") {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_default();
    PathBuf::from(home).join(".config/sops/age/keys.txt")
}
