//! Reading secrets from the Kubernetes API.

use std::path::Path;

use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::Client;
use log::debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("secret {name} not found in namespace {namespace}")]
    SecretNotFound { namespace: String, name: String },

    #[error("secret {name} has no field {field}")]
    FieldMissing { name: String, field: String },

    #[error("kubernetes api: {0}")]
    Api(#[from] kube::Error),

    #[error("start async runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Read access to secrets.
pub trait SecretReader {
    /// Returns the raw value of `field` in secret `name`.
    fn secret_field(&self, namespace: &str, name: &str, field: &str) -> Result<Vec<u8>, Error>;
}

/// Secrets read through the default Kubernetes client, in-cluster config
/// or kubeconfig.
pub struct KubeSecrets {
    runtime: tokio::runtime::Runtime,
}

impl KubeSecrets {
    pub fn new() -> Result<Self, Error> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self { runtime })
    }
}

impl SecretReader for KubeSecrets {
    fn secret_field(&self, namespace: &str, name: &str, field: &str) -> Result<Vec<u8>, Error> {
        debug!("Reading secret {name} in namespace {namespace}");
        let secret = self.runtime.block_on(async {
            let client = Client::try_default().await?;
            let secrets: Api<Secret> = Api::namespaced(client, namespace);
            Ok::<_, kube::Error>(secrets.get_opt(name).await?)
        })?;
        let secret = secret.ok_or_else(|| Error::SecretNotFound {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })?;
        secret
            .data
            .and_then(|mut data| data.remove(field))
            .map(|value| value.0)
            .ok_or_else(|| Error::FieldMissing {
                name: name.to_string(),
                field: field.to_string(),
            })
    }
}

/// Write the age key where sops picks it up.
pub fn store_age_key(key: &[u8], path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, key)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
