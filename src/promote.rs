//! Promotion of built images into the release namespace.

use std::path::Path;

use log::info;

use crate::artifact::Image;
use crate::config::options::Options;
use crate::context;
use crate::skopeo::CopyRequest;
use crate::target::TargetEnvironment;

/// TLS verification of both ends of a copy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TlsVerify {
    pub src: bool,
    pub dest: bool,
}

/// The destination follows the source registry setting, unless the source
/// is a known plain-HTTP registry. An explicit setting for a separate
/// destination registry always wins for the destination.
pub fn tls_verify(
    image: &Image,
    src_registry_tls_verify: bool,
    insecure_hosts: &[String],
    target: &TargetEnvironment,
) -> TlsVerify {
    let mut verify = TlsVerify {
        src: src_registry_tls_verify,
        dest: src_registry_tls_verify,
    };
    if insecure_hosts
        .iter()
        .any(|host| image.registry.starts_with(host.as_str()))
    {
        verify.src = false;
        verify.dest = false;
    }
    if !target.registry_host.is_empty() {
        if let Some(dest) = target.registry_tls_verify {
            verify.dest = dest;
        }
    }
    verify
}

/// `host/namespace/name:tag` for a separate registry, otherwise the source
/// reference with its repository swapped for the release namespace.
pub fn dest_image_url(registry_host: &str, release_namespace: &str, image: &Image) -> String {
    if registry_host.is_empty() {
        image.reference.replace(
            &format!("/{}/", image.repository),
            &format!("/{release_namespace}/"),
        )
    } else {
        format!(
            "{registry_host}/{release_namespace}/{}:{}",
            image.name, image.tag
        )
    }
}

/// Token for the destination registry: the remote cluster token if there is
/// one, else the service account token of this pod.
pub fn registry_token(target: &TargetEnvironment, token_file: &Path) -> Result<String, context::Error> {
    match &target.api_token {
        Some(token) if !token.is_empty() => Ok(token.clone()),
        _ => context::read_trimmed(token_file),
    }
}

pub fn copy_request(
    opts: &Options,
    target: &TargetEnvironment,
    release_namespace: &str,
    image: &Image,
    dest_token: &str,
) -> CopyRequest {
    info!("Copying image {} ...", image.name);
    let verify = tls_verify(
        image,
        opts.src_registry_tls_verify,
        &opts.insecure_hosts,
        target,
    );
    let dest = dest_image_url(&target.registry_host, release_namespace, image);
    info!("Source image: {}", image.reference);
    info!("Destination image: {dest}");
    info!(
        "TLS verification: source={}, destination={}",
        verify.src, verify.dest
    );
    let cert_dir = |enabled: bool| enabled.then(|| opts.cert_dir.clone());
    CopyRequest {
        src: image.reference.clone(),
        dest,
        src_tls_verify: verify.src,
        dest_tls_verify: verify.dest,
        src_cert_dir: cert_dir(verify.src),
        dest_cert_dir: cert_dir(verify.dest),
        dest_token: (!dest_token.is_empty()).then(|| dest_token.to_string()),
        debug: opts.debug,
    }
}
