use std::process::{ExitStatus, Stdio};

use log::debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("skopeo copy {src} failed with exit code {status}")]
    Copy { src: String, status: ExitStatus },

    #[error("skopeo copy {src}: {err}")]
    IOError { src: String, err: std::io::Error },
}

/// One image transfer between registries.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CopyRequest {
    /// Source image reference, without transport prefix.
    pub src: String,
    /// Destination image reference, without transport prefix.
    pub dest: String,
    pub src_tls_verify: bool,
    pub dest_tls_verify: bool,
    /// Only passed on when verifying TLS of the source registry.
    pub src_cert_dir: Option<String>,
    /// Only passed on when verifying TLS of the destination registry.
    pub dest_cert_dir: Option<String>,
    pub dest_token: Option<String>,
    pub debug: bool,
}

impl CopyRequest {
    pub fn args(&self) -> Vec<String> {
        self.build_args(false)
    }

    /// Same as `args`, with the registry token masked for logging.
    pub fn redacted_args(&self) -> Vec<String> {
        self.build_args(true)
    }

    fn build_args(&self, redact: bool) -> Vec<String> {
        let mut args = vec![
            "copy".to_string(),
            format!("--src-tls-verify={}", self.src_tls_verify),
            format!("--dest-tls-verify={}", self.dest_tls_verify),
        ];
        if let Some(dir) = &self.src_cert_dir {
            args.push(format!("--src-cert-dir={dir}"));
        }
        if let Some(dir) = &self.dest_cert_dir {
            args.push(format!("--dest-cert-dir={dir}"));
        }
        if let Some(token) = &self.dest_token {
            args.push("--dest-registry-token".to_string());
            args.push(if redact { "***".to_string() } else { token.clone() });
        }
        if self.debug {
            args.push("--debug".to_string());
        }
        args.push(format!("docker://{}", self.src));
        args.push(format!("docker://{}", self.dest));
        args
    }
}

/// Copies images between registries.
pub trait ImageCopier {
    fn copy(&self, request: &CopyRequest) -> Result<(), Error>;
}

/// The `skopeo` command line tool.
pub struct Skopeo {
    pub bin: String,
}

impl ImageCopier for Skopeo {
    fn copy(&self, request: &CopyRequest) -> Result<(), Error> {
        debug!("{} {}", self.bin, request.redacted_args().join(" "));
        std::process::Command::new(&self.bin)
            .args(request.args())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|err| Error::IOError {
                src: request.src.clone(),
                err,
            })
            .and_then(|exit_status| {
                if exit_status.success() {
                    Ok(())
                } else {
                    Err(Error::Copy {
                        src: request.src.clone(),
                        status: exit_status,
                    })
                }
            })
    }
}
