use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("read {path}: {err}")]
    ReadFile { path: String, err: std::io::Error },

    #[error("deserialize {path}: {err}")]
    Deserialize { path: String, err: serde_json::Error },
}

/// An image built and pushed by an earlier pipeline stage.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Image {
    /// Full reference, e.g. `registry.example/team-a/myapp:abc123`.
    #[serde(rename = "ref")]
    pub reference: String,
    pub registry: String,
    pub repository: String,
    pub name: String,
    pub tag: String,
    pub digest: String,
}

impl Image {
    pub fn read_from_file(path: &Path) -> Result<Self, Error> {
        let display = path.display().to_string();
        let data = std::fs::read(path).map_err(|err| Error::ReadFile {
            path: display.clone(),
            err,
        })?;
        serde_json::from_slice(&data).map_err(|err| Error::Deserialize { path: display, err })
    }
}
