//! Execution context cached by earlier pipeline stages, and the
//! layout of the `.ods` directory.

use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

pub const ODS_DIR: &str = ".ods";
pub const SUBREPOS_PATH: &str = ".ods/repos";
pub const IMAGE_DIGESTS_PATH: &str = ".ods/artifacts/image-digests";
pub const DEPLOYMENTS_PATH: &str = ".ods/artifacts/deployments";
pub const GIT_COMMIT_SHA_FILE: &str = ".ods/git-commit-sha";

#[derive(Error, Debug)]
pub enum Error {
    #[error("read {path}: {err}")]
    ReadFile { path: String, err: std::io::Error },

    #[error("scan {path}: {err}")]
    ScanDir { path: String, err: std::io::Error },
}

/// Snapshot of the pipeline run this deployment belongs to.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Context {
    pub component: String,
    /// Namespace the pipeline itself runs in.
    pub namespace: String,
    pub git_commit_sha: String,
    pub git_ref: String,
}

impl Context {
    pub fn read_cache(checkout_dir: &Path) -> Result<Self, Error> {
        let ods = checkout_dir.join(ODS_DIR);
        Ok(Self {
            component: read_trimmed(&ods.join("component"))?,
            namespace: read_trimmed(&ods.join("namespace"))?,
            git_commit_sha: read_trimmed(&ods.join("git-commit-sha"))?,
            git_ref: read_trimmed(&ods.join("git-ref"))?,
        })
    }
}

/// Read a single-line file, stripping surrounding whitespace.
pub fn read_trimmed(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path)
        .map(|content| content.trim().to_string())
        .map_err(|err| Error::ReadFile {
            path: path.display().to_string(),
            err,
        })
}

/// A subordinate repository checked out next to the main one.
#[derive(Debug, Clone, PartialEq)]
pub struct Subrepo {
    pub name: String,
    pub path: PathBuf,
}

impl Subrepo {
    pub fn git_commit_sha(&self) -> Result<String, Error> {
        read_trimmed(&self.path.join(GIT_COMMIT_SHA_FILE))
    }
}

/// Returns the subrepos in `.ods/repos`, sorted by name.
pub fn detect_subrepos(checkout_dir: &Path) -> Result<Vec<Subrepo>, Error> {
    let dir = checkout_dir.join(SUBREPOS_PATH);
    if !dir.is_dir() {
        debug!("{} does not exist, no subrepos", dir.display());
        return Ok(vec![]);
    }
    let mut subrepos = list_dir(&dir)?
        .into_iter()
        .filter(|path| path.is_dir())
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.to_string();
            Some(Subrepo { name, path })
        })
        .collect::<Vec<_>>();
    subrepos.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(subrepos)
}

/// Collect the files in `artifacts_path` of the checkout and of every subrepo.
pub fn artifact_files_including_subrepos(
    checkout_dir: &Path,
    artifacts_path: &str,
    subrepos: &[Subrepo],
) -> Result<Vec<PathBuf>, Error> {
    let roots = std::iter::once(checkout_dir).chain(subrepos.iter().map(|s| s.path.as_path()));
    let mut files = vec![];
    for root in roots {
        let dir = root.join(artifacts_path);
        if !dir.is_dir() {
            continue;
        }
        let mut found = list_dir(&dir)?
            .into_iter()
            .filter(|path| path.is_file())
            .collect::<Vec<_>>();
        found.sort();
        debug!("{} artifact files found in {}", found.len(), dir.display());
        files.extend(found);
    }
    Ok(files)
}

fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let scan_err = |err| Error::ScanDir {
        path: dir.display().to_string(),
        err,
    };
    std::fs::read_dir(dir)
        .map_err(scan_err)?
        .map(|entry| entry.map(|e| e.path()).map_err(scan_err))
        .collect()
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::fs;

    /// Writes the `.ods` cache files of a pipeline run.
    pub fn write_cache(root: &Path, component: &str, namespace: &str, sha: &str) {
        let ods = root.join(ODS_DIR);
        fs::create_dir_all(&ods).unwrap();
        fs::write(ods.join("component"), format!("{component}\n")).unwrap();
        fs::write(ods.join("namespace"), namespace).unwrap();
        fs::write(ods.join("git-commit-sha"), format!("  {sha}\n")).unwrap();
        fs::write(ods.join("git-ref"), "refs/heads/main").unwrap();
    }

    #[test]
    fn read_cache() {
        let dir = tempfile::tempdir().unwrap();
        write_cache(dir.path(), "app", "foo-cd", "abc123");
        let ctxt = Context::read_cache(dir.path()).unwrap();
        assert_eq!(
            ctxt,
            Context {
                component: "app".into(),
                namespace: "foo-cd".into(),
                git_commit_sha: "abc123".into(),
                git_ref: "refs/heads/main".into(),
            }
        );
    }

    #[test]
    fn read_cache_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Context::read_cache(dir.path()).unwrap_err();
        assert!(err.to_string().contains("component"));
    }

    #[test]
    fn subrepos_sorted_and_directories_only() {
        let dir = tempfile::tempdir().unwrap();
        assert!(detect_subrepos(dir.path()).unwrap().is_empty());

        let repos = dir.path().join(SUBREPOS_PATH);
        fs::create_dir_all(repos.join("zeta")).unwrap();
        fs::create_dir_all(repos.join("alpha")).unwrap();
        fs::write(repos.join("stray-file"), "").unwrap();

        let names = detect_subrepos(dir.path())
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn artifact_files_checkout_first() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join(IMAGE_DIGESTS_PATH);
        fs::create_dir_all(&main).unwrap();
        fs::write(main.join("app.json"), "{}").unwrap();

        let sub_path = dir.path().join(SUBREPOS_PATH).join("backend");
        fs::create_dir_all(sub_path.join(IMAGE_DIGESTS_PATH)).unwrap();
        fs::write(sub_path.join(IMAGE_DIGESTS_PATH).join("backend.json"), "{}").unwrap();

        let subrepos = detect_subrepos(dir.path()).unwrap();
        let files =
            artifact_files_including_subrepos(dir.path(), IMAGE_DIGESTS_PATH, &subrepos).unwrap();
        let names = files
            .iter()
            .map(|f| f.file_name().unwrap().to_str().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["app.json", "backend.json"]);
    }
}
