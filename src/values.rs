use std::path::{Path, PathBuf};

use log::info;

/// Optional values files of a chart for `namespace`, in merge order.
/// `values.yaml` itself is picked up by helm without being passed.
pub fn collect_values_files(chart_dir: &Path, namespace: &str) -> Vec<PathBuf> {
    info!("Collecting Helm values files ...");
    [
        "secrets.yaml".to_string(),
        format!("values.{namespace}.yaml"),
        format!("secrets.{namespace}.yaml"),
    ]
    .into_iter()
    .map(|name| chart_dir.join(name))
    .filter(|candidate| {
        let present = candidate.is_file();
        if present {
            info!("{} is present, adding.", candidate.display());
        } else {
            info!("{} is not present, skipping.", candidate.display());
        }
        present
    })
    .collect()
}
