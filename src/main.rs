/// Deploy Helm
use std::path::{Path, PathBuf};

use clap::Parser;
use deploy_helm::cluster::KubeSecrets;
use deploy_helm::config::file::{File, DEFAULT_CONFIG_FILE};
use deploy_helm::config::options::{Flags, Options};
use deploy_helm::deploy::Deployer;
use deploy_helm::helm::HelmCli;
use deploy_helm::pipeline::{Outcome, StepError};
use deploy_helm::skopeo::Skopeo;
use deploy_helm::Error;
use log::{error, info};
use thiserror::Error;

/// Deploy a Helm chart and its subrepo charts into a namespace, promoting
/// the images it references.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file. Defaults to `deploy-helm.toml` in the checkout, if present.
    #[arg(long, env = "DEPLOY_HELM_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    flags: Flags,
}

#[derive(Error, Debug)]
enum RunError {
    #[error(transparent)]
    Setup(#[from] Error),

    #[error(transparent)]
    Step(#[from] StepError),
}

/// Read configuration file from disk.
///
/// If a configuration file name is not set explicitly, this function will
/// detect whether a config file with the default file name exists in the
/// checkout. If it does, it is used implicitly. If not, the built-in
/// defaults apply.
fn read_config(config: Option<&Path>, checkout_dir: &Path) -> Result<File, Error> {
    let implicit = checkout_dir.join(DEFAULT_CONFIG_FILE);
    let config_file = match config {
        Some(path) => Some(path.to_path_buf()),
        None if implicit.is_file() => Some(implicit),
        None => None,
    };
    Ok(match config_file {
        Some(path) => {
            info!("Using configuration file {}", path.display());
            File::from_path(&path)?
        }
        None => File::default(),
    })
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(_) => std::process::exit(0),
        Err(err) => {
            error!("fatal: {err}");
            std::process::exit(1)
        }
    }
}

fn run() -> Result<(), RunError> {
    let args = Cli::parse();
    let file = read_config(args.config.as_deref(), &args.flags.checkout_dir)?;
    let opts = Options::new(file, args.flags);

    info!("Deploy Helm {}", env!("CARGO_PKG_VERSION"));

    let deployer = Deployer {
        helm: Box::new(HelmCli {
            bin: opts.helm_bin.clone(),
            secrets_plugin: opts.secrets_plugin,
        }),
        copier: Box::new(Skopeo {
            bin: opts.skopeo_bin.clone(),
        }),
        secrets: Box::new(KubeSecrets::new().map_err(Error::from)?),
        opts,
    };

    match deployer.run()? {
        Outcome::Completed(state) => info!(
            "Release {} deployed into {}",
            state.release_name, state.release_namespace
        ),
        Outcome::Skipped(_) => {}
    }
    Ok(())
}
