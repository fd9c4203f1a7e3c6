use std::path::PathBuf;

use log::info;

use crate::artifact::Image;
use crate::chart::Assembly;
use crate::cluster::{self, SecretReader};
use crate::config::options::Options;
use crate::context::{self, Context, Subrepo, DEPLOYMENTS_PATH, IMAGE_DIGESTS_PATH};
use crate::helm::{Helm, ReleaseRequest, StatusRequest};
use crate::pipeline::{run_steps, Flow, Outcome, Step, StepError};
use crate::promote;
use crate::reconcile::{Decision, Reconciler};
use crate::skopeo::ImageCopier;
use crate::target::{self, TargetEnvironment};
use crate::values;
use crate::Error;

/// Everything the steps accumulate. Passed from step to step by value.
#[derive(Debug, Default)]
pub struct State {
    pub ctxt: Context,
    pub release_name: String,
    pub release_namespace: String,
    pub target: TargetEnvironment,
    pub subrepos: Vec<Subrepo>,
    pub image_digests: Vec<PathBuf>,
    /// `key=value` overrides for helm.
    pub set_values: Vec<String>,
    pub values_files: Vec<PathBuf>,
    pub archive: PathBuf,
}

/// Options and external tools shared by all steps.
pub struct Deployer {
    pub opts: Options,
    pub helm: Box<dyn Helm>,
    pub copier: Box<dyn ImageCopier>,
    pub secrets: Box<dyn SecretReader>,
}

type DeployStep = Step<Deployer, State>;

impl Deployer {
    pub fn steps() -> Vec<DeployStep> {
        vec![
            Step::new("setup context", setup_context),
            Step::new("skip on empty namespace", skip_on_empty_namespace),
            Step::new("set release target", set_release_target),
            Step::new("detect subrepos", detect_subrepos),
            Step::new("detect image digests", detect_image_digests),
            Step::new("copy images", copy_images_into_release_namespace),
            Step::new("list Helm plugins", list_helm_plugins),
            Step::new("package Helm chart", package_helm_chart_with_subcharts),
            Step::new("collect values files", collect_values_files),
            Step::new("import age key", import_age_key),
            Step::new("diff Helm release", diff_helm_release),
            Step::new("upgrade Helm release", upgrade_helm_release),
            Step::new("gather Helm status", gather_helm_status),
        ]
    }

    pub fn run(&self) -> Result<Outcome<State>, StepError> {
        run_steps(self, State::default(), &Self::steps())
    }

    fn chart_dir(&self) -> PathBuf {
        self.opts.checkout_dir.join(&self.opts.chart_dir)
    }

    fn deployments_dir(&self) -> PathBuf {
        self.opts.checkout_dir.join(DEPLOYMENTS_PATH)
    }

    fn release_request(&self, state: &State, flags: &[String]) -> ReleaseRequest {
        ReleaseRequest {
            release_name: state.release_name.clone(),
            namespace: state.release_namespace.clone(),
            archive: state.archive.clone(),
            values_files: state.values_files.clone(),
            set_values: state.set_values.clone(),
            kube_args: state.target.kube_args(),
            flags: flags.to_vec(),
            debug: self.opts.debug,
        }
    }

    fn reconciler<'a>(&'a self, state: &'a State) -> Reconciler<'a> {
        Reconciler {
            helm: self.helm.as_ref(),
            deployments_dir: self.deployments_dir(),
            chart_dir: &self.opts.chart_dir,
            namespace: &state.target.namespace,
        }
    }
}

fn setup_context(d: &Deployer, mut state: State) -> Result<Flow<State>, Error> {
    state.ctxt = Context::read_cache(&d.opts.checkout_dir)?;
    let deployments = d.deployments_dir();
    std::fs::create_dir_all(&deployments).map_err(|err| Error::CreateDir {
        path: deployments.display().to_string(),
        err,
    })?;
    Ok(Flow::Continue(state))
}

fn skip_on_empty_namespace(d: &Deployer, state: State) -> Result<Flow<State>, Error> {
    if d.opts.namespace.is_empty() {
        return Ok(Flow::Skip(
            "No namespace given. Skipping deployment ...".into(),
        ));
    }
    Ok(Flow::Continue(state))
}

fn set_release_target(d: &Deployer, mut state: State) -> Result<Flow<State>, Error> {
    state.release_name = target::release_name(&d.opts, &state.ctxt);
    info!("Release name: {}", state.release_name);

    target::validate_namespace(&d.opts.namespace)?;
    state.release_namespace = d.opts.namespace.clone();
    info!("Release namespace: {}", state.release_namespace);

    let ctxt_namespace = &state.ctxt.namespace;
    state.target = target::target_environment(&d.opts, || {
        let secret = &d.opts.api_credentials_secret;
        if secret.is_empty() {
            return Err(Error::MissingCredentialsSecret(d.opts.api_server.clone()));
        }
        let token = d
            .secrets
            .secret_field(ctxt_namespace, secret, "token")
            .map_err(|err| Error::ApiToken {
                secret: secret.clone(),
                err,
            })?;
        Ok(String::from_utf8_lossy(&token).into_owned())
    })?;
    if !state.target.api_server.is_empty() {
        info!("Target API server: {}", state.target.api_server);
    }
    Ok(Flow::Continue(state))
}

fn detect_subrepos(d: &Deployer, mut state: State) -> Result<Flow<State>, Error> {
    state.subrepos = context::detect_subrepos(&d.opts.checkout_dir)?;
    info!("{} subrepos detected", state.subrepos.len());
    Ok(Flow::Continue(state))
}

fn detect_image_digests(d: &Deployer, mut state: State) -> Result<Flow<State>, Error> {
    state.image_digests = context::artifact_files_including_subrepos(
        &d.opts.checkout_dir,
        IMAGE_DIGESTS_PATH,
        &state.subrepos,
    )?;
    Ok(Flow::Continue(state))
}

fn copy_images_into_release_namespace(d: &Deployer, state: State) -> Result<Flow<State>, Error> {
    if state.image_digests.is_empty() {
        return Ok(Flow::Continue(state));
    }
    let token =
        promote::registry_token(&state.target, &d.opts.token_file).map_err(Error::RegistryToken)?;

    info!("Copying images into release namespace ...");
    for file in &state.image_digests {
        let image = Image::read_from_file(file)?;
        let request =
            promote::copy_request(&d.opts, &state.target, &state.release_namespace, &image, &token);
        d.copier.copy(&request).map_err(|err| Error::CopyImage {
            name: image.name.clone(),
            err,
        })?;
    }
    Ok(Flow::Continue(state))
}

fn list_helm_plugins(d: &Deployer, state: State) -> Result<Flow<State>, Error> {
    info!("List Helm plugins...");
    d.helm.plugin_list(d.opts.debug).map_err(Error::PluginList)?;
    Ok(Flow::Continue(state))
}

fn package_helm_chart_with_subcharts(d: &Deployer, mut state: State) -> Result<Flow<State>, Error> {
    let packaged = Assembly {
        chart_dir: d.chart_dir(),
        chart_subpath: &d.opts.chart_dir,
        subrepos: &state.subrepos,
        git_commit_sha: &state.ctxt.git_commit_sha,
        override_fullnames: state.release_name == state.ctxt.component,
        destination: d.opts.checkout_dir.clone(),
        debug: d.opts.debug,
    }
    .package(d.helm.as_ref())?;
    state.set_values = packaged.set_values;
    state.archive = packaged.archive;
    Ok(Flow::Continue(state))
}

fn collect_values_files(d: &Deployer, mut state: State) -> Result<Flow<State>, Error> {
    state.values_files = values::collect_values_files(&d.chart_dir(), &state.target.namespace);
    Ok(Flow::Continue(state))
}

fn import_age_key(d: &Deployer, state: State) -> Result<Flow<State>, Error> {
    let secret = &d.opts.age_key_secret;
    if secret.is_empty() {
        info!("Skipping import of age key for helm-secrets as parameter is not set ...");
        return Ok(Flow::Continue(state));
    }
    info!("Storing age key for helm-secrets ...");
    let key = match d
        .secrets
        .secret_field(&state.ctxt.namespace, secret, &d.opts.age_key_secret_field)
    {
        Ok(key) => key,
        Err(err) => {
            info!(
                "No secret {secret:?} found in namespace {:?}, skipping: {err}",
                state.ctxt.namespace
            );
            return Ok(Flow::Continue(state));
        }
    };
    cluster::store_age_key(&key, &d.opts.age_key_file).map_err(Error::StoreAgeKey)?;
    info!("Age key secret {secret} stored.");
    Ok(Flow::Continue(state))
}

fn diff_helm_release(d: &Deployer, state: State) -> Result<Flow<State>, Error> {
    let request = d.release_request(&state, &d.opts.diff_flags);
    let decision = d.reconciler(&state).diff(&request, d.opts.diff_only)?;
    match decision {
        Decision::Apply => Ok(Flow::Continue(state)),
        Decision::Skip(reason) => Ok(Flow::Skip(reason)),
    }
}

fn upgrade_helm_release(d: &Deployer, state: State) -> Result<Flow<State>, Error> {
    let request = d.release_request(&state, &d.opts.upgrade_flags);
    d.reconciler(&state).upgrade(&request)?;
    Ok(Flow::Continue(state))
}

fn gather_helm_status(d: &Deployer, state: State) -> Result<Flow<State>, Error> {
    if d.opts.gather_status {
        let request = StatusRequest {
            release_name: state.release_name.clone(),
            namespace: state.release_namespace.clone(),
            kube_args: state.target.kube_args(),
        };
        d.reconciler(&state).gather_status(&request)?;
    }
    Ok(Flow::Continue(state))
}
