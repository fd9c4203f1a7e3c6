//! Ordered steps over one owned state value.
//!
//! A step either hands the state on, asks to skip the remaining steps, or
//! fails. Skipping is a successful outcome.

use log::info;

use crate::Error;

/// What a step wants to happen next.
#[derive(Debug)]
pub enum Flow<S> {
    /// Run the next step with this state.
    Continue(S),
    /// Stop here, successfully. Carries the reason shown to the user.
    Skip(String),
}

/// How a pipeline that did not fail came to an end.
#[derive(Debug)]
pub enum Outcome<S> {
    Completed(S),
    Skipped(String),
}

#[derive(thiserror::Error, Debug)]
#[error("{step}: {source}")]
pub struct StepError {
    pub step: &'static str,
    #[source]
    pub source: Error,
}

/// A named step. `E` is the read-only environment shared by all steps.
pub struct Step<E, S> {
    pub name: &'static str,
    pub run: fn(&E, S) -> Result<Flow<S>, Error>,
}

impl<E, S> Step<E, S> {
    pub fn new(name: &'static str, run: fn(&E, S) -> Result<Flow<S>, Error>) -> Self {
        Self { name, run }
    }
}

/// Run `steps` in order until one skips or fails.
pub fn run_steps<E, S>(env: &E, state: S, steps: &[Step<E, S>]) -> Result<Outcome<S>, StepError> {
    let mut state = state;
    for step in steps {
        log::debug!("running step {}", step.name);
        match (step.run)(env, state) {
            Ok(Flow::Continue(next)) => state = next,
            Ok(Flow::Skip(reason)) => {
                info!("{reason}");
                return Ok(Outcome::Skipped(reason));
            }
            Err(source) => {
                return Err(StepError {
                    step: step.name,
                    source,
                })
            }
        }
    }
    Ok(Outcome::Completed(state))
}
