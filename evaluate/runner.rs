//! Every `(state, family)` pair is an independent task: screen the series, then
//! run the forecasting pipeline on what survives. Tasks share no mutable state
//! and are joined with a single collect once all of them have finished, so a
//! failure in one state never affects another.

use crate::evaluate::config::{ConfigError, RunConfig};
use crate::evaluate::screening::{SkipReason, screen};
use crate::forecast::pipeline::{
    FamilyEvaluation, ForecastError, ModelFamily, PipelineSettings, evaluate_family,
};
use crate::forecast::regression::QuantileRegressor;
use crate::forecast::types::TimeSeries;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::io::IsTerminal;

/// What happened to one state under one family.
#[derive(Debug)]
pub enum RunOutcome {
    Included(FamilyEvaluation),
    Skipped(SkipReason),
    Failed(ForecastError),
}

impl RunOutcome {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Included(_) => "included",
            Self::Skipped(_) => "skipped",
            Self::Failed(_) => "failed",
        }
    }

    pub fn evaluation(&self) -> Option<&FamilyEvaluation> {
        match self {
            Self::Included(evaluation) => Some(evaluation),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct StateRun {
    pub state: String,
    pub family: ModelFamily,
    pub outcome: RunOutcome,
}

/// Validates `config` and evaluates every state for every family with the
/// configured IRLS regressor.
pub fn run_states(
    states: &BTreeMap<String, TimeSeries>,
    families: &[ModelFamily],
    config: &RunConfig,
) -> Result<Vec<StateRun>, ConfigError> {
    let settings = config.validate(families)?;
    Ok(run_states_with(
        states,
        families,
        &settings,
        config.min_observations,
        &config.regression,
    ))
}

/// Evaluates every state for every family with an arbitrary regressor.
/// Results are ordered by state, then by the order of `families`.
pub fn run_states_with<R: QuantileRegressor>(
    states: &BTreeMap<String, TimeSeries>,
    families: &[ModelFamily],
    settings: &PipelineSettings,
    min_observations: usize,
    regressor: &R,
) -> Vec<StateRun> {
    let tasks: Vec<(&String, &TimeSeries, ModelFamily)> = states
        .iter()
        .flat_map(|(state, series)| families.iter().map(move |&family| (state, series, family)))
        .collect();

    let pb = create_progress_bar(tasks.len() as u64, "Evaluating states");

    let runs: Vec<StateRun> = tasks
        .into_par_iter()
        .map(|(state, series, family)| {
            let outcome = run_one(series, family, settings, min_observations, regressor);
            match &outcome {
                RunOutcome::Included(evaluation) => log::debug!(
                    "{state}/{family}: {} one-step errors",
                    evaluation.errors.len()
                ),
                RunOutcome::Skipped(reason) => log::debug!("{state}/{family}: skipped, {reason}"),
                RunOutcome::Failed(err) => log::warn!("{state}/{family}: failed, {err}"),
            }
            pb.inc(1);
            StateRun {
                state: state.clone(),
                family,
                outcome,
            }
        })
        .collect();

    pb.finish_with_message("Evaluation complete");
    runs
}

fn run_one<R: QuantileRegressor>(
    series: &TimeSeries,
    family: ModelFamily,
    settings: &PipelineSettings,
    min_observations: usize,
    regressor: &R,
) -> RunOutcome {
    let usable = match screen(series, family, settings, min_observations) {
        Ok(usable) => usable,
        Err(reason) => return RunOutcome::Skipped(reason),
    };
    match evaluate_family(&usable, family, settings, regressor) {
        Ok(evaluation) => RunOutcome::Included(evaluation),
        Err(err) => RunOutcome::Failed(err),
    }
}

fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let draw_target = if std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };

    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    let template = "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}";
    if let Ok(style) = ProgressStyle::with_template(template) {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    pb.set_message(message.to_string());
    pb
}
