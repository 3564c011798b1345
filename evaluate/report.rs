//! # Cross-State Reports
//!
//! Turns the per-state outcomes of a run into the files an analyst reads:
//!
//! - `errors_<family>.tsv`: one row per forecast date, one column per included
//!   state, `NA` where a state has no error for that date, and a `mean` column
//!   averaging the observed errors of the row.
//! - `exclusions.tsv`: every skipped or failed `(state, family)` pair with its
//!   reason.
//!
//! A per-family summary is returned and logged.

use crate::evaluate::runner::{RunOutcome, StateRun};
use crate::forecast::metrics::{ErrorRow, mean_absolute_error};
use crate::forecast::pipeline::ModelFamily;
use chrono::NaiveDate;
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const MISSING: &str = "NA";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write report file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The errors of one family, keyed by date, then state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WideErrorTable {
    pub states: Vec<String>,
    pub rows: BTreeMap<NaiveDate, BTreeMap<String, f64>>,
}

impl WideErrorTable {
    /// Collects the errors of every included state for `family`.
    pub fn from_runs(runs: &[StateRun], family: ModelFamily) -> Self {
        let mut states = BTreeSet::new();
        let mut rows: BTreeMap<NaiveDate, BTreeMap<String, f64>> = BTreeMap::new();
        for run in runs.iter().filter(|r| r.family == family) {
            if let Some(evaluation) = run.outcome.evaluation() {
                states.insert(run.state.clone());
                for error in &evaluation.errors {
                    rows.entry(error.date)
                        .or_default()
                        .insert(run.state.clone(), error.absolute_error);
                }
            }
        }
        Self {
            states: states.into_iter().collect(),
            rows,
        }
    }

    /// Mean of the observed errors on `date`.
    pub fn row_mean(&self, date: &NaiveDate) -> Option<f64> {
        let errors: Vec<ErrorRow> = self
            .rows
            .get(date)?
            .values()
            .map(|&absolute_error| ErrorRow {
                date: *date,
                absolute_error,
            })
            .collect();
        mean_absolute_error(&errors)
    }

    pub fn write_tsv<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(
            out,
            "date\t{}",
            self.states.iter().map(String::as_str).chain(["mean"]).join("\t")
        )?;
        for (date, cells) in &self.rows {
            let values = self
                .states
                .iter()
                .map(|state| format_value(cells.get(state).copied()))
                .chain([format_value(self.row_mean(date))])
                .join("\t");
            writeln!(out, "{}\t{values}", date.format("%Y-%m-%d"))?;
        }
        Ok(())
    }
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v}"),
        _ => MISSING.to_string(),
    }
}

/// Counts of outcomes for one family.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FamilySummary {
    pub included: usize,
    pub failed: usize,
    /// Skip counts keyed by [`SkipReason::tag`](crate::evaluate::screening::SkipReason::tag).
    pub skipped: BTreeMap<&'static str, usize>,
    pub error_rows: usize,
    /// Mean of all observed one-step errors of the family.
    pub mean_absolute_error: Option<f64>,
}

pub fn summarize(runs: &[StateRun]) -> BTreeMap<ModelFamily, FamilySummary> {
    let mut summaries: BTreeMap<ModelFamily, FamilySummary> = BTreeMap::new();
    let mut errors: BTreeMap<ModelFamily, Vec<ErrorRow>> = BTreeMap::new();
    for run in runs {
        let summary = summaries.entry(run.family).or_default();
        match &run.outcome {
            RunOutcome::Included(evaluation) => {
                summary.included += 1;
                summary.error_rows += evaluation.errors.len();
                errors
                    .entry(run.family)
                    .or_default()
                    .extend_from_slice(&evaluation.errors);
            }
            RunOutcome::Skipped(reason) => *summary.skipped.entry(reason.tag()).or_default() += 1,
            RunOutcome::Failed(_) => summary.failed += 1,
        }
    }
    for (family, summary) in summaries.iter_mut() {
        summary.mean_absolute_error = errors.get(family).and_then(|e| mean_absolute_error(e));
    }
    summaries
}

/// Writes one wide table per family present in `runs` plus `exclusions.tsv`
/// into `output_dir`, and returns the per-family summaries.
pub fn write_reports(
    runs: &[StateRun],
    output_dir: &Path,
) -> Result<BTreeMap<ModelFamily, FamilySummary>, ReportError> {
    fs::create_dir_all(output_dir).map_err(|source| ReportError::Io {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let families: BTreeSet<ModelFamily> = runs.iter().map(|r| r.family).collect();
    for family in families {
        let table = WideErrorTable::from_runs(runs, family);
        let path = output_dir.join(format!("errors_{family}.tsv"));
        write_file(&path, |out| table.write_tsv(out))?;
        log::info!(
            "Wrote {} dates x {} states to '{}'",
            table.rows.len(),
            table.states.len(),
            path.display()
        );
    }

    let path = output_dir.join("exclusions.tsv");
    write_file(&path, |out| write_exclusions(runs, out))?;

    let summaries = summarize(runs);
    for (family, summary) in &summaries {
        let skipped = summary
            .skipped
            .iter()
            .map(|(tag, count)| format!("{count} {tag}"))
            .join(", ");
        log::info!(
            "{family}: {} states included, {} failed, skipped [{}], {} error rows, MAE {}",
            summary.included,
            summary.failed,
            skipped,
            summary.error_rows,
            format_value(summary.mean_absolute_error)
        );
    }
    Ok(summaries)
}

pub fn write_exclusions<W: Write>(runs: &[StateRun], out: &mut W) -> std::io::Result<()> {
    writeln!(out, "state\tfamily\toutcome\tdetail")?;
    for run in runs {
        let detail = match &run.outcome {
            RunOutcome::Included(_) => continue,
            RunOutcome::Skipped(reason) => format!("{}: {reason}", reason.tag()),
            RunOutcome::Failed(err) => err.to_string(),
        };
        // Keep the table rectangular whatever the error text contains.
        let detail = detail.replace(['\t', '\n'], " ");
        writeln!(
            out,
            "{}\t{}\t{}\t{detail}",
            run.state,
            run.family,
            run.outcome.tag()
        )?;
    }
    Ok(())
}

fn write_file<F>(path: &Path, body: F) -> Result<(), ReportError>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let io_error = |source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut out = BufWriter::new(File::create(path).map_err(io_error)?);
    body(&mut out).map_err(io_error)?;
    out.flush().map_err(io_error)
}
