//! # Weekly Input Table Loader
//!
//! Reads the prepared long-format table, one row per state and week, and splits
//! it into one [`TimeSeries`] per state.
//!
//! - Strict schema: the columns `state`, `date` and `hospitalization` are
//!   required; `wastewater` is optional and switches every series to two
//!   channels.
//! - Missing measurements are allowed. Empty cells, `NA` and `NaN` become `NaN`
//!   and flow through the pipeline unchanged. Missing states or dates are not.
//! - Rows may arrive in any order; each state's rows are sorted by date.

use crate::forecast::types::{SeriesError, TimeSeries};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error("Missing values were found in the identifier column '{0}'.")]
    MissingValuesFound(String),
    #[error("Row {row} has date '{value}', which is not a YYYY-MM-DD date.")]
    InvalidDate { row: usize, value: String },
    #[error("The series for state '{state}' is malformed: {source}")]
    Series {
        state: String,
        #[source]
        source: SeriesError,
    },
    #[error("The input file contains no data rows.")]
    Empty,
}

/// One input row after parsing.
struct WeekRecord {
    date: NaiveDate,
    hospitalization: f64,
    wastewater: Option<f64>,
}

/// Loads every state series from a tab-separated file.
pub fn load_state_series(path: &Path) -> Result<BTreeMap<String, TimeSeries>, DataError> {
    log::info!("Loading weekly series from '{}'", path.display());

    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(
                    CsvParseOptions::default()
                        .with_separator(b'\t')
                        .with_null_values(Some(NullValues::AllColumnsSingle("NA".into()))),
                ),
        )
        .finish()?;

    if df.height() == 0 {
        return Err(DataError::Empty);
    }

    let has_wastewater = df.get_column_names().iter().any(|c| c.as_str() == "wastewater");
    let states = extract_text_column(&df, "state")?;
    let dates = extract_text_column(&df, "date")?;
    let hospitalization = extract_measurement_column(&df, "hospitalization")?;
    let wastewater = if has_wastewater {
        Some(extract_measurement_column(&df, "wastewater")?)
    } else {
        None
    };

    let mut grouped: BTreeMap<String, Vec<WeekRecord>> = BTreeMap::new();
    for (row, (state, date)) in states.into_iter().zip(dates).enumerate() {
        let parsed = NaiveDate::parse_from_str(date.trim(), DATE_FORMAT).map_err(|_| {
            DataError::InvalidDate {
                row: row + 1,
                value: date.clone(),
            }
        })?;
        grouped.entry(state).or_default().push(WeekRecord {
            date: parsed,
            hospitalization: hospitalization[row],
            wastewater: wastewater.as_ref().map(|ww| ww[row]),
        });
    }

    let mut series = BTreeMap::new();
    for (state, mut records) in grouped {
        records.sort_by_key(|r| r.date);
        let dates: Vec<NaiveDate> = records.iter().map(|r| r.date).collect();
        let hosp: Vec<f64> = records.iter().map(|r| r.hospitalization).collect();
        let built = if has_wastewater {
            let ww = records
                .iter()
                .map(|r| r.wastewater.unwrap_or(f64::NAN))
                .collect();
            TimeSeries::dual(dates, hosp, ww)
        } else {
            TimeSeries::single(dates, hosp)
        };
        let built = built.map_err(|source| DataError::Series {
            state: state.clone(),
            source,
        })?;
        series.insert(state, built);
    }

    log::info!(
        "Loaded {} states ({} rows){}",
        series.len(),
        df.height(),
        if has_wastewater { " with wastewater" } else { "" }
    );
    Ok(series)
}

fn require_column<'a>(df: &'a DataFrame, column_name: &str) -> Result<&'a Column, DataError> {
    df.column(column_name)
        .map_err(|_| DataError::ColumnNotFound(column_name.to_string()))
}

/// A text column with no missing cells.
fn extract_text_column(df: &DataFrame, column_name: &str) -> Result<Vec<String>, DataError> {
    let column = require_column(df, column_name)?;
    if column.null_count() > 0 {
        return Err(DataError::MissingValuesFound(column_name.to_string()));
    }
    let casted = column.cast(&DataType::String)?;
    let values = casted
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect();
    Ok(values)
}

/// A numeric column where missing cells become `NaN`.
fn extract_measurement_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, DataError> {
    let column = require_column(df, column_name)?;
    let casted = column.cast(&DataType::Float64)?;
    // A non-strict cast turns unparsable text into nulls; more nulls than the
    // input had means the column is not numeric.
    if casted.null_count() > column.null_count() {
        return Err(DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "f64 (numeric)",
            found_type: format!("{:?}", column.dtype()),
        });
    }
    let values = casted
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    Ok(values)
}
