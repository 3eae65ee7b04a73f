// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use chrono::{DateTime, NaiveDateTime, Utc};
use mts_core::{InstrumentLevel, InstrumentMeta, MooringDataset, MtsError, TimeAxis};
use serde::Deserialize;

/// JSON dataset document.
///
/// The shared axis is given either as Unix nanoseconds (`time`) or as
/// RFC 3339 strings (`time_iso`). A level may carry its own axis instead; all
/// axes must then coincide. `null` values decode as NaN.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetDocument {
    #[serde(default)]
    pub time: Option<Vec<i64>>,
    #[serde(default)]
    pub time_iso: Option<Vec<String>>,
    pub levels: Vec<LevelDocument>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LevelDocument {
    pub values: Vec<Option<f64>>,
    #[serde(default)]
    pub time: Option<Vec<i64>>,
    #[serde(default)]
    pub time_iso: Option<Vec<String>>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub instrument: Option<String>,
    #[serde(default)]
    pub nominal_depth_m: Option<f64>,
    #[serde(default)]
    pub clock_offset_seconds: Option<f64>,
}

/// Parses a timestamp as RFC 3339, or as a naive ISO-8601 date-time taken to be UTC.
pub fn parse_timestamp(raw: &str) -> Result<i64, MtsError> {
    let utc = match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => parsed.with_timezone(&Utc),
        Err(_) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .map_err(|err| MtsError::invalid_input(format!("invalid timestamp '{raw}': {err}")))?
            .and_utc(),
    };
    utc.timestamp_nanos_opt().ok_or_else(|| {
        MtsError::invalid_input(format!(
            "timestamp '{raw}' is outside the representable nanosecond range"
        ))
    })
}

fn resolve_axis(
    ns: Option<&Vec<i64>>,
    iso: Option<&Vec<String>>,
    context: &str,
) -> Result<Option<Vec<i64>>, MtsError> {
    match (ns, iso) {
        (Some(_), Some(_)) => Err(MtsError::invalid_input(format!(
            "{context} must give either 'time' or 'time_iso', not both"
        ))),
        (Some(ns), None) => Ok(Some(ns.clone())),
        (None, Some(iso)) => iso
            .iter()
            .map(|raw| parse_timestamp(raw))
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        (None, None) => Ok(None),
    }
}

impl DatasetDocument {
    pub fn into_dataset(self) -> Result<MooringDataset, MtsError> {
        let shared = resolve_axis(self.time.as_ref(), self.time_iso.as_ref(), "dataset")?;
        let own_axes = self
            .levels
            .iter()
            .any(|level| level.time.is_some() || level.time_iso.is_some());

        if !own_axes {
            let time = shared.ok_or_else(|| {
                MtsError::invalid_input("dataset gives neither 'time' nor 'time_iso'")
            })?;
            let levels = self.levels.into_iter().map(LevelDocument::into_level).collect();
            return MooringDataset::new(TimeAxis::new(time)?, levels);
        }

        tracing::debug!(levels = self.levels.len(), "checking per-level time axes");
        let mut records = Vec::with_capacity(self.levels.len());
        for (idx, level) in self.levels.into_iter().enumerate() {
            let context = format!("levels[{idx}]");
            let axis = resolve_axis(level.time.as_ref(), level.time_iso.as_ref(), &context)?
                .or_else(|| shared.clone())
                .ok_or_else(|| {
                    MtsError::invalid_input(format!(
                        "{context} has no time axis and the dataset gives no shared one"
                    ))
                })?;
            records.push((axis, level.into_level()));
        }
        MooringDataset::from_level_axes(records)
    }
}

impl LevelDocument {
    fn into_level(self) -> InstrumentLevel {
        let values = self
            .values
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        let level = InstrumentLevel::new(values).with_meta(InstrumentMeta {
            serial_number: self.serial_number,
            instrument: self.instrument,
            nominal_depth_m: self.nominal_depth_m,
        });
        match self.clock_offset_seconds {
            Some(offset) => level.with_clock_offset(offset),
            None => level,
        }
    }
}

/// Parses a dataset document from JSON text.
pub fn dataset_from_json(raw: &str) -> Result<MooringDataset, MtsError> {
    let document: DatasetDocument = serde_json::from_str(raw)
        .map_err(|err| MtsError::invalid_input(format!("invalid dataset JSON: {err}")))?;
    document.into_dataset()
}
