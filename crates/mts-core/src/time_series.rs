// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::MtsError;
use crate::stats::median_of_finite;

pub const NS_PER_SECOND: i64 = 1_000_000_000;

/// Signed difference `later - earlier` in seconds.
pub fn seconds_between(earlier_ns: i64, later_ns: i64) -> f64 {
    let delta = i128::from(later_ns) - i128::from(earlier_ns);
    delta as f64 / NS_PER_SECOND as f64
}

/// Shifts a timestamp by a (possibly fractional) number of seconds, saturating at the i64 range.
pub fn add_seconds(t_ns: i64, seconds: f64) -> i64 {
    let delta = (seconds * NS_PER_SECOND as f64).round();
    if !delta.is_finite() {
        return t_ns;
    }
    let shifted = t_ns as f64 + delta;
    if shifted >= i64::MAX as f64 {
        i64::MAX
    } else if shifted <= i64::MIN as f64 {
        i64::MIN
    } else {
        t_ns.saturating_add(delta as i64)
    }
}

/// Validated shared time axis in Unix nanoseconds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeAxis {
    ns: Vec<i64>,
}

impl TimeAxis {
    /// Builds an axis; it must be non-empty and non-decreasing.
    pub fn new(ns: Vec<i64>) -> Result<Self, MtsError> {
        if ns.is_empty() {
            return Err(MtsError::invalid_input("time axis must contain at least one sample"));
        }
        if let Some(idx) = ns.windows(2).position(|pair| pair[1] < pair[0]) {
            return Err(MtsError::invalid_input(format!(
                "time axis must be non-decreasing: time[{}]={} > time[{}]={}",
                idx,
                ns[idx],
                idx + 1,
                ns[idx + 1]
            )));
        }
        Ok(Self { ns })
    }

    /// Uniform axis starting at `t0_ns` with step `dt_ns`.
    pub fn uniform(t0_ns: i64, dt_ns: i64, n: usize) -> Result<Self, MtsError> {
        if dt_ns <= 0 {
            return Err(MtsError::invalid_input(format!(
                "uniform time axis requires dt_ns > 0, got {dt_ns}"
            )));
        }
        let mut ns = Vec::with_capacity(n);
        for idx in 0..n {
            let step = i64::try_from(idx)
                .ok()
                .and_then(|idx| dt_ns.checked_mul(idx))
                .and_then(|delta| t0_ns.checked_add(delta))
                .ok_or_else(|| {
                    MtsError::invalid_input(format!(
                        "uniform time axis overflow at index {idx}: t0_ns={t0_ns}, dt_ns={dt_ns}"
                    ))
                })?;
            ns.push(step);
        }
        Self::new(ns)
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.ns
    }

    pub fn len(&self) -> usize {
        self.ns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ns.is_empty()
    }

    pub fn first(&self) -> i64 {
        self.ns[0]
    }

    pub fn last(&self) -> i64 {
        self.ns[self.ns.len() - 1]
    }

    pub fn span_ns(&self) -> i64 {
        self.last().saturating_sub(self.first())
    }

    /// Median of all consecutive differences, in seconds.
    pub fn median_step_seconds(&self) -> Option<f64> {
        let diffs: Vec<f64> = self
            .ns
            .windows(2)
            .map(|pair| seconds_between(pair[0], pair[1]))
            .collect();
        median_of_finite(&diffs)
    }

    /// Median of strictly positive consecutive differences, in seconds.
    ///
    /// Repeated timestamps are ignored so that duplicated samples do not collapse
    /// dwell-time conversions to zero.
    pub fn sampling_interval_seconds(&self) -> Option<f64> {
        let diffs: Vec<f64> = self
            .ns
            .windows(2)
            .map(|pair| seconds_between(pair[0], pair[1]))
            .filter(|d| *d > 0.0)
            .collect();
        median_of_finite(&diffs)
    }
}

/// Borrowed view of one instrument's measurement over a time axis.
#[derive(Clone, Copy, Debug)]
pub struct TimeSeries<'a> {
    pub time: &'a [i64],
    pub values: &'a [f64],
}

impl<'a> TimeSeries<'a> {
    pub fn new(time: &'a [i64], values: &'a [f64]) -> Result<Self, MtsError> {
        if time.len() != values.len() {
            return Err(MtsError::invalid_input(format!(
                "time/value length mismatch: time has {}, values has {}",
                time.len(),
                values.len()
            )));
        }
        Ok(Self { time, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn t_min(&self) -> Option<i64> {
        self.time.first().copied()
    }

    pub fn t_max(&self) -> Option<i64> {
        self.time.last().copied()
    }
}

/// Descriptive metadata used only for labelling diagnostics and reports.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstrumentMeta {
    pub serial_number: Option<String>,
    pub instrument: Option<String>,
    pub nominal_depth_m: Option<f64>,
}

/// One mooring instrument's record on the shared time axis.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstrumentLevel {
    pub meta: InstrumentMeta,
    /// Clock correction already applied upstream, in seconds.
    pub clock_offset_seconds: f64,
    pub values: Vec<f64>,
}

impl InstrumentLevel {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            meta: InstrumentMeta::default(),
            clock_offset_seconds: 0.0,
            values,
        }
    }

    pub fn with_meta(mut self, meta: InstrumentMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_clock_offset(mut self, clock_offset_seconds: f64) -> Self {
        self.clock_offset_seconds = clock_offset_seconds;
        self
    }
}

/// Multi-instrument dataset whose levels all share one time axis.
#[derive(Clone, Debug, PartialEq)]
pub struct MooringDataset {
    time: TimeAxis,
    levels: Vec<InstrumentLevel>,
}

impl MooringDataset {
    /// Builds a dataset indexed by (time, level).
    pub fn new(time: TimeAxis, levels: Vec<InstrumentLevel>) -> Result<Self, MtsError> {
        if levels.is_empty() {
            return Err(MtsError::invalid_input(
                "dataset must contain at least one instrument level",
            ));
        }
        for (idx, level) in levels.iter().enumerate() {
            if level.values.len() != time.len() {
                return Err(MtsError::invalid_input(format!(
                    "level {idx} has {} samples but the shared time axis has {}; measurements must have dims (time, level)",
                    level.values.len(),
                    time.len()
                )));
            }
            if !level.clock_offset_seconds.is_finite() {
                return Err(MtsError::invalid_input(format!(
                    "level {idx} clock_offset_seconds must be finite, got {}",
                    level.clock_offset_seconds
                )));
            }
        }
        Ok(Self { time, levels })
    }

    /// Builds a dataset from records that each carry their own axis.
    ///
    /// All axes must be identical; bringing instruments onto a common grid is a
    /// resampling step that happens before this crate is involved.
    pub fn from_level_axes(records: Vec<(Vec<i64>, InstrumentLevel)>) -> Result<Self, MtsError> {
        let mut records = records.into_iter();
        let Some((first_axis, first_level)) = records.next() else {
            return Err(MtsError::invalid_input(
                "dataset must contain at least one instrument level",
            ));
        };

        let mut levels = vec![first_level];
        for (offset, (axis, level)) in records.enumerate() {
            if axis != first_axis {
                return Err(MtsError::invalid_input(format!(
                    "level {} has its own time axis ({} samples) that differs from level 0 ({} samples); resample onto a shared axis first",
                    offset + 1,
                    axis.len(),
                    first_axis.len()
                )));
            }
            levels.push(level);
        }

        Self::new(TimeAxis::new(first_axis)?, levels)
    }

    pub fn time(&self) -> &TimeAxis {
        &self.time
    }

    pub fn levels(&self) -> &[InstrumentLevel] {
        &self.levels
    }

    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn n_samples(&self) -> usize {
        self.time.len()
    }

    pub fn level(&self, idx: usize) -> Result<&InstrumentLevel, MtsError> {
        self.levels.get(idx).ok_or_else(|| {
            MtsError::invalid_input(format!(
                "level index {idx} out of range for dataset with {} levels",
                self.levels.len()
            ))
        })
    }

    pub fn series(&self, idx: usize) -> Result<TimeSeries<'_>, MtsError> {
        let level = self.level(idx)?;
        TimeSeries::new(self.time.as_slice(), &level.values)
    }

    /// Measurement at (time index, level index).
    pub fn value_at(&self, t: usize, level: usize) -> Option<f64> {
        self.levels.get(level).and_then(|l| l.values.get(t)).copied()
    }

    pub fn clock_offsets_seconds(&self) -> Vec<f64> {
        self.levels.iter().map(|l| l.clock_offset_seconds).collect()
    }

    /// Label of the form `index/serial:instrument`.
    pub fn level_label(&self, idx: usize) -> String {
        let mut label = idx.to_string();
        if let Some(level) = self.levels.get(idx) {
            if let Some(serial) = &level.meta.serial_number {
                label.push('/');
                label.push_str(serial);
            }
            if let Some(instrument) = &level.meta.instrument {
                label.push(':');
                label.push_str(instrument);
            }
        }
        label
    }
}
