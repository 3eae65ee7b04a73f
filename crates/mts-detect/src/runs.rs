// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

/// Maximal run of adjacent `true` entries, inclusive on both ends.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Run {
    pub start: usize,
    pub end: usize,
}

impl Run {
    pub fn sample_count(&self) -> usize {
        self.end - self.start + 1
    }
}

/// All maximal runs of `true`, in index order.
pub fn runs_of_true(mask: &[bool]) -> Vec<Run> {
    let mut runs = vec![];
    let mut open: Option<usize> = None;
    for (idx, &flag) in mask.iter().enumerate() {
        match (flag, open) {
            (true, None) => open = Some(idx),
            (false, Some(start)) => {
                runs.push(Run {
                    start,
                    end: idx - 1,
                });
                open = None;
            }
            _ => {}
        }
    }
    if let Some(start) = open {
        runs.push(Run {
            start,
            end: mask.len() - 1,
        });
    }
    runs
}

fn sustained(mask: &[bool], min_len: usize) -> impl Iterator<Item = Run> {
    let min_len = min_len.max(1);
    runs_of_true(mask)
        .into_iter()
        .filter(move |run| run.sample_count() >= min_len)
}

/// First run lasting at least `min_len` samples.
pub fn first_sustained(mask: &[bool], min_len: usize) -> Option<Run> {
    sustained(mask, min_len).next()
}

/// Last run lasting at least `min_len` samples.
pub fn last_sustained(mask: &[bool], min_len: usize) -> Option<Run> {
    sustained(mask, min_len).last()
}
