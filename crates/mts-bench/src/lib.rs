// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Synthetic mooring records shared by the benchmarks.

use mts_core::{InstrumentLevel, MooringDataset, MtsError, NS_PER_SECOND, TimeAxis};

fn lcg_next(state: &mut u64) -> u64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    *state
}

/// Uniform noise in `[-amplitude, amplitude)`.
pub fn noise(n: usize, amplitude: f64, seed: u64) -> Vec<f64> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            let unit = (lcg_next(&mut state) >> 11) as f64 / (1u64 << 53) as f64;
            (2.0 * unit - 1.0) * amplitude
        })
        .collect()
}

/// Surface-deep-surface temperature record with a tidal ripple and noise.
pub fn bathtub_profile(n: usize, surface: usize, delay: usize, seed: u64) -> Vec<f64> {
    let jitter = noise(n, 0.05, seed);
    (0..n)
        .map(|i| {
            let deep = i >= surface + delay && i + surface < n + delay;
            let base = if deep {
                4.0 + 0.2 * (i as f64 * 2.0 * std::f64::consts::PI / 745.0).sin()
            } else {
                18.0
            };
            base + jitter[i]
        })
        .collect()
}

/// Mooring of `n_levels` instruments on a one-minute axis; level `i` runs `i % 3` samples late.
pub fn synthetic_mooring(n: usize, n_levels: usize) -> Result<MooringDataset, MtsError> {
    let time = TimeAxis::uniform(1_700_000_000 * NS_PER_SECOND, 60 * NS_PER_SECOND, n)?;
    let surface = n / 20;
    let levels = (0..n_levels)
        .map(|level| {
            InstrumentLevel::new(bathtub_profile(n, surface, level % 3, 0x5eed + level as u64))
        })
        .collect();
    MooringDataset::new(time, levels)
}

#[cfg(test)]
mod tests {
    use super::{bathtub_profile, noise, synthetic_mooring};

    #[test]
    fn noise_is_bounded_and_deterministic() {
        let a = noise(1_000, 0.5, 7);
        assert_eq!(a, noise(1_000, 0.5, 7));
        assert!(a.iter().all(|v| (-0.5..0.5).contains(v)));
    }

    #[test]
    fn synthetic_mooring_has_requested_shape() {
        let data = synthetic_mooring(2_000, 4).expect("synthetic mooring should be valid");
        assert_eq!(data.n_levels(), 4);
        assert_eq!(data.n_samples(), 2_000);
        let profile = bathtub_profile(200, 10, 0, 1);
        assert!(profile[5] > 17.0);
        assert!(profile[100] < 5.0);
    }
}
