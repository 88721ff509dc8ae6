//! Cross-device performance ranking from profile samples.
//!
//! For every sample the median of the captured TX and RX arrays stands for
//! signal strength and their interquartile range for stability. Within each
//! test method these four numbers become percentile ranks (high median is
//! good, low IQR is good), are blended with the caller's weights, and are
//! averaged per device into a comprehensive score.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::info;

use crate::models::{DeviceScore, ProfileSample};

/// Fill value for percentile ranks that cannot be computed.
pub const NEUTRAL_SCORE: f64 = 50.0;

// ---

/// Relative weight of strength versus stability. Expected to sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RankingWeights {
    #[serde(default = "half")]
    pub strength_weight: f64,
    #[serde(default = "half")]
    pub stability_weight: f64,
}

fn half() -> f64 {
    0.5
}

impl RankingWeights {
    fn blend(&self, strength: f64, stability: f64) -> f64 {
        strength * self.strength_weight + stability * self.stability_weight
    }
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            strength_weight: 0.5,
            stability_weight: 0.5,
        }
    }
}

/// Per-sample statistics feeding the percentile step.
#[derive(Debug, Clone, PartialEq)]
struct SampleStats<'a> {
    device_id: &'a str,
    test_method: &'a str,
    tx_median: f64,
    tx_iqr: f64,
    rx_median: f64,
    rx_iqr: f64,
}

impl<'a> SampleStats<'a> {
    /// `None` when either capture array is empty.
    fn from_sample(sample: &'a ProfileSample) -> Option<Self> {
        let tx = sorted_f64(&sample.captured_txs)?;
        let rx = sorted_f64(&sample.captured_rxs)?;
        Some(Self {
            device_id: &sample.device_id,
            test_method: &sample.test_method,
            tx_median: percentile(&tx, 50.0),
            tx_iqr: percentile(&tx, 75.0) - percentile(&tx, 25.0),
            rx_median: percentile(&rx, 50.0),
            rx_iqr: percentile(&rx, 75.0) - percentile(&rx, 25.0),
        })
    }
}

fn sorted_f64(values: &[i32]) -> Option<Vec<f64>> {
    if values.is_empty() {
        return None;
    }
    let mut out: Vec<f64> = values.iter().map(|&v| f64::from(v)).collect();
    out.sort_by(f64::total_cmp);
    Some(out)
}

/// Percentile `q` (0..=100) of an ascending, non-empty slice using linear
/// interpolation between closest ranks.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    // ---
    debug_assert!(!sorted.is_empty());
    let pos = (q / 100.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Percentile rank of every value within `values`, in [0, 100].
///
/// Ties share the average of their ranks. With `higher_is_better` the largest
/// value scores 100; otherwise the smallest does. A single value has no
/// defined rank and gets `None`.
pub fn percentile_ranks(values: &[f64], higher_is_better: bool) -> Vec<Option<f64>> {
    // ---
    let n = values.len();
    if n < 2 {
        return vec![None; n];
    }

    values
        .iter()
        .map(|&v| {
            let worse = values
                .iter()
                .filter(|&&o| if higher_is_better { o < v } else { o > v })
                .count();
            let ties = values.iter().filter(|&&o| o == v).count();
            let avg_rank = worse as f64 + (ties as f64 + 1.0) / 2.0;
            Some((avg_rank - 1.0) / (n - 1) as f64 * 100.0)
        })
        .collect()
}

#[derive(Default)]
struct DeviceAcc {
    tx_score: f64,
    rx_score: f64,
    sample_score: f64,
    tx_median: f64,
    tx_iqr: f64,
    rx_median: f64,
    rx_iqr: f64,
    n: usize,
}

/// Rank devices by comprehensive score, best first, with dense ranks 1..N.
///
/// Devices appear in first-seen order of `samples` before the sort, and the
/// sort is stable, so equal scores keep that order.
pub fn rank(samples: &[ProfileSample], weights: RankingWeights) -> Vec<DeviceScore> {
    // ---
    let stats: Vec<SampleStats> = samples.iter().filter_map(SampleStats::from_sample).collect();
    if stats.is_empty() {
        return Vec::new();
    }

    // Percentile scores per sample, computed within each test method.
    let mut tx_strength = vec![NEUTRAL_SCORE; stats.len()];
    let mut rx_strength = vec![NEUTRAL_SCORE; stats.len()];
    let mut tx_stability = vec![NEUTRAL_SCORE; stats.len()];
    let mut rx_stability = vec![NEUTRAL_SCORE; stats.len()];

    let mut by_method: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, s) in stats.iter().enumerate() {
        by_method.entry(s.test_method).or_default().push(i);
    }

    for idx in by_method.values() {
        let column = |f: fn(&SampleStats) -> f64| -> Vec<f64> {
            idx.iter().map(|&i| f(&stats[i])).collect()
        };
        let scatter = |out: &mut Vec<f64>, ranks: Vec<Option<f64>>| {
            for (&i, r) in idx.iter().zip(ranks) {
                out[i] = r.unwrap_or(NEUTRAL_SCORE);
            }
        };

        scatter(&mut tx_strength, percentile_ranks(&column(|s| s.tx_median), true));
        scatter(&mut rx_strength, percentile_ranks(&column(|s| s.rx_median), true));
        scatter(&mut tx_stability, percentile_ranks(&column(|s| s.tx_iqr), false));
        scatter(&mut rx_stability, percentile_ranks(&column(|s| s.rx_iqr), false));
    }

    // Blend and aggregate per device in first-seen order.
    let mut order: Vec<&str> = Vec::new();
    let mut devices: HashMap<&str, DeviceAcc> = HashMap::new();

    for (i, s) in stats.iter().enumerate() {
        let tx_score = weights.blend(tx_strength[i], tx_stability[i]);
        let rx_score = weights.blend(rx_strength[i], rx_stability[i]);

        let acc = devices.entry(s.device_id).or_insert_with(|| {
            order.push(s.device_id);
            DeviceAcc::default()
        });
        acc.tx_score += tx_score;
        acc.rx_score += rx_score;
        acc.sample_score += (tx_score + rx_score) / 2.0;
        acc.tx_median += s.tx_median;
        acc.tx_iqr += s.tx_iqr;
        acc.rx_median += s.rx_median;
        acc.rx_iqr += s.rx_iqr;
        acc.n += 1;
    }

    let mut scores: Vec<DeviceScore> = order
        .iter()
        .map(|id| {
            let acc = &devices[id];
            let n = acc.n as f64;
            DeviceScore {
                rank: 0,
                device_id: id.to_string(),
                comprehensive_score: acc.sample_score / n,
                tx_performance_score: acc.tx_score / n,
                rx_performance_score: acc.rx_score / n,
                avg_tx_strength: acc.tx_median / n,
                avg_tx_stability: acc.tx_iqr / n,
                avg_rx_strength: acc.rx_median / n,
                avg_rx_stability: acc.rx_iqr / n,
            }
        })
        .collect();

    scores.sort_by(|a, b| b.comprehensive_score.total_cmp(&a.comprehensive_score));
    for (i, s) in scores.iter_mut().enumerate() {
        s.rank = i as u32 + 1;
    }

    info!(
        devices = scores.len(),
        samples = stats.len(),
        excluded = samples.len() - stats.len(),
        "Percentile ranking complete"
    );
    scores
}
