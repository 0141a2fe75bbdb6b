//! Deterministic TOPSIS ranking over quality-of-service rows.
//!
//! This is the ground truth the model-driven ranker is instructed to emulate:
//! a pure function with no I/O, so a caller can always audit what the model
//! claimed against what the numbers actually say.
//!
//! Criteria: `rt_ms` is a cost criterion (lower is better); `tp_rps` and
//! `availability` are benefit criteria (higher is better). A missing criterion
//! is genuinely unknown — it is excluded from normalization and from distance
//! accumulation rather than coerced to a worst-case number, which would
//! silently bias the ranking against sparsely-measured services.

use serde::{Deserialize, Serialize};

/// One row of the QoS decision matrix, keyed by `api_id`.
///
/// `None` means "unknown", not zero. The catalog's `-1` sentinel is treated
/// identically to `None` by [`rank`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QosRow {
    pub api_id: String,
    #[serde(default)]
    pub rt_ms: Option<f64>,
    #[serde(default)]
    pub tp_rps: Option<f64>,
    #[serde(default)]
    pub availability: Option<f64>,
}

/// Criterion weights for (`rt_ms`, `tp_rps`, `availability`).
///
/// Expected domain: non-negative, conventionally summing to ~1.0. Neither is
/// validated here — only the ratio between weights affects the ordering, so
/// scaling all three by the same positive factor yields an identical ranking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Weights {
    pub rt: f64,
    pub tp: f64,
    pub av: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            rt: 0.5,
            tp: 0.3,
            av: 0.2,
        }
    }
}

/// A ranked row: closeness coefficient plus the distances it came from.
///
/// `C` lives in `[0, 1]`; higher is closer to the ideal point. `C` values are
/// comparable only within one ranking run (same weights, same row set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub api_id: String,
    #[serde(rename = "C")]
    pub closeness: f64,
    #[serde(rename = "D_plus", default)]
    pub d_plus: f64,
    #[serde(rename = "D_minus", default)]
    pub d_minus: f64,
}

/// `-1` is the catalog's explicit "unknown" sentinel, not a measured minimum.
fn sanitize(v: Option<f64>) -> Option<f64> {
    match v {
        Some(x) if x == -1.0 => None,
        other => other,
    }
}

/// Euclidean norm over the present values of one criterion.
///
/// A criterion with no present values gets a norm of 1.0; every weighted
/// value for it is then absent anyway, so it contributes nothing.
fn criterion_norm(vals: &[Option<f64>]) -> f64 {
    let sum: f64 = vals.iter().flatten().map(|x| x * x).sum();
    let norm = sum.sqrt();
    if norm == 0.0 {
        1.0
    } else {
        norm
    }
}

/// Ideal-best and ideal-worst for one weighted criterion column.
/// Cost criteria flip best and worst relative to benefit criteria.
fn best_worst(vals: &[Option<f64>], benefit: bool) -> (Option<f64>, Option<f64>) {
    let mut best: Option<f64> = None;
    let mut worst: Option<f64> = None;
    for v in vals.iter().flatten() {
        best = Some(match best {
            Some(b) if benefit => b.max(*v),
            Some(b) => b.min(*v),
            None => *v,
        });
        worst = Some(match worst {
            Some(w) if benefit => w.min(*v),
            Some(w) => w.max(*v),
            None => *v,
        });
    }
    (best, worst)
}

/// Rank rows by TOPSIS closeness, descending.
///
/// Deterministic and pure. Ties keep input order (stable sort); an empty row
/// set yields an empty result; a row with no usable criteria gets `C = 0.0`.
pub fn rank(rows: &[QosRow], weights: Weights) -> Vec<RankedEntry> {
    if rows.is_empty() {
        return Vec::new();
    }

    let rt: Vec<Option<f64>> = rows.iter().map(|r| sanitize(r.rt_ms)).collect();
    let tp: Vec<Option<f64>> = rows.iter().map(|r| sanitize(r.tp_rps)).collect();
    let av: Vec<Option<f64>> = rows.iter().map(|r| sanitize(r.availability)).collect();

    let rt_norm = criterion_norm(&rt);
    let tp_norm = criterion_norm(&tp);
    let av_norm = criterion_norm(&av);

    // Weighted normalized decision matrix, absent values staying absent.
    let rt_w: Vec<Option<f64>> = rt.iter().map(|v| v.map(|x| x / rt_norm * weights.rt)).collect();
    let tp_w: Vec<Option<f64>> = tp.iter().map(|v| v.map(|x| x / tp_norm * weights.tp)).collect();
    let av_w: Vec<Option<f64>> = av.iter().map(|v| v.map(|x| x / av_norm * weights.av)).collect();

    let (rt_best, rt_worst) = best_worst(&rt_w, false);
    let (tp_best, tp_worst) = best_worst(&tp_w, true);
    let (av_best, av_worst) = best_worst(&av_w, true);

    let mut ranked: Vec<RankedEntry> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut dp = 0.0;
            let mut dm = 0.0;
            for (value, best, worst) in [
                (rt_w[i], rt_best, rt_worst),
                (tp_w[i], tp_best, tp_worst),
                (av_w[i], av_best, av_worst),
            ] {
                let (Some(x), Some(b), Some(w)) = (value, best, worst) else {
                    continue;
                };
                dp += (x - b) * (x - b);
                dm += (x - w) * (x - w);
            }
            let d_plus = dp.sqrt();
            let d_minus = dm.sqrt();
            let denom = d_plus + d_minus;
            let closeness = if denom > 0.0 { d_minus / denom } else { 0.0 };

            RankedEntry {
                api_id: row.api_id.clone(),
                closeness,
                d_plus,
                d_minus,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.closeness
            .partial_cmp(&a.closeness)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}
