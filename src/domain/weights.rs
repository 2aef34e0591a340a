//! Daily target construction and hard portfolio constraints.

use crate::domain::config::StrategyConfig;
use crate::domain::lifecycle::sign;
use crate::domain::signals::Covariance;

/// What the target builder produced, for the breadth gate and diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetDiagnostics {
    pub active_assets: usize,
    pub active_categories: usize,
    /// Largest category's share of gross exposure.
    pub max_category_share: f64,
    pub reason: &'static str,
}

impl TargetDiagnostics {
    fn degenerate(reason: &'static str) -> Self {
        Self {
            active_assets: 0,
            active_categories: 0,
            max_category_share: 1.0,
            reason,
        }
    }
}

pub fn gross_exposure(weights: &[f64]) -> f64 {
    weights.iter().map(|w| w.abs()).sum()
}

pub fn net_exposure(weights: &[f64]) -> f64 {
    weights.iter().sum()
}

/// Linear-interpolation quantile of an unsorted sample.
fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if sorted.is_empty() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn scale_category(weights: &mut [f64], categories: &[&str], cap: f64) {
    let mut cats: Vec<&str> = Vec::new();
    for &c in categories {
        if !cats.contains(&c) {
            cats.push(c);
        }
    }
    for cat in cats {
        let gross: f64 = weights
            .iter()
            .zip(categories)
            .filter(|(_, c)| **c == cat)
            .map(|(w, _)| w.abs())
            .sum();
        if gross > cap && gross > 0.0 {
            let scale = cap / gross;
            for (w, c) in weights.iter_mut().zip(categories) {
                if *c == cat {
                    *w *= scale;
                }
            }
        }
    }
}

/// Hard constraint pass: single-name cap, category gross caps, each side
/// scaled to half the gross cap, single-name re-clip, dollar-neutral trim,
/// gross rescale, then the gross floor when risk is on at all.
///
/// A near-zero side during the neutrality trim zeroes the whole vector
/// rather than dividing by dust.
pub fn enforce_weight_constraints(
    mut weights: Vec<f64>,
    gross_cap: f64,
    categories: &[&str],
    cfg: &StrategyConfig,
) -> Vec<f64> {
    for w in weights.iter_mut() {
        if !w.is_finite() {
            *w = 0.0;
        }
        *w = w.clamp(-cfg.name_weight_cap, cfg.name_weight_cap);
    }

    scale_category(&mut weights, categories, cfg.category_gross_cap);

    let long_sum: f64 = weights.iter().filter(|w| **w > 0.0).sum();
    let short_sum: f64 = -weights.iter().filter(|w| **w < 0.0).sum::<f64>();
    let target_gross = gross_cap.max(0.0);
    if long_sum > 0.0 {
        let scale = 0.5 * target_gross / long_sum;
        for w in weights.iter_mut() {
            if *w > 0.0 {
                *w *= scale;
            }
        }
    }
    if short_sum > 0.0 {
        let scale = 0.5 * target_gross / short_sum;
        for w in weights.iter_mut() {
            if *w < 0.0 {
                *w *= scale;
            }
        }
    }

    // side scaling can push a name back over the cap
    for w in weights.iter_mut() {
        *w = w.clamp(-cfg.name_weight_cap, cfg.name_weight_cap);
    }

    let net = net_exposure(&weights);
    let tol = cfg.dollar_neutral_tolerance;
    if net.abs() > tol {
        if net > 0.0 {
            let long_now: f64 = weights.iter().filter(|w| **w > 0.0).sum();
            if long_now > 1e-10 {
                let scale = ((long_now - (net - tol)) / long_now).max(0.0);
                for w in weights.iter_mut() {
                    if *w > 0.0 {
                        *w *= scale;
                    }
                }
            } else {
                weights.iter_mut().for_each(|w| *w = 0.0);
            }
        } else {
            let short_now: f64 = -weights.iter().filter(|w| **w < 0.0).sum::<f64>();
            if short_now > 1e-10 {
                let scale = ((short_now - (net.abs() - tol)) / short_now).max(0.0);
                for w in weights.iter_mut() {
                    if *w < 0.0 {
                        *w *= scale;
                    }
                }
            } else {
                weights.iter_mut().for_each(|w| *w = 0.0);
            }
        }
    }

    let gross = gross_exposure(&weights);
    if gross > target_gross.max(1e-8) {
        let scale = target_gross / gross;
        for w in weights.iter_mut() {
            *w *= scale;
        }
    }

    // keep a minimum gross only while any risk budget is active, and only
    // when scaling up would not break the neutrality tolerance or name cap
    let gross = gross_exposure(&weights);
    if target_gross >= cfg.gross_leverage_floor && gross > 0.0 && gross < cfg.gross_leverage_floor
    {
        let scale = cfg.gross_leverage_floor / gross;
        let max_abs = weights.iter().fold(0.0f64, |m, w| m.max(w.abs()));
        let net_after = net_exposure(&weights) * scale;
        if max_abs * scale <= cfg.name_weight_cap + 1e-12 && net_after.abs() <= tol + 1e-12 {
            for w in weights.iter_mut() {
                *w *= scale;
            }
        }
    }

    weights
}

/// Build the day's raw target: validity guard, regime side tilt, covariance
/// risk-load adjustment against yesterday's book, quantile long/short
/// selection, inverse-vol sizing, per-side normalization, then the hard
/// constraint pass.
#[allow(clippy::too_many_arguments)]
pub fn build_daily_target_weights(
    score_row: &[f64],
    vol_row: &[f64],
    prev_weights: &[f64],
    cov: Option<&Covariance>,
    gross_cap: f64,
    side_tilt: f64,
    categories: &[&str],
    cfg: &StrategyConfig,
) -> (Vec<f64>, TargetDiagnostics) {
    let n = score_row.len();
    let zeros = vec![0.0; n];

    let valid: Vec<usize> = (0..n)
        .filter(|&j| score_row[j].is_finite() && vol_row[j].is_finite() && vol_row[j] > 0.0)
        .collect();
    if valid.len() < cfg.min_valid_assets.max(2 * cfg.min_per_side) {
        return (zeros, TargetDiagnostics::degenerate("insufficient_valid_assets"));
    }

    let tilt = side_tilt.clamp(-0.20, 0.20);
    let mut score_adj: Vec<f64> = vec![f64::NAN; n];
    for &j in &valid {
        let mut s = score_row[j];
        if s > 0.0 {
            s *= 1.0 + tilt.max(0.0);
        } else if s < 0.0 {
            s *= 1.0 + (-tilt).max(0.0);
        }
        score_adj[j] = s;
    }

    if let Some(cov) = cov {
        if cov.n() == n {
            for &j in &valid {
                let mut load = 0.0;
                for k in 0..n {
                    let w = prev_weights[k];
                    if w != 0.0 && w.is_finite() {
                        load += cov.at(j, k) * w;
                    }
                }
                score_adj[j] -= cfg.risk_load_factor * load;
            }
        }
    }

    let sample: Vec<f64> = valid.iter().map(|&j| score_adj[j]).collect();
    let q_long = quantile(&sample, cfg.long_quantile);
    let q_short = quantile(&sample, cfg.short_quantile);

    let longs: Vec<usize> = valid
        .iter()
        .copied()
        .filter(|&j| score_adj[j] >= q_long)
        .collect();
    let shorts: Vec<usize> = valid
        .iter()
        .copied()
        .filter(|&j| score_adj[j] <= q_short)
        .collect();
    if longs.len() < cfg.min_per_side || shorts.len() < cfg.min_per_side {
        return (zeros, TargetDiagnostics::degenerate("insufficient_candidates"));
    }

    let mut raw = vec![0.0; n];
    let long_raw: Vec<f64> = longs
        .iter()
        .map(|&j| (score_adj[j] / vol_row[j]).max(0.0))
        .collect();
    let short_raw: Vec<f64> = shorts
        .iter()
        .map(|&j| (-score_adj[j] / vol_row[j]).max(0.0))
        .collect();
    let long_total: f64 = long_raw.iter().sum();
    let short_total: f64 = short_raw.iter().sum();
    if long_total <= 0.0 || short_total <= 0.0 {
        return (zeros, TargetDiagnostics::degenerate("invalid_raw_weights"));
    }
    for (&j, r) in longs.iter().zip(&long_raw) {
        raw[j] = r / long_total;
    }
    for (&j, r) in shorts.iter().zip(&short_raw) {
        raw[j] = -(r / short_total);
    }

    let target = enforce_weight_constraints(raw, gross_cap.max(0.0), categories, cfg);

    let total_gross = gross_exposure(&target);
    let mut cat_gross: Vec<(&str, f64)> = Vec::new();
    let mut active_assets = 0usize;
    for j in 0..n {
        if target[j].abs() > 1e-8 {
            active_assets += 1;
            match cat_gross.iter_mut().find(|(c, _)| *c == categories[j]) {
                Some((_, g)) => *g += target[j].abs(),
                None => cat_gross.push((categories[j], target[j].abs())),
            }
        }
    }
    let max_category_share = if cat_gross.is_empty() {
        1.0
    } else {
        cat_gross
            .iter()
            .map(|(_, g)| g / total_gross.max(1e-8))
            .fold(0.0, f64::max)
    };

    (
        target,
        TargetDiagnostics {
            active_assets,
            active_categories: cat_gross.len(),
            max_category_share,
            reason: "ok",
        },
    )
}

/// Count-based breadth snapshot of a realized weight vector.
pub fn breadth_of(weights: &[f64], categories: &[&str]) -> (usize, usize, f64) {
    let mut active = 0usize;
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for (w, &c) in weights.iter().zip(categories) {
        if w.abs() > 1e-8 {
            active += 1;
            match counts.iter_mut().find(|(cat, _)| *cat == c) {
                Some((_, k)) => *k += 1,
                None => counts.push((c, 1)),
            }
        }
    }
    let max_share = if counts.is_empty() {
        0.0
    } else {
        counts.iter().map(|(_, k)| *k).max().unwrap_or(0) as f64 / active.max(1) as f64
    };
    (active, counts.len(), max_share)
}

// re-exported for the engine's min-hold clamp
pub use crate::domain::lifecycle::min_hold_target;
