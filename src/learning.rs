// =============================================================================
// LearningSummary derivation (spec §4.5)
// =============================================================================
//
// Turns a window of a user's resolved records for a symbol into a
// winning/losing pattern plus a similarity recommendation for the *current*
// snapshot, expressed as Euclidean distance in (RSI, MFI) space from the
// winning and losing centroids.
// =============================================================================

use crate::indicators::volume_profile::VpPosition;
use crate::records::{LearningSummary, Outcome, PatternSummary, Resolution, VpPositionMode};

const MIN_RESOLVED_FOR_SUMMARY: usize = 3;
const SIMILARITY_DISTANCE_THRESHOLD: f64 = 8.0;

/// One resolved record's frozen 1h RSI/MFI/VP-position, as needed to derive
/// winning/losing patterns. The store assembles these from persisted
/// `AnalysisRecord`s before calling `derive`.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedSample {
    pub outcome: Outcome,
    pub pnl_percent: f64,
    pub rsi_1h: f64,
    pub mfi_1h: f64,
    pub vp_position_1h: Option<VpPosition>,
}

fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 - 1.0) * pct).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn mode_vp(positions: &[VpPosition]) -> VpPositionMode {
    if positions.is_empty() {
        return VpPositionMode::Unknown;
    }
    let mut discount = 0;
    let mut neutral = 0;
    let mut premium = 0;
    for p in positions {
        match p {
            VpPosition::Discount => discount += 1,
            VpPosition::Neutral => neutral += 1,
            VpPosition::Premium => premium += 1,
        }
    }
    if discount >= neutral && discount >= premium {
        VpPositionMode::Discount
    } else if premium >= neutral {
        VpPositionMode::Premium
    } else {
        VpPositionMode::Neutral
    }
}

fn build_pattern(samples: &[&ResolvedSample]) -> Option<PatternSummary> {
    if samples.is_empty() {
        return None;
    }

    let mut rsi: Vec<f64> = samples.iter().map(|s| s.rsi_1h).collect();
    let mut mfi: Vec<f64> = samples.iter().map(|s| s.mfi_1h).collect();
    rsi.sort_by(|a, b| a.partial_cmp(b).unwrap());
    mfi.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let positions: Vec<VpPosition> = samples.iter().filter_map(|s| s.vp_position_1h).collect();

    Some(PatternSummary {
        rsi_mean: rsi.iter().sum::<f64>() / rsi.len() as f64,
        rsi_p10: percentile(&rsi, 0.10),
        rsi_p90: percentile(&rsi, 0.90),
        mfi_mean: mfi.iter().sum::<f64>() / mfi.len() as f64,
        mfi_p10: percentile(&mfi, 0.10),
        mfi_p90: percentile(&mfi, 0.90),
        dominant_vp_position: mode_vp(&positions),
    })
}

fn euclidean(a_rsi: f64, a_mfi: f64, b_rsi: f64, b_mfi: f64) -> f64 {
    ((a_rsi - b_rsi).powi(2) + (a_mfi - b_mfi).powi(2)).sqrt()
}

fn to_vp_position_mode(vp: Option<VpPosition>) -> VpPositionMode {
    match vp {
        Some(VpPosition::Discount) => VpPositionMode::Discount,
        Some(VpPosition::Neutral) => VpPositionMode::Neutral,
        Some(VpPosition::Premium) => VpPositionMode::Premium,
        None => VpPositionMode::Unknown,
    }
}

/// Derive the `LearningSummary` for a window of resolved samples, given the
/// current snapshot's 1h RSI/MFI/VP-position for the similarity comparison.
pub fn derive(samples: &[ResolvedSample], current_rsi_1h: f64, current_mfi_1h: f64, current_vp_1h: Option<VpPosition>) -> LearningSummary {
    let winners: Vec<&ResolvedSample> = samples.iter().filter(|s| s.outcome == Outcome::Win).collect();
    let losers: Vec<&ResolvedSample> = samples.iter().filter(|s| s.outcome == Outcome::Loss).collect();

    if samples.len() < MIN_RESOLVED_FOR_SUMMARY {
        return LearningSummary::no_data();
    }

    let win_count = winners.len();
    let loss_count = losers.len();
    let total_count = samples.len();

    let avg_win_pnl = if win_count > 0 {
        winners.iter().map(|s| s.pnl_percent).sum::<f64>() / win_count as f64
    } else {
        0.0
    };
    let avg_loss_pnl = if loss_count > 0 {
        losers.iter().map(|s| s.pnl_percent).sum::<f64>() / loss_count as f64
    } else {
        0.0
    };

    let winning_pattern = build_pattern(&winners);
    let losing_pattern = build_pattern(&losers);

    let current_vp_mode = to_vp_position_mode(current_vp_1h);

    let similarity = match (&winning_pattern, &losing_pattern) {
        (Some(wp), _) if euclidean(current_rsi_1h, current_mfi_1h, wp.rsi_mean, wp.mfi_mean) <= SIMILARITY_DISTANCE_THRESHOLD && current_vp_mode == wp.dominant_vp_position => {
            "STRONG SIGNAL, raise confidence ceiling to 90".to_string()
        }
        (_, Some(lp)) if euclidean(current_rsi_1h, current_mfi_1h, lp.rsi_mean, lp.mfi_mean) <= SIMILARITY_DISTANCE_THRESHOLD && current_vp_mode == lp.dominant_vp_position => {
            "WARNING, cap confidence at 40 or recommend WAIT".to_string()
        }
        _ => "NEUTRAL prior".to_string(),
    };

    LearningSummary {
        total_count,
        win_count,
        loss_count,
        win_rate: win_count as f64 / total_count as f64,
        avg_win_pnl,
        avg_loss_pnl,
        winning_pattern,
        losing_pattern,
        similarity,
    }
}

/// Build a `ResolvedSample` from a resolution plus the 1h RSI/MFI/VP the
/// record's frozen snapshot carried.
pub fn sample_from(resolution: &Resolution, outcome: Outcome, rsi_1h: f64, mfi_1h: f64, vp_position_1h: Option<VpPosition>) -> ResolvedSample {
    ResolvedSample { outcome, pnl_percent: resolution.pnl_percent, rsi_1h, mfi_1h, vp_position_1h }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(outcome: Outcome, pnl: f64, rsi: f64, mfi: f64, vp: VpPosition) -> ResolvedSample {
        ResolvedSample { outcome, pnl_percent: pnl, rsi_1h: rsi, mfi_1h: mfi, vp_position_1h: Some(vp) }
    }

    #[test]
    fn fewer_than_three_records_reports_no_data() {
        let samples = vec![sample(Outcome::Win, 2.0, 30.0, 30.0, VpPosition::Discount)];
        let summary = derive(&samples, 29.0, 32.0, Some(VpPosition::Discount));
        assert_eq!(summary.similarity, "NO DATA");
    }

    #[test]
    fn strong_signal_when_close_to_winning_centroid() {
        let samples = vec![
            sample(Outcome::Win, 2.0, 28.0, 30.0, VpPosition::Discount),
            sample(Outcome::Win, 3.0, 30.0, 34.0, VpPosition::Discount),
            sample(Outcome::Win, 1.5, 32.0, 36.0, VpPosition::Discount),
            sample(Outcome::Loss, -1.0, 75.0, 78.0, VpPosition::Premium),
            sample(Outcome::Loss, -2.0, 74.0, 76.0, VpPosition::Premium),
            sample(Outcome::Loss, -1.5, 76.0, 80.0, VpPosition::Premium),
        ];
        let summary = derive(&samples, 29.0, 32.0, Some(VpPosition::Discount));
        assert_eq!(summary.similarity, "STRONG SIGNAL, raise confidence ceiling to 90");
        assert_eq!(summary.win_count, 3);
        assert_eq!(summary.loss_count, 3);
    }

    #[test]
    fn warning_when_close_to_losing_centroid() {
        let samples = vec![
            sample(Outcome::Win, 2.0, 28.0, 30.0, VpPosition::Discount),
            sample(Outcome::Win, 3.0, 30.0, 34.0, VpPosition::Discount),
            sample(Outcome::Win, 1.5, 32.0, 36.0, VpPosition::Discount),
            sample(Outcome::Loss, -1.0, 75.0, 78.0, VpPosition::Premium),
            sample(Outcome::Loss, -2.0, 74.0, 76.0, VpPosition::Premium),
            sample(Outcome::Loss, -1.5, 76.0, 80.0, VpPosition::Premium),
        ];
        let summary = derive(&samples, 75.0, 77.0, Some(VpPosition::Premium));
        assert_eq!(summary.similarity, "WARNING, cap confidence at 40 or recommend WAIT");
    }

    #[test]
    fn neutral_prior_when_far_from_both_centroids() {
        let samples = vec![
            sample(Outcome::Win, 2.0, 28.0, 30.0, VpPosition::Discount),
            sample(Outcome::Win, 3.0, 30.0, 34.0, VpPosition::Discount),
            sample(Outcome::Loss, -1.0, 75.0, 78.0, VpPosition::Premium),
        ];
        let summary = derive(&samples, 50.0, 50.0, Some(VpPosition::Neutral));
        assert_eq!(summary.similarity, "NEUTRAL prior");
    }
}
