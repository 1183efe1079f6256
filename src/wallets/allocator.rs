use crate::models::WalletMetric;

/// Assign capital shares to ranked candidates by water-filling.
///
/// Each round hands every remaining candidate a slice of the remaining
/// capital proportional to its decision score. A candidate whose share
/// would cross `per_wallet_cap` is capped exactly there and removed from
/// further rounds, with its capped delta subtracted from the pool. Once a
/// round caps nobody, the remainder is distributed proportionally in one
/// pass; if all remaining scores are non-positive the remainder is split
/// equally instead.
///
/// Post-conditions: Σshare ≤ total_cap + ε, max share ≤ per_wallet_cap + ε,
/// every share ≥ 0.
pub fn allocate(candidates: &mut [WalletMetric], total_cap: f64, per_wallet_cap: f64) {
    if candidates.is_empty() || total_cap <= 0.0 || per_wallet_cap <= 0.0 {
        for c in candidates.iter_mut() {
            c.capital_share = 0.0;
        }
        return;
    }

    for c in candidates.iter_mut() {
        c.capital_share = 0.0;
    }

    let mut remaining_weight = total_cap;
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    while !remaining.is_empty() && remaining_weight > 0.0 {
        let sum_score: f64 = remaining.iter().map(|&i| candidates[i].decision_score).sum();

        if sum_score <= 0.0 {
            // No signal left to weight by: split the remainder equally,
            // still honoring the per-wallet cap.
            let equal_share = remaining_weight / remaining.len() as f64;
            let mut i = 0;
            while i < remaining.len() && remaining_weight > 0.0 {
                let idx = remaining[i];
                let room = per_wallet_cap - candidates[idx].capital_share;
                if room <= 0.0 {
                    remaining.remove(i);
                    continue;
                }
                let increment = equal_share.min(room);
                candidates[idx].capital_share += increment;
                remaining_weight -= increment;
                if room <= increment {
                    remaining.remove(i);
                } else {
                    i += 1;
                }
            }
            break;
        }

        let mut any_capped = false;
        let mut i = 0;
        while i < remaining.len() && remaining_weight > 0.0 {
            let idx = remaining[i];
            let proposed = remaining_weight * (candidates[idx].decision_score / sum_score);

            if candidates[idx].capital_share + proposed > per_wallet_cap {
                let capped = (per_wallet_cap - candidates[idx].capital_share).max(0.0);
                candidates[idx].capital_share += capped;
                remaining_weight -= capped;
                remaining.remove(i);
                any_capped = true;
            } else {
                i += 1;
            }
        }

        if !any_capped && remaining_weight > 0.0 {
            for &idx in &remaining {
                let mut increment =
                    remaining_weight * (candidates[idx].decision_score / sum_score);
                if candidates[idx].capital_share + increment > per_wallet_cap {
                    increment = per_wallet_cap - candidates[idx].capital_share;
                }
                candidates[idx].capital_share += increment;
            }
            break;
        }
    }

    for c in candidates.iter_mut() {
        if c.capital_share < 0.0 {
            c.capital_share = 0.0;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn candidate(id: &str, score: f64) -> WalletMetric {
        WalletMetric {
            wallet_id: id.into(),
            decision_score: score,
            capital_required: None,
            passes_filter: true,
            capital_share: 0.0,
        }
    }

    fn assert_bounds(candidates: &[WalletMetric], total_cap: f64, per_wallet_cap: f64) {
        let sum: f64 = candidates.iter().map(|c| c.capital_share).sum();
        let max = candidates
            .iter()
            .map(|c| c.capital_share)
            .fold(0.0f64, f64::max);

        assert!(sum <= total_cap + EPS, "sum {sum} exceeds total cap {total_cap}");
        assert!(max <= per_wallet_cap + EPS, "max {max} exceeds per-wallet cap {per_wallet_cap}");
        assert!(candidates.iter().all(|c| c.capital_share >= 0.0));
    }

    #[test]
    fn test_proportional_when_nothing_caps() {
        let mut candidates = vec![candidate("a", 60.0), candidate("b", 30.0), candidate("c", 10.0)];
        allocate(&mut candidates, 0.9, 0.9);

        assert!((candidates[0].capital_share - 0.54).abs() < EPS);
        assert!((candidates[1].capital_share - 0.27).abs() < EPS);
        assert!((candidates[2].capital_share - 0.09).abs() < EPS);
        assert_bounds(&candidates, 0.9, 0.9);
    }

    #[test]
    fn test_dominant_score_capped_and_delta_redistributed() {
        let mut candidates = vec![candidate("a", 90.0), candidate("b", 10.0)];
        allocate(&mut candidates, 0.9, 0.5);

        assert!((candidates[0].capital_share - 0.5).abs() < EPS);
        // b picks up the remainder in later rounds, itself capped at 0.5.
        assert!(candidates[1].capital_share > 0.0);
        assert_bounds(&candidates, 0.9, 0.5);
    }

    #[test]
    fn test_all_scores_non_positive_splits_equally() {
        let mut candidates = vec![candidate("a", 0.0), candidate("b", 0.0), candidate("c", 0.0)];
        allocate(&mut candidates, 0.6, 0.5);

        for c in &candidates {
            assert!((c.capital_share - 0.2).abs() < EPS);
        }
        assert_bounds(&candidates, 0.6, 0.5);
    }

    #[test]
    fn test_equal_split_respects_per_wallet_cap() {
        let mut candidates = vec![candidate("a", 0.0), candidate("b", 0.0)];
        allocate(&mut candidates, 0.9, 0.3);
        assert_bounds(&candidates, 0.9, 0.3);
    }

    #[test]
    fn test_single_candidate_capped() {
        let mut candidates = vec![candidate("a", 100.0)];
        allocate(&mut candidates, 0.9, 0.5);
        assert!((candidates[0].capital_share - 0.5).abs() < EPS);
    }

    #[test]
    fn test_bounds_hold_across_mixed_inputs() {
        let cases: Vec<(Vec<f64>, f64, f64)> = vec![
            (vec![80.0, 70.0, 60.0, 50.0], 0.9, 0.5),
            (vec![100.0, 1.0], 0.9, 0.5),
            (vec![5.0, 5.0, 5.0, 5.0, 5.0], 0.5, 0.05),
            (vec![-10.0, 20.0], 0.9, 0.5),
            (vec![0.0, 100.0, 0.0], 0.3, 0.25),
        ];

        for (scores, total_cap, per_wallet_cap) in cases {
            let mut candidates: Vec<WalletMetric> = scores
                .iter()
                .enumerate()
                .map(|(i, &s)| candidate(&format!("w{i}"), s))
                .collect();
            allocate(&mut candidates, total_cap, per_wallet_cap);
            assert_bounds(&candidates, total_cap, per_wallet_cap);
        }
    }

    #[test]
    fn test_empty_candidates_is_noop() {
        let mut candidates: Vec<WalletMetric> = Vec::new();
        allocate(&mut candidates, 0.9, 0.5);
        assert!(candidates.is_empty());
    }
}
