//! Windowed statistics over a most-recent-first game series.
//!
//! Every function takes slices ordered most-recent-first (index 0 = latest
//! game) unless stated otherwise, and returns `None` when the window holds
//! too little data for the statistic to mean anything.

/// Leading `window` elements, or the whole slice for `None` (season).
pub fn take<T>(values: &[T], window: Option<usize>) -> &[T] {
    match window {
        Some(n) => &values[..n.min(values.len())],
        None => values,
    }
}

/// Fraction of windowed games that met the success predicate.
pub fn success_rate(outcomes: &[bool], window: Option<usize>) -> Option<f64> {
    let subset = take(outcomes, window);
    if subset.is_empty() {
        return None;
    }
    let hits = subset.iter().filter(|&&o| o).count();
    Some(hits as f64 / subset.len() as f64)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation; needs at least two values.
pub fn population_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Signed length of the run sharing the latest game's outcome.
///
/// `[hit, hit, hit, miss]` → `3`, `[miss, miss, hit, hit]` → `-2`.
pub fn current_streak(outcomes: &[bool]) -> i32 {
    let Some(&first) = outcomes.first() else {
        return 0;
    };
    let run = outcomes.iter().take_while(|&&o| o == first).count() as i32;
    if first {
        run
    } else {
        -run
    }
}

/// Longest run of consecutive successes anywhere in the series.
pub fn max_streak(outcomes: &[bool]) -> u32 {
    let mut best = 0u32;
    let mut run = 0u32;
    for &o in outcomes {
        if o {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }
    best
}

/// Exponentially weighted success average over the last `window` games.
///
/// Weight for position `i` is `exp(-i / decay)`, normalised to sum to 1.
pub fn momentum(outcomes: &[bool], window: usize, decay: f64) -> Option<f64> {
    let recent = take(outcomes, Some(window));
    if recent.is_empty() {
        return None;
    }
    let weights: Vec<f64> = (0..recent.len())
        .map(|i| (-(i as f64) / decay).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    let weighted: f64 = recent
        .iter()
        .zip(&weights)
        .map(|(&o, w)| if o { *w } else { 0.0 })
        .sum();
    Some(weighted / total)
}

/// Ordinary least-squares slope of `values` (oldest first) against index.
pub fn ols_slope(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values)?;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}

/// Trend over the most recent `window` games of a most-recent-first series.
///
/// Fewer than three games yields a flat trend. With `scale` set the slope is
/// squashed through `tanh(slope / scale)` into (-1, 1).
pub fn trend(values: &[f64], window: usize, scale: Option<f64>) -> f64 {
    let recent = take(values, Some(window));
    if recent.len() < 3 {
        return 0.0;
    }
    let oldest_first: Vec<f64> = recent.iter().rev().copied().collect();
    let slope = ols_slope(&oldest_first).unwrap_or(0.0);
    match scale {
        Some(k) if k > 0.0 => (slope / k).tanh(),
        _ => slope,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn current_streak_counts_leading_hits() {
        // [HIT, HIT, HIT, MISS, HIT] most recent first
        let games = [true, true, true, false, true];
        assert_eq!(current_streak(&games), 3);
    }

    #[test]
    fn current_streak_is_negative_when_cold() {
        let games = [false, false, true, true];
        assert_eq!(current_streak(&games), -2);
    }

    #[test]
    fn current_streak_empty_is_zero() {
        assert_eq!(current_streak(&[]), 0);
    }

    #[test]
    fn max_streak_finds_longest_run_anywhere() {
        let games = [true, false, true, true, true, false, true, true];
        assert_eq!(max_streak(&games), 3);
        assert_eq!(max_streak(&[false, false]), 0);
    }

    #[test]
    fn success_rate_respects_window() {
        let games = [true, false, true, true, false, false];
        assert_relative_eq!(success_rate(&games, Some(3)).unwrap(), 2.0 / 3.0);
        assert_relative_eq!(success_rate(&games, None).unwrap(), 0.5);
        // Window larger than history uses what exists
        assert_relative_eq!(success_rate(&games, Some(20)).unwrap(), 0.5);
        assert!(success_rate(&[], Some(5)).is_none());
    }

    #[test]
    fn population_std_matches_hand_computation() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(population_std(&values).unwrap(), 2.0, epsilon = 1e-12);
        assert!(population_std(&[3.0]).is_none());
    }

    #[test]
    fn momentum_weights_recent_games_more() {
        let recent_hot = [true, false, false, false];
        let recent_cold = [false, false, false, true];
        let hot = momentum(&recent_hot, 10, 3.0).unwrap();
        let cold = momentum(&recent_cold, 10, 3.0).unwrap();
        assert!(hot > cold);

        let w: Vec<f64> = (0..4).map(|i| (-(i as f64) / 3.0).exp()).collect();
        let total: f64 = w.iter().sum();
        assert_relative_eq!(hot, w[0] / total, epsilon = 1e-12);
    }

    #[test]
    fn momentum_only_looks_at_window() {
        let mut games = vec![false; 10];
        games.extend([true; 5]);
        assert_relative_eq!(momentum(&games, 10, 3.0).unwrap(), 0.0);
        assert_relative_eq!(momentum(&[true; 12], 10, 3.0).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn ols_slope_of_line_is_exact() {
        let values = [1.0, 3.0, 5.0, 7.0];
        assert_relative_eq!(ols_slope(&values).unwrap(), 2.0, epsilon = 1e-12);
        assert!(ols_slope(&[4.0]).is_none());
    }

    #[test]
    fn trend_reads_series_oldest_first() {
        // Most recent first: value rising over time
        let rising = [5.0, 4.0, 3.0, 2.0];
        assert!(trend(&rising, 10, None) > 0.0);
        assert_relative_eq!(trend(&rising, 10, None), 1.0, epsilon = 1e-12);
        assert_relative_eq!(trend(&rising, 10, Some(0.3)), (1.0f64 / 0.3).tanh(), epsilon = 1e-12);
        assert_eq!(trend(&[5.0, 4.0], 10, Some(0.3)), 0.0);
    }
}
