use statrs::distribution::{ContinuousCDF, DiscreteCDF, Normal, Poisson};

use crate::error::EngineError;

/// P(X > line) for X ~ Poisson(λ).
///
/// Counts are integers, so `X > line` is `X > floor(line)`: a 5.5 line needs
/// six or more. λ ≤ 0 puts all mass on zero.
pub fn poisson_over(lambda: f64, line: f64) -> Result<f64, EngineError> {
    if !lambda.is_finite() || !line.is_finite() {
        return Err(EngineError::Distribution(format!(
            "poisson λ={} line={}",
            lambda, line
        )));
    }
    if line < 0.0 {
        return Ok(1.0);
    }
    if lambda <= 0.0 {
        return Ok(0.0);
    }
    let dist = Poisson::new(lambda).map_err(|e| EngineError::Distribution(e.to_string()))?;
    let k = line.floor() as u64;
    Ok((1.0 - dist.cdf(k)).clamp(0.0, 1.0))
}

/// P(X > line) for X ~ Normal(μ, σ).
pub fn normal_over(mean: f64, std_dev: f64, line: f64) -> Result<f64, EngineError> {
    let dist = Normal::new(mean, std_dev).map_err(|e| {
        EngineError::Distribution(format!("normal μ={} σ={}: {}", mean, std_dev, e))
    })?;
    Ok(dist.sf(line).clamp(0.0, 1.0))
}
