use std::str::FromStr;

pub fn power_parser(s: &str) -> Result<f64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Power value cannot be empty".to_string());
    }
    let s = s.strip_suffix('W').or_else(|| s.strip_suffix('w')).unwrap_or(s).trim_end();
    f64::from_str(s)
        .map_err(|e| format!("Invalid power value '{}': {}", s, e))
        .and_then(|v| {
            if !v.is_finite() || v < 0.0 {
                Err(format!("Power must be finite and non-negative, got {}", v))
            } else {
                Ok(v)
            }
        })
}

pub fn bootstrap_size_parser(s: &str) -> Result<usize, String> {
    let s = s.trim();
    usize::from_str(s)
        .map_err(|e| format!("Invalid bootstrap size '{}': {}", s, e))
        .and_then(|v| {
            if v == 0 {
                Err("Bootstrap size must be at least 1".to_string())
            } else {
                Ok(v)
            }
        })
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() { return 0.0; }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn abs_deviations(values: &[f64], center: f64) -> Vec<f64> {
    values.iter().map(|&v| (v - center).abs()).collect()
}

/// Percentile with linear interpolation between the two closest ranks.
/// `q` is in percent, clamped to 0..=100.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() { return 0.0; }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    lerp(sorted[lo], sorted[hi], rank - lo as f64)
}

/// Exact at `t == 0` and whenever `a == b`.
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}
