//! Small numeric helpers shared by the strategies and the HTTP layer.

/// Compute the mean of a data slice.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Round to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Fraction of positions where `predicted` equals `actual`.
/// Returns 0.0 for empty or mismatched inputs.
pub fn hit_rate<T: PartialEq>(predicted: &[T], actual: &[T]) -> f64 {
    if predicted.is_empty() || predicted.len() != actual.len() {
        return 0.0;
    }
    let hits = predicted.iter().zip(actual).filter(|(p, a)| p == a).count();
    hits as f64 / predicted.len() as f64
}
