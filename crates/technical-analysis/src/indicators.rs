use prediction_core::Bar;

/// Closing prices in bar order
pub fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Simple Moving Average
///
/// `result[i]` covers `data[i..i + period]`, i.e. it belongs to `data[i + period - 1]`.
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    let mut result = Vec::with_capacity(data.len() - period + 1);
    for i in period - 1..data.len() {
        let sum: f64 = data[i + 1 - period..=i].iter().sum();
        result.push(sum / period as f64);
    }
    result
}

/// Relative Strength Index over a rolling window of price changes.
///
/// Average gain and average loss are plain means of the last `period`
/// changes. `result[i]` belongs to `data[i + period]`. A window with no
/// losses reads 100.
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period + 1 {
        return vec![];
    }

    let mut gains = Vec::with_capacity(data.len() - 1);
    let mut losses = Vec::with_capacity(data.len() - 1);

    for i in 1..data.len() {
        let change = data[i] - data[i - 1];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    let mut rsi_values = Vec::with_capacity(gains.len() + 1 - period);

    for end in period..=gains.len() {
        let avg_gain = gains[end - period..end].iter().sum::<f64>() / period as f64;
        let avg_loss = losses[end - period..end].iter().sum::<f64>() / period as f64;

        let rsi = if avg_loss == 0.0 {
            100.0
        } else {
            let rs = avg_gain / avg_loss;
            100.0 - (100.0 / (1.0 + rs))
        };
        rsi_values.push(rsi);
    }

    rsi_values
}
