/// Calculate population standard deviation of a price series
///
/// Mean and variance are taken over every price passed in (not a rolling
/// window) and divided by N, not N - 1.
pub fn population_std_dev(prices: &[f64]) -> Option<f64> {
    if prices.is_empty() {
        return None;
    }

    let n = prices.len() as f64;
    let mean = prices.iter().sum::<f64>() / n;
    let variance = prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;

    Some(variance.sqrt())
}
