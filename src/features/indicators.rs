//! Technical indicator primitives
//!
//! These are the building blocks the feature engine composes into rows.
//! They return full-length vectors aligned with the input, with defined
//! fallback values (not NaN) before enough history has accumulated, so a
//! row can be emitted for every time step.

/// Exponential moving average, smoothing constant `k = 2 / (span + 1)`,
/// seeded at the series' first value and iterated forward.
///
/// Seeding at the first value (rather than an initial SMA) is load-bearing:
/// downstream MACD values depend on it from index zero.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }

    let k = 2.0 / (span as f64 + 1.0);
    let mut result = Vec::with_capacity(values.len());
    let mut current = values[0];
    result.push(current);

    for &v in &values[1..] {
        current = v * k + current * (1.0 - k);
        result.push(current);
    }

    result
}

/// Rolling mean over the trailing `period` values (inclusive of current).
/// Falls back to the current value before enough history.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            if i + 1 < period {
                v
            } else {
                let window = &values[i + 1 - period..=i];
                window.iter().sum::<f64>() / period as f64
            }
        })
        .collect()
}

/// Rolling population standard deviation over the trailing `period`
/// values. Zero before enough history.
pub fn rolling_std(values: &[f64], period: usize) -> Vec<f64> {
    values
        .iter()
        .enumerate()
        .map(|(i, _)| {
            if i + 1 < period {
                0.0
            } else {
                let window = &values[i + 1 - period..=i];
                let mean = window.iter().sum::<f64>() / period as f64;
                let var =
                    window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
                var.sqrt()
            }
        })
        .collect()
}

/// Relative strength index over the trailing `period` price deltas, in
/// `[0, 100]`. Neutral 50 before enough history, 100 when the average
/// loss is zero.
pub fn rsi(prices: &[f64], period: usize) -> Vec<f64> {
    let mut result = Vec::with_capacity(prices.len());

    for i in 0..prices.len() {
        if i < period {
            result.push(50.0);
            continue;
        }

        let mut gain_sum = 0.0;
        let mut loss_sum = 0.0;
        for j in (i - period + 1)..=i {
            let change = prices[j] - prices[j - 1];
            if change > 0.0 {
                gain_sum += change;
            } else {
                loss_sum -= change;
            }
        }

        let avg_gain = gain_sum / period as f64;
        let avg_loss = loss_sum / period as f64;

        if avg_loss == 0.0 {
            result.push(100.0);
        } else {
            let rs = avg_gain / avg_loss;
            result.push(100.0 - 100.0 / (1.0 + rs));
        }
    }

    result
}

/// MACD histogram: the fast/slow EMA spread minus its own `signal_span` EMA.
pub fn macd_histogram(prices: &[f64], fast: usize, slow: usize, signal_span: usize) -> Vec<f64> {
    let ema_fast = ema(prices, fast);
    let ema_slow = ema(prices, slow);

    let macd_line: Vec<f64> = ema_fast
        .iter()
        .zip(ema_slow.iter())
        .map(|(f, s)| f - s)
        .collect();

    let signal = ema(&macd_line, signal_span);

    macd_line
        .iter()
        .zip(signal.iter())
        .map(|(m, s)| m - s)
        .collect()
}

/// Simple return over `period` steps: `(p[i] - p[i-period]) / p[i-period]`.
/// Zero before enough history or on a zero base price.
pub fn simple_return(prices: &[f64], period: usize) -> Vec<f64> {
    prices
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            if i < period || prices[i - period] == 0.0 {
                0.0
            } else {
                (p - prices[i - period]) / prices[i - period]
            }
        })
        .collect()
}

/// One-step log return, zero at the first index.
pub fn log_return(prices: &[f64]) -> Vec<f64> {
    prices
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            if i == 0 || prices[i - 1] <= 0.0 || p <= 0.0 {
                0.0
            } else {
                (p / prices[i - 1]).ln()
            }
        })
        .collect()
}

/// Current volume over its trailing `period` mean. Defaults to 1 before
/// enough history or when the mean is zero (no volume data).
pub fn volume_ratio(volumes: &[f64], period: usize) -> Vec<f64> {
    volumes
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            if i + 1 < period {
                return 1.0;
            }
            let window = &volumes[i + 1 - period..=i];
            let mean = window.iter().sum::<f64>() / period as f64;
            if mean > 0.0 {
                v / mean
            } else {
                1.0
            }
        })
        .collect()
}
