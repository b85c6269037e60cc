//! Bollinger Bands.
//!
//! - Middle: SMA over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! StdDev is the population standard deviation (divides by N, not N-1).
//! Warmup: first (period-1) values are `None`.

use super::Series;

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerSeries {
    pub upper: Series,
    pub middle: Series,
    pub lower: Series,
}

pub fn calculate_bollinger(closes: &[f64], period: usize, mult: f64) -> BollingerSeries {
    let n = closes.len();
    let mut upper = vec![None; n];
    let mut middle = vec![None; n];
    let mut lower = vec![None; n];

    if period == 0 {
        return BollingerSeries {
            upper,
            middle,
            lower,
        };
    }

    for i in (period - 1)..n {
        let window = &closes[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance = window
            .iter()
            .map(|c| {
                let diff = c - mean;
                diff * diff
            })
            .sum::<f64>()
            / period as f64;
        let stddev = variance.sqrt();

        upper[i] = Some(mean + mult * stddev);
        middle[i] = Some(mean);
        lower[i] = Some(mean - mult * stddev);
    }

    BollingerSeries {
        upper,
        middle,
        lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bollinger_warmup() {
        let b = calculate_bollinger(&[1.0, 2.0, 3.0, 4.0], 3, 2.0);
        assert!(b.upper[1].is_none());
        assert!(b.middle[2].is_some());
        assert!(b.lower[3].is_some());
    }

    #[test]
    fn bollinger_constant_prices_collapse() {
        let b = calculate_bollinger(&[10.0; 5], 3, 2.0);
        assert!((b.upper[4].unwrap() - 10.0).abs() < 1e-12);
        assert!((b.lower[4].unwrap() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn bollinger_known_values() {
        // window [2, 4, 6]: mean 4, population variance 8/3
        let b = calculate_bollinger(&[2.0, 4.0, 6.0], 3, 2.0);
        let sd = (8.0_f64 / 3.0).sqrt();
        assert!((b.middle[2].unwrap() - 4.0).abs() < 1e-12);
        assert!((b.upper[2].unwrap() - (4.0 + 2.0 * sd)).abs() < 1e-12);
        assert!((b.lower[2].unwrap() - (4.0 - 2.0 * sd)).abs() < 1e-12);
    }

    #[test]
    fn bollinger_short_input() {
        let b = calculate_bollinger(&[1.0], 20, 2.0);
        assert_eq!(b.upper, vec![None]);
    }
}
