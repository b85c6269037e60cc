//! Exponential Moving Average.
//!
//! k = 2/(n+1), seeded with the SMA of the first n defined values, then
//! EMA[i] = V[i]*k + EMA[i-1]*(1-k).
//! Leading `None` inputs are skipped; the result is `None` until n defined
//! values have been seen.

use super::Series;

pub fn calculate_ema(values: &[Option<f64>], period: usize) -> Series {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut seen = 0usize;
    let mut sum = 0.0;
    let mut ema = 0.0;

    for (i, value) in values.iter().enumerate() {
        let Some(v) = *value else {
            continue;
        };
        seen += 1;
        if seen < period {
            sum += v;
        } else if seen == period {
            sum += v;
            ema = sum / period as f64;
            out[i] = Some(ema);
        } else {
            ema = v * k + ema * (1.0 - k);
            out[i] = Some(ema);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defined(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn ema_seed_is_sma() {
        let s = calculate_ema(&defined(&[2.0, 4.0, 6.0]), 3);
        assert_eq!(s[0], None);
        assert_eq!(s[1], None);
        assert!((s[2].unwrap() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn ema_follows_recurrence() {
        let s = calculate_ema(&defined(&[2.0, 4.0, 6.0, 8.0]), 3);
        // k = 0.5: 8*0.5 + 4*0.5 = 6
        assert!((s[3].unwrap() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn ema_skips_leading_none() {
        let input = vec![None, None, Some(1.0), Some(3.0), Some(5.0)];
        let s = calculate_ema(&input, 2);
        assert_eq!(s[2], None);
        assert!((s[3].unwrap() - 2.0).abs() < 1e-12);
        assert!(s[4].is_some());
    }

    #[test]
    fn ema_constant_series() {
        let s = calculate_ema(&defined(&[5.0; 10]), 4);
        for v in s.iter().skip(3) {
            assert!((v.unwrap() - 5.0).abs() < 1e-12);
        }
    }
}
