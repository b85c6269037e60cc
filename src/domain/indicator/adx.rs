//! ADX (Average Directional Index), Wilder smoothing.
//!
//! +DM/-DM and true range are smoothed with Wilder's running sum over n bars,
//! DX = 100 × |+DI - -DI| / (+DI + -DI), and ADX is the Wilder average of DX.
//! The first ADX value lands at index 2n-1.

use super::Series;
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_adx(bars: &[OhlcvBar], period: usize) -> Series {
    let n = bars.len();
    let mut out = vec![None; n];
    if period == 0 || n < 2 * period {
        return out;
    }

    let mut tr = vec![0.0; n];
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        tr[i] = bars[i].true_range(bars[i - 1].close);
        let up = bars[i].high - bars[i - 1].high;
        let down = bars[i - 1].low - bars[i].low;
        if up > down && up > 0.0 {
            plus_dm[i] = up;
        }
        if down > up && down > 0.0 {
            minus_dm[i] = down;
        }
    }

    let p = period as f64;
    let mut s_tr: f64 = tr[1..=period].iter().sum();
    let mut s_plus: f64 = plus_dm[1..=period].iter().sum();
    let mut s_minus: f64 = minus_dm[1..=period].iter().sum();

    let mut dx = vec![0.0; n];
    dx[period] = directional_index(s_tr, s_plus, s_minus);
    for i in (period + 1)..n {
        s_tr = s_tr - s_tr / p + tr[i];
        s_plus = s_plus - s_plus / p + plus_dm[i];
        s_minus = s_minus - s_minus / p + minus_dm[i];
        dx[i] = directional_index(s_tr, s_plus, s_minus);
    }

    let first = 2 * period - 1;
    let mut adx = dx[period..=first].iter().sum::<f64>() / p;
    out[first] = Some(adx);
    for i in (first + 1)..n {
        adx = (adx * (p - 1.0) + dx[i]) / p;
        out[i] = Some(adx);
    }

    out
}

fn directional_index(s_tr: f64, s_plus: f64, s_minus: f64) -> f64 {
    if s_tr == 0.0 {
        return 0.0;
    }
    let plus_di = 100.0 * s_plus / s_tr;
    let minus_di = 100.0 * s_minus / s_tr;
    let sum = plus_di + minus_di;
    if sum == 0.0 {
        0.0
    } else {
        100.0 * (plus_di - minus_di).abs() / sum
    }
}
