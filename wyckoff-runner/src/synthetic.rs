//! Deterministic synthetic bars for development, validation and benches.
//!
//! Each symbol gets its own `StdRng` seeded from the BLAKE3 hash of its name,
//! so a symbol always produces the same series regardless of which thread
//! generates it or in what order. The walk alternates calm stretches with
//! occasional shock bars (wide range, heavy volume) so the detector has
//! climaxes and breakouts to find.

use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wyckoff_core::domain::RawBar;

/// Probability that a bar is a shock bar.
const SHOCK_PROB: f64 = 0.03;

fn rng_for(symbol: &str) -> StdRng {
    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    StdRng::from_seed(seed)
}

/// Generate `n` weekday bars starting at (or after) `start`.
pub fn generate(symbol: &str, start: NaiveDate, n: usize) -> Vec<RawBar> {
    let mut rng = rng_for(symbol);
    let mut bars = Vec::with_capacity(n);
    let mut price = 100.0_f64;
    let mut drift: f64 = rng.gen_range(-0.001..0.001);
    let mut current = start;

    while bars.len() < n {
        if matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            current += chrono::Duration::days(1);
            continue;
        }

        // regime drift flips now and then so trends reverse
        if rng.gen_bool(0.01) {
            drift = rng.gen_range(-0.002..0.002);
        }
        let shock = rng.gen_bool(SHOCK_PROB);
        let (ret_scale, range_scale, vol_scale) = if shock {
            (0.06, 0.06, 4.0)
        } else {
            (0.015, 0.012, 1.0)
        };

        let ret: f64 = drift + rng.gen_range(-ret_scale..ret_scale);
        let open = price;
        let close = (price * (1.0 + ret)).max(0.01);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..range_scale));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..range_scale));
        let volume = rng.gen_range(500_000.0..2_000_000.0) * vol_scale;

        bars.push(RawBar {
            date: current,
            open,
            high,
            low,
            close,
            volume,
        });

        price = close;
        current += chrono::Duration::days(1);
    }

    bars
}
