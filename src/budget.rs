//! # Budget — Dividing Threads between Masters and Helpers
//!
//! The split phase runs two parallel axes against one thread pool: several
//! masters each collecting prime images, and helper threads inside each
//! master's modular GCD. Given `n` required images and `m` threads, the
//! divider picks `ℓ` masters and a fraction `aᵢ/bᵢ` for each — `aᵢ` images
//! computed with `bᵢ` threads (the master plus `bᵢ − 1` helpers) — subject
//! to `Σaᵢ = n`, `Σbᵢ = m`, and no master loaded more than 10% above the
//! global ratio `n/m`.
//!
//! Seeding with `gcd(n, m)` equal fractions, the divider then repeatedly
//! replaces a fraction by its two Stern–Brocot parents (Farey neighbors)
//! whenever the heavier parent still clears the 1.1·n/m threshold. Parent
//! denominators are strictly smaller, so the refinement terminates.

use crate::primes::{gcd, inv_mod};

/// One master's allotment: `images` to compute using `threads` threads
/// (itself plus `threads − 1` helpers).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Budget {
    pub images: u64,
    pub threads: u64,
}

/// Split `n ≥ 1` images across `m ≥ 1` threads.
pub fn divide(n: u64, m: u64) -> Vec<Budget> {
    assert!(n >= 1 && m >= 1, "at least one image and one thread");
    let g = gcd(n, m);
    let mut fractions: Vec<(u64, u64)> = vec![(n / g, m / g); g as usize];

    let mut i = 0;
    while i < fractions.len() {
        let (p, q) = fractions[i];
        if q < 2 {
            i += 1;
            continue;
        }
        // Stern–Brocot parents of the reduced p/q: left = a/b with
        // b·p ≡ 1 (mod q), right = (p−a)/(q−b); p/q is their mediant.
        let b = inv_mod(p % q, q).expect("reduced fractions are invertible");
        let a = ((b as u128 * p as u128 - 1) / q as u128) as u64;
        let (rp, rq) = (p - a, q - b);
        // split only while the heavier parent respects 1.1·n/m and both
        // children keep at least one image
        let within = (rp as u128) * 10 * (m as u128) <= 11 * (n as u128) * (rq as u128);
        if a >= 1 && within {
            fractions[i] = (rp, rq);
            fractions.push((a, b));
            continue; // re-examine the replacement before moving on
        }
        i += 1;
    }

    fractions
        .into_iter()
        .map(|(images, threads)| Budget { images, threads })
        .collect()
}
