//! # Modlift — Parallel Modular GCD Engine
//!
//! Computes `G = gcd(A, B)`, `Abar = A/G`, `Bbar = B/G` for multivariate
//! polynomials with big-integer coefficients using Brown's modular algorithm:
//! reduce modulo a sequence of 64-bit primes, compute the GCD of each prime
//! image over F_p, lift the integer coefficients back with Chinese
//! remaindering, and stop once a height-based divisibility bound is cleared.
//!
//! ## Module Organization
//!
//! **Reconstruction core**:
//! - [`crt`] — Compiled Chinese-remainder straight-line programs: a balanced
//!   binary combine tree precomputed once and executed many times with
//!   per-call scratch, so one program serves all worker threads.
//! - [`merge`] — Monomial-aligned CRT merging: walks several sparse
//!   polynomials in step, feeding the aligned coefficient vector (with zero
//!   padding) to the CRT runner per monomial.
//!
//! **Parallel orchestration**:
//! - [`split`] — Masters fetch fresh primes from a shared cursor, compute
//!   modular GCD images, and CRT-lift them into private accumulators, with
//!   bad-prime and unlucky-prime recovery.
//! - [`join`] — Per-exponent CRT reconstruction of the collected images,
//!   fanned out over worker threads and finished with a serial merge.
//! - [`budget`] — Splits a thread budget between masters and their helpers
//!   using Stern–Brocot (Farey neighbor) fraction refinement.
//! - [`brown`] — The top-level loop: content removal, bound computation,
//!   split/join rounds, the divisibility check, content restoration.
//!
//! **Arithmetic substrate**:
//! - [`primes`] — 64-bit prime iteration (deterministic Miller–Rabin) and
//!   word-size prime-field arithmetic.
//! - [`poly`] — Packed-monomial sparse polynomials over [`rug::Integer`],
//!   flat ([`poly::Poly`]) and recursive-in-one-variable ([`poly::UniPoly`]).
//! - `modpoly`, `modgcd` (crate-internal) — Prime-field images of those
//!   polynomials and the image GCD with cofactors that the split phase
//!   calls per prime.
//!
//! ## Design Philosophy
//!
//! Failure is a value: every input-dependent failure mode (prime pool
//! exhausted, moduli not coprime, exponents too wide for the packed layout)
//! surfaces as [`GcdError`], never a panic. The parallel sections are strict
//! fork-join over rayon's pool; shared state is one mutex plus one atomic per
//! coordinator, with all per-worker data privately owned.

pub mod brown;
pub mod budget;
pub mod crt;
pub mod join;
pub mod merge;
pub(crate) mod modgcd;
pub(crate) mod modpoly;
pub mod poly;
pub mod primes;
pub mod split;

use rug::ops::RemRounding;
use rug::Integer;
use thiserror::Error;

/// Failure modes of the engine. All are reported as values; no code path
/// panics on malformed-but-representable input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GcdError {
    /// The split phase ran out of 64-bit primes before the reconstruction
    /// stabilized.
    #[error("ran out of word-size primes before the reconstruction stabilized")]
    PrimesExhausted,
    /// A CRT program was requested over moduli that are not pairwise coprime.
    #[error("moduli are not pairwise coprime")]
    NonCoprimeModuli,
    /// An exponent does not fit the packed monomial layout of the context.
    #[error("exponent does not fit the packed monomial layout")]
    ExponentOverflow,
}

/// Least-absolute residue: the unique `r ≡ z (mod m)` with `r` in
/// `(−m/2, m/2]`. Requires `m > 0`.
pub fn smod(z: &Integer, m: &Integer) -> Integer {
    debug_assert!(*m > 0);
    let mut r = z.clone().rem_euc(m);
    if Integer::from(&r << 1u32) > *m {
        r -= m;
    }
    r
}

/// Euclidean residue of a big integer by a word modulus, as a word.
pub fn rem_u64(z: &Integer, p: u64) -> u64 {
    debug_assert!(p > 0);
    z.clone().rem_euc(&Integer::from(p)).to_u64_wrapping()
}

/// Ceiling logarithm: the smallest `e ≥ 0` with `b^e ≥ z`. Requires `b ≥ 2`.
pub fn clog_u64(z: &Integer, b: u64) -> usize {
    debug_assert!(b >= 2);
    let base = Integer::from(b);
    let mut pow = Integer::from(1u32);
    let mut e = 0usize;
    while pow < *z {
        pow *= &base;
        e += 1;
    }
    e
}
