//! # Merge — Monomial-Aligned CRT over Sparse Polynomials
//!
//! The images being lifted are sparse and need not share support: a
//! coefficient present modulo one prime may be absent (zero) modulo another.
//! These routines walk several polynomials in step, always taking the
//! greatest monomial any cursor still points at, padding absentees with
//! zero, and handing the aligned residue vector to the CRT runner. Output
//! terms appear in the same strictly decreasing order as the inputs, and
//! only nonzero reconstructions are kept.
//!
//! Each call also accumulates the height statistics the divisibility check
//! needs: the running maximum |r| and the running sum of |r| over every
//! reconstructed coefficient.

use rug::Integer;

use crate::crt::{CrtProgram, CrtScratch};
use crate::poly::{Poly, UniPoly};

/// Merge `k` sparse polynomials into `out` by CRT, one aligned monomial at
/// a time. `inputs` must match the program's input count; `hmax`/`hsum`
/// accumulate the height statistics of the reconstructed coefficients.
pub fn crt_poly(
    prog: &CrtProgram,
    scratch: &mut CrtScratch,
    hmax: &mut Integer,
    hsum: &mut Integer,
    out: &mut Poly,
    inputs: &[&Poly],
) {
    debug_assert_eq!(inputs.len(), prog.input_count());
    *out = Poly::zero();
    let k = inputs.len();
    let mut cursors = vec![0usize; k];
    let mut residues = vec![Integer::new(); k];
    loop {
        // the greatest monomial any unconsumed head carries
        let mut best: Option<u64> = None;
        for (j, input) in inputs.iter().enumerate() {
            if let Some(&(mono, _)) = input.terms().get(cursors[j]) {
                best = Some(best.map_or(mono, |b: u64| b.max(mono)));
            }
        }
        let Some(mono) = best else { break };

        // aligned residue vector: matching heads advance, others pad zero
        for (j, input) in inputs.iter().enumerate() {
            match input.terms().get(cursors[j]) {
                Some((m, c)) if *m == mono => {
                    residues[j] = c.clone();
                    cursors[j] += 1;
                }
                _ => residues[j] = Integer::new(),
            }
        }

        let r = prog.run(scratch, &residues);
        if r != 0 {
            let a = Integer::from(r.abs_ref());
            if a > *hmax {
                *hmax = a.clone();
            }
            *hsum += a;
            out.push_term(mono, r);
        }
    }
}

/// Reconstruct the coefficient of X^`exp` across `k` recursive polynomials
/// and append it to `out` (nothing is appended when the merged coefficient
/// is zero). `out` gains at most one term, below all existing ones.
pub fn crt_exp(
    prog: &CrtProgram,
    scratch: &mut CrtScratch,
    hmax: &mut Integer,
    hsum: &mut Integer,
    out: &mut UniPoly,
    exp: u64,
    inputs: &[&UniPoly],
) {
    let zero = Poly::zero();
    let coeffs: Vec<&Poly> = inputs
        .iter()
        .map(|u| u.coeff_of(exp).unwrap_or(&zero))
        .collect();
    let mut merged = Poly::zero();
    crt_poly(prog, scratch, hmax, hsum, &mut merged, &coeffs);
    if !merged.is_zero() {
        out.push_term(exp, merged);
    }
}

/// Merge whole recursive polynomials: every X-exponent in the union of the
/// supports is reconstructed, in decreasing order.
pub fn crt_uni(
    prog: &CrtProgram,
    scratch: &mut CrtScratch,
    hmax: &mut Integer,
    hsum: &mut Integer,
    inputs: &[&UniPoly],
) -> UniPoly {
    let mut out = UniPoly::zero();
    let mut cursors = vec![0usize; inputs.len()];
    loop {
        let mut best: Option<u64> = None;
        for (j, input) in inputs.iter().enumerate() {
            if let Some(&(exp, _)) = input.terms().get(cursors[j]) {
                best = Some(best.map_or(exp, |b: u64| b.max(exp)));
            }
        }
        let Some(exp) = best else { break };
        for (j, input) in inputs.iter().enumerate() {
            if let Some((e, _)) = input.terms().get(cursors[j]) {
                if *e == exp {
                    cursors[j] += 1;
                }
            }
        }
        crt_exp(prog, scratch, hmax, hsum, &mut out, exp, inputs);
    }
    out
}
