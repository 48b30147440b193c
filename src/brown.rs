//! # Brown — The Top-Level Modular GCD Loop
//!
//! The driver behind [`gcd_brown`]:
//!
//! 1. Strip integer contents from both inputs; remember `c_G = gcd(c_A, c_B)`
//!    and the cofactor contents for restoration.
//! 2. Bound the coefficients of γ·G by `2·γ·max(height(A), height(B))` with
//!    `γ = gcd(lc(A), lc(B))`.
//! 3. SPLIT: divide the thread budget into masters, each collecting enough
//!    prime images to push the combined modulus past the bound.
//! 4. Gather the master accumulators (and the previous round's carry), keep
//!    only those with the minimal shape, and JOIN them into one triple.
//! 5. If the combined modulus clears the bound, apply the divisibility
//!    check `2·min(Abarsum·Gmax, Abarmax·Gsum) < modulus` (and the Bbar
//!    analogue). On failure raise the bound by 2^128 and collect more
//!    primes — the prime cursor never rewinds, so every round's moduli
//!    stay coprime to the carry.
//! 6. Normalize: make G primitive with a nonnegative leading coefficient,
//!    divide the cofactors by lc(G), and restore the integer contents.

use rayon::prelude::*;
use rug::ops::DivRounding;
use rug::Integer;
use tracing::debug;

use crate::budget;
use crate::clog_u64;
use crate::join::{self, JoinImage};
use crate::poly::{Ctx, Poly, UniPoly};
use crate::primes;
use crate::split::{self, MasterImage, SplitState};
use crate::GcdError;

/// Brown's modular GCD on the recursive view: returns `(G, A/G, B/G)` with
/// `lc(G) ≥ 0`. `threads = 0` means "use rayon's pool size".
pub fn gcd_brown(
    a: &UniPoly,
    b: &UniPoly,
    ctx: &Ctx,
    threads: usize,
) -> Result<(UniPoly, UniPoly, UniPoly), GcdError> {
    let threads = if threads == 0 {
        rayon::current_num_threads().max(1)
    } else {
        threads
    };

    // zero inputs short-circuit: gcd(0, B) = ±B, no division performed
    if a.is_zero() && b.is_zero() {
        return Ok((UniPoly::zero(), UniPoly::zero(), UniPoly::zero()));
    }
    if a.is_zero() {
        let (g, bbar) = orient(b);
        return Ok((g, UniPoly::zero(), bbar));
    }
    if b.is_zero() {
        let (g, abar) = orient(a);
        return Ok((g, abar, UniPoly::zero()));
    }

    // integer contents come off first and go back on at the end
    let ca = a.content();
    let cb = b.content();
    let cg = Integer::from(ca.gcd_ref(&cb));
    let cabar = Integer::from(ca.div_exact_ref(&cg));
    let cbbar = Integer::from(cb.div_exact_ref(&cg));
    let a0 = a.divexact_int(&ca);
    let b0 = b.divexact_int(&cb);

    let la = a0.lead_scalar();
    let gamma = Integer::from(la.gcd_ref(&b0.lead_scalar()));
    let mut bound = Integer::from(&gamma * &a0.height().max(b0.height()));
    bound <<= 1u32;

    let state = SplitState::new(ctx, &a0, &b0, &gamma);
    let mut carry: Option<(UniPoly, UniPoly, UniPoly, Integer)> = None;

    loop {
        let modulus = carry
            .as_ref()
            .map_or_else(|| Integer::from(1u32), |(_, _, _, m)| m.clone());
        let mut todo = bound.clone().div_ceil(&modulus);
        todo += 2u32;
        let required = clog_u64(&todo, primes::PRIME_FLOOR).max(1);

        let budgets = budget::divide(required as u64, threads as u64);
        debug!(
            "collecting {required} images across {} masters on {threads} threads",
            budgets.len()
        );
        let masters: Vec<MasterImage> = budgets
            .par_iter()
            .map(|bu| split::collect_images(&state, bu.images as usize, bu.threads as usize - 1))
            .collect();

        if state.gcd_is_one() {
            debug!("constant modular image: gcd is the content gcd");
            return Ok((
                UniPoly::constant(cg),
                a0.mul_int(&cabar),
                b0.mul_int(&cbbar),
            ));
        }
        if masters
            .iter()
            .zip(&budgets)
            .any(|(ma, bu)| ma.images < bu.images as usize)
        {
            return Err(GcdError::PrimesExhausted);
        }

        // gather: previous carry first, then each master, minimal shape wins
        let mut chosen: Vec<JoinImage> = Vec::with_capacity(masters.len() + 1);
        if let Some((g, abar, bbar, m)) = &carry {
            chosen.push(JoinImage {
                g,
                abar,
                bbar,
                modulus: m,
            });
        }
        for ma in &masters {
            let candidate = JoinImage {
                g: &ma.g,
                abar: &ma.abar,
                bbar: &ma.bbar,
                modulus: &ma.modulus,
            };
            let held = chosen
                .first()
                .map(|im| im.g.shape().expect("gathered images are nonzero"));
            match held {
                None => chosen.push(candidate),
                Some(held) => {
                    let new = ma.g.shape().expect("master images are nonzero");
                    match new.cmp(&held) {
                        std::cmp::Ordering::Less => {
                            debug!("master image beats the gathered shape: dropping carry");
                            chosen.clear();
                            chosen.push(candidate);
                        }
                        std::cmp::Ordering::Greater => {}
                        std::cmp::Ordering::Equal => chosen.push(candidate),
                    }
                }
            }
        }

        let joined = join::join(&chosen, threads)?;
        if joined.modulus <= bound {
            carry = Some((joined.g, joined.abar, joined.bbar, joined.modulus));
            continue;
        }

        // height heuristic: the smaller of the two cross products must fit
        // in half the modulus, for both cofactors
        let ans = Integer::from(&joined.abarsum * &joined.gmax)
            .min(Integer::from(&joined.abarmax * &joined.gsum));
        let bns = Integer::from(&joined.bbarsum * &joined.gmax)
            .min(Integer::from(&joined.bbarmax * &joined.gsum));
        let ok_a = Integer::from(&ans << 1u32) < joined.modulus;
        let ok_b = Integer::from(&bns << 1u32) < joined.modulus;
        if ok_a && ok_b {
            debug!("divisibility bound cleared, normalizing result");
            return Ok(normalize(joined.g, joined.abar, joined.bbar, &cg, &cabar, &cbbar));
        }

        debug!("divisibility bound failed, raising the height bound");
        bound = joined.modulus.clone();
        bound <<= 128u32;
        carry = Some((joined.g, joined.abar, joined.bbar, joined.modulus));
    }
}

/// gcd with one zero input: the nonzero input with its sign normalized,
/// paired with the matching ±1 cofactor.
fn orient(nz: &UniPoly) -> (UniPoly, UniPoly) {
    if nz.lead_scalar() < 0 {
        (nz.neg(), UniPoly::constant(Integer::from(-1)))
    } else {
        (nz.clone(), UniPoly::one())
    }
}

/// Final normalization: G becomes primitive with lc(G) > 0, the cofactors
/// lose the lc(G) factor the γ-scaled images carried, and the integer
/// contents go back on.
fn normalize(
    g: UniPoly,
    abar: UniPoly,
    bbar: UniPoly,
    cg: &Integer,
    cabar: &Integer,
    cbbar: &Integer,
) -> (UniPoly, UniPoly, UniPoly) {
    let mut cont = g.content();
    if g.lead_scalar() < 0 {
        cont = -cont;
    }
    let g = g.divexact_int(&cont);
    let lg = g.lead_scalar();
    let abar = abar.divexact_int(&lg);
    let bbar = bbar.divexact_int(&lg);
    (
        g.mul_int(cg),
        abar.mul_int(cabar),
        bbar.mul_int(cbbar),
    )
}

/// Brown's modular GCD on flat polynomials: splits off variable 0 as the
/// distinguished variable, runs the engine, and reassembles flat results.
/// Inputs must share `ctx`; exponent-width violations were already rejected
/// at construction time by [`Ctx::pack`].
pub fn gcd_brown_mpoly(
    a: &Poly,
    b: &Poly,
    ctx: &Ctx,
    threads: usize,
) -> Result<(Poly, Poly, Poly), GcdError> {
    let au = UniPoly::from_flat(a, ctx);
    let bu = UniPoly::from_flat(b, ctx);
    let (g, abar, bbar) = gcd_brown(&au, &bu, ctx, threads)?;
    Ok((g.to_flat(ctx), abar.to_flat(ctx), bbar.to_flat(ctx)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx2() -> Ctx {
        Ctx::new(2).unwrap()
    }

    fn flat(ctx: &Ctx, pairs: &[(i64, &[u64])]) -> Poly {
        Poly::from_pairs(ctx, pairs).unwrap()
    }

    /// gcd(x², xy) = x with cofactors x and y.
    #[test]
    fn monomial_gcd() {
        let ctx = ctx2();
        let a = flat(&ctx, &[(1, &[2, 0])]);
        let b = flat(&ctx, &[(1, &[1, 1])]);
        let (g, abar, bbar) = gcd_brown_mpoly(&a, &b, &ctx, 1).unwrap();
        assert_eq!(g, flat(&ctx, &[(1, &[1, 0])]));
        assert_eq!(abar, flat(&ctx, &[(1, &[1, 0])]));
        assert_eq!(bbar, flat(&ctx, &[(1, &[0, 1])]));
    }

    /// Pure integer inputs reduce to the integer gcd.
    #[test]
    fn constant_inputs() {
        let ctx = ctx2();
        let a = flat(&ctx, &[(6, &[0, 0])]);
        let b = flat(&ctx, &[(10, &[0, 0])]);
        let (g, abar, bbar) = gcd_brown_mpoly(&a, &b, &ctx, 1).unwrap();
        assert_eq!(g, flat(&ctx, &[(2, &[0, 0])]));
        assert_eq!(abar, flat(&ctx, &[(3, &[0, 0])]));
        assert_eq!(bbar, flat(&ctx, &[(5, &[0, 0])]));
    }

    /// Zero against −7x: gcd is 7x (nonnegative leading coefficient) and
    /// the cofactor of the zero side stays zero.
    #[test]
    fn zero_input_orientation() {
        let ctx = ctx2();
        let a = Poly::zero();
        let b = flat(&ctx, &[(-7, &[1, 0])]);
        let (g, abar, bbar) = gcd_brown_mpoly(&a, &b, &ctx, 1).unwrap();
        assert_eq!(g, flat(&ctx, &[(7, &[1, 0])]));
        assert!(abar.is_zero());
        assert_eq!(bbar, flat(&ctx, &[(-1, &[0, 0])]));
        // both zero: everything zero
        let (g, abar, bbar) = gcd_brown_mpoly(&a, &a, &ctx, 1).unwrap();
        assert!(g.is_zero() && abar.is_zero() && bbar.is_zero());
    }

    /// Coprime polynomials: G = 1 and the inputs come back unchanged.
    #[test]
    fn coprime_polynomials() {
        let ctx = ctx2();
        let a = flat(&ctx, &[(1, &[2, 0]), (1, &[0, 0])]); // x² + 1
        let b = flat(&ctx, &[(1, &[0, 1]), (2, &[0, 0])]); // y + 2
        let (g, abar, bbar) = gcd_brown_mpoly(&a, &b, &ctx, 1).unwrap();
        assert_eq!(g, Poly::one());
        assert_eq!(abar, a);
        assert_eq!(bbar, b);
    }

    /// The univariate case flows through the same engine.
    #[test]
    fn univariate_through_engine() {
        let ctx = Ctx::new(1).unwrap();
        // (x+1)(x+2) and (x+1)(x+3)
        let a = flat(&ctx, &[(1, &[2]), (3, &[1]), (2, &[0])]);
        let b = flat(&ctx, &[(1, &[2]), (4, &[1]), (3, &[0])]);
        let (g, abar, bbar) = gcd_brown_mpoly(&a, &b, &ctx, 1).unwrap();
        assert_eq!(g, flat(&ctx, &[(1, &[1]), (1, &[0])]));
        assert_eq!(abar, flat(&ctx, &[(1, &[1]), (2, &[0])]));
        assert_eq!(bbar, flat(&ctx, &[(1, &[1]), (3, &[0])]));
    }
}
