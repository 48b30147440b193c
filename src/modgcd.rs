//! # Modgcd — Multivariate GCD over a Word Prime Field
//!
//! The per-prime workhorse of the split phase: given two nonzero images
//! modulo `p`, produce the monic gcd together with both cofactors, or
//! decline so the caller can move on to another prime.
//!
//! ## Algorithm
//!
//! Content-and-primitive pseudo-remainder sequences, recursing on the
//! variable set:
//!
//! 1. Pick the most significant variable `v` present in either operand and
//!    view both as univariate in `v` over the remaining variables.
//! 2. Split off contents (gcds of the coefficient polynomials — a recursive
//!    call on strictly fewer variables) and run the primitive PRS on the
//!    primitive parts: repeatedly replace `(f, g)` by `(g, pp(prem(f, g)))`
//!    until the pseudo-remainder vanishes.
//! 3. The gcd is `gcd(cont_f, cont_g) · pp(g)`, normalized monic. The base
//!    case — no variables left — is a scalar, and a single-variable PRS is
//!    exactly the Euclidean algorithm.
//!
//! When a master has helper threads, the content folds (independent gcds of
//! many coefficient polynomials) run on rayon.
//!
//! ## References
//!
//! - W. S. Brown, "On Euclid's Algorithm and the Computation of Polynomial
//!   Greatest Common Divisors", JACM 18(4), 1971.
//! - Geddes, Czapor, Labahn, "Algorithms for Computer Algebra", ch. 7.

use rayon::prelude::*;

use crate::modpoly::ModPoly;
use crate::poly::Ctx;

/// Monic gcd plus cofactors: `(g, a/g, b/g)`. `None` means the routine
/// declines this prime (cofactor division failed); the split loop treats
/// that as a bad prime and fetches another.
pub fn gcd_cofactors(
    a: &ModPoly,
    b: &ModPoly,
    ctx: &Ctx,
    helpers: usize,
) -> Option<(ModPoly, ModPoly, ModPoly)> {
    let g = gcd(a, b, ctx, helpers > 0);
    if g.is_scalar() {
        // g = 1: the inputs are their own cofactors
        return Some((g, a.clone(), b.clone()));
    }
    let abar = a.div_exact(&g, ctx)?;
    let bbar = b.div_exact(&g, ctx)?;
    Some((g, abar, bbar))
}

/// Monic gcd of two images. `gcd(0, b) = monic(b)`; gcd of anything with a
/// nonzero scalar is 1.
pub fn gcd(a: &ModPoly, b: &ModPoly, ctx: &Ctx, par: bool) -> ModPoly {
    if a.is_zero() {
        return b.monic();
    }
    if b.is_zero() {
        return a.monic();
    }
    if a.is_scalar() || b.is_scalar() {
        return ModPoly::one(a.modulus());
    }
    let v = main_var(a, b, ctx).expect("non-scalar operands involve a variable");

    // one operand free of v: it can only share factors with the other's
    // content in v
    if a.deg_in(v, ctx) == 0 {
        return gcd(a, &content_in(b, v, ctx, par), ctx, par);
    }
    if b.deg_in(v, ctx) == 0 {
        return gcd(&content_in(a, v, ctx, par), b, ctx, par);
    }

    let ca = content_in(a, v, ctx, par);
    let cb = content_in(b, v, ctx, par);
    let c = gcd(&ca, &cb, ctx, par);

    let mut f = a
        .div_exact(&ca, ctx)
        .expect("content divides its polynomial");
    let mut g = b
        .div_exact(&cb, ctx)
        .expect("content divides its polynomial");
    if f.deg_in(v, ctx) < g.deg_in(v, ctx) {
        std::mem::swap(&mut f, &mut g);
    }

    let h = loop {
        let r = prem(&f, &g, v, ctx);
        if r.is_zero() {
            let cg = content_in(&g, v, ctx, par);
            break g.div_exact(&cg, ctx).expect("content divides its polynomial");
        }
        if r.deg_in(v, ctx) == 0 {
            // coprime in v: only the contents contribute
            break ModPoly::one(a.modulus());
        }
        let cr = content_in(&r, v, ctx, par);
        f = g;
        g = r.div_exact(&cr, ctx).expect("content divides its polynomial");
    };

    c.mul(&h, ctx).monic()
}

/// Pseudo-remainder of `f` by `g` in the variable `v`: eliminates the
/// leading `v`-terms of `f` with cross-multiplications until the degree
/// drops below `deg_v(g)`. The result is an R-multiple of the true
/// remainder, which the primitive PRS normalizes away.
fn prem(f: &ModPoly, g: &ModPoly, v: usize, ctx: &Ctx) -> ModPoly {
    let dg = g.deg_in(v, ctx);
    let lcg = g.lead_coeff_in(v, ctx);
    let shift = ctx.field_shift(v);
    let mut r = f.clone();
    loop {
        if r.is_zero() {
            return r;
        }
        let dr = r.deg_in(v, ctx);
        if dr < dg {
            return r;
        }
        let lcr = r.lead_coeff_in(v, ctx);
        // r ← lc(g)·r − lc(r)·v^(dr−dg)·g; the v^dr terms cancel
        let step = g.mul(&lcr, ctx).mul_mono((dr - dg) << shift, ctx);
        r = r.mul(&lcg, ctx).sub(&step);
    }
}

/// Content with respect to `v`: the gcd of the univariate-in-`v` coefficient
/// polynomials. With `par`, independent gcds reduce on rayon (gcd is
/// associative-commutative with the zero polynomial as identity).
fn content_in(a: &ModPoly, v: usize, ctx: &Ctx, par: bool) -> ModPoly {
    let coeffs: Vec<ModPoly> = a
        .coeffs_in_var(v, ctx)
        .into_iter()
        .map(|(_, c)| c)
        .collect();
    let p = a.modulus();
    if par && coeffs.len() >= 4 {
        coeffs
            .into_par_iter()
            .reduce(|| ModPoly::zero(p), |x, y| gcd(&x, &y, ctx, false))
    } else {
        let mut g = ModPoly::zero(p);
        for c in coeffs {
            g = gcd(&g, &c, ctx, false);
            if g.is_scalar() {
                break;
            }
        }
        g
    }
}

/// The most significant variable with a nonzero exponent anywhere in either
/// operand; `None` when both are scalars.
fn main_var(a: &ModPoly, b: &ModPoly, ctx: &Ctx) -> Option<usize> {
    let mut mask = 0u64;
    for &(m, _) in a.terms() {
        mask |= m;
    }
    for &(m, _) in b.terms() {
        mask |= m;
    }
    (0..ctx.nvars()).find(|&v| ctx.exponent(mask, v) != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modpoly::reduce_uni;
    use crate::poly::{Poly, UniPoly};

    const P: u64 = 1_000_003;

    fn ctx2() -> Ctx {
        Ctx::new(2).unwrap()
    }

    fn img(ctx: &Ctx, pairs: &[(i64, &[u64])]) -> ModPoly {
        let flat = Poly::from_pairs(ctx, pairs).unwrap();
        reduce_uni(&UniPoly::from_flat(&flat, ctx), P, ctx)
    }

    /// Univariate Euclid through the PRS: gcd(x²−1, x²+3x+2) = x+1.
    #[test]
    fn univariate_euclid() {
        let ctx = ctx2();
        let a = img(&ctx, &[(1, &[2, 0]), (-1, &[0, 0])]);
        let b = img(&ctx, &[(1, &[2, 0]), (3, &[1, 0]), (2, &[0, 0])]);
        let want = img(&ctx, &[(1, &[1, 0]), (1, &[0, 0])]);
        assert_eq!(gcd(&a, &b, &ctx, false), want);
    }

    /// Bivariate with content: gcd(x²−y², x²+3xy+2y²) = x+y, monic.
    #[test]
    fn bivariate_common_factor() {
        let ctx = ctx2();
        let a = img(&ctx, &[(1, &[2, 0]), (-1, &[0, 2])]);
        let b = img(&ctx, &[(1, &[2, 0]), (3, &[1, 1]), (2, &[0, 2])]);
        let want = img(&ctx, &[(1, &[1, 0]), (1, &[0, 1])]);
        assert_eq!(gcd(&a, &b, &ctx, false), want);
    }

    /// The gcd may live entirely in the coefficient variables:
    /// gcd(x·(y+1), (y+1)) = y+1.
    #[test]
    fn gcd_in_content_only() {
        let ctx = ctx2();
        let a = img(&ctx, &[(1, &[1, 1]), (1, &[1, 0])]);
        let b = img(&ctx, &[(1, &[0, 1]), (1, &[0, 0])]);
        let want = img(&ctx, &[(1, &[0, 1]), (1, &[0, 0])]);
        assert_eq!(gcd(&a, &b, &ctx, false), want);
    }

    /// Coprime inputs give gcd 1 and the inputs back as cofactors.
    #[test]
    fn coprime_inputs() {
        let ctx = ctx2();
        let a = img(&ctx, &[(1, &[2, 0])]);
        let b = img(&ctx, &[(1, &[0, 1]), (1, &[0, 0])]);
        let (g, abar, bbar) = gcd_cofactors(&a, &b, &ctx, 0).unwrap();
        assert!(g.is_scalar());
        assert_eq!(abar, a);
        assert_eq!(bbar, b);
    }

    /// Cofactors multiply back to the inputs and the gcd is monic.
    #[test]
    fn cofactors_reconstruct_inputs() {
        let ctx = ctx2();
        let a = img(&ctx, &[(1, &[2, 0]), (-1, &[0, 2])]); // (x+y)(x−y)
        let b = img(&ctx, &[(1, &[2, 0]), (3, &[1, 1]), (2, &[0, 2])]); // (x+y)(x+2y)
        let (g, abar, bbar) = gcd_cofactors(&a, &b, &ctx, 0).unwrap();
        assert_eq!(g.leading().unwrap().1, 1);
        assert_eq!(g.mul(&abar, &ctx), a);
        assert_eq!(g.mul(&bbar, &ctx), b);
    }

    /// gcd against zero and scalars follows the field conventions.
    #[test]
    fn zero_and_scalar_conventions() {
        let ctx = ctx2();
        let a = img(&ctx, &[(7, &[1, 0]), (7, &[0, 0])]);
        let z = ModPoly::zero(P);
        assert_eq!(gcd(&a, &z, &ctx, false), a.monic());
        assert_eq!(gcd(&z, &a, &ctx, false), a.monic());
        let s = img(&ctx, &[(5, &[0, 0])]);
        assert!(gcd(&a, &s, &ctx, false).is_scalar());
    }

    /// A larger mixed case: g = x²y + 3, a = g·(x+1), b = g·(y²+x).
    #[test]
    fn structured_mixed_case() {
        let ctx = ctx2();
        let g0 = img(&ctx, &[(1, &[2, 1]), (3, &[0, 0])]);
        let fa = img(&ctx, &[(1, &[1, 0]), (1, &[0, 0])]);
        let fb = img(&ctx, &[(1, &[0, 2]), (1, &[1, 0])]);
        let a = g0.mul(&fa, &ctx);
        let b = g0.mul(&fb, &ctx);
        let (g, abar, bbar) = gcd_cofactors(&a, &b, &ctx, 0).unwrap();
        assert_eq!(g, g0.monic());
        assert_eq!(g.mul(&abar, &ctx), a);
        assert_eq!(g.mul(&bbar, &ctx), b);
    }

    /// The parallel content fold agrees with the sequential one.
    #[test]
    fn parallel_matches_sequential() {
        let ctx = ctx2();
        let g0 = img(&ctx, &[(1, &[1, 1]), (2, &[0, 0])]);
        let a = g0.mul(
            &img(&ctx, &[(1, &[3, 0]), (1, &[2, 1]), (1, &[1, 0]), (4, &[0, 3])]),
            &ctx,
        );
        let b = g0.mul(
            &img(&ctx, &[(2, &[2, 2]), (1, &[1, 0]), (5, &[0, 1])]),
            &ctx,
        );
        assert_eq!(gcd(&a, &b, &ctx, false), gcd(&a, &b, &ctx, true));
    }
}
