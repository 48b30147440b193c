//! # ModPoly — Prime-Field Images of Sparse Polynomials
//!
//! A [`ModPoly`] is the image of a polynomial modulo a word prime `p`, kept
//! flat: one packed monomial per term with the X-exponent in field 0, so the
//! term order coincides with the recursive (X-first) order and the leading
//! monomial *is* the image shape. Coefficients live in `[1, p)`.
//!
//! Alongside the container sit the three boundary crossings the split phase
//! needs each prime: coefficient-wise reduction of a [`UniPoly`], conversion
//! of an image back to integer coefficients in `[0, p)` for CRT input, and
//! the symmetric (least-absolute) lift used for the first image.

use rug::Integer;

use crate::poly::{Ctx, Poly, Shape, UniPoly};
use crate::primes::{add_mod, inv_mod, mul_mod, sub_mod};
use crate::rem_u64;

/// Sparse polynomial over F_p with packed monomials, strictly decreasing.
///
/// Invariant: `p` is one of the engine's word primes. The module is
/// crate-internal and every image is created from a prime handed out by
/// [`crate::primes::next_prime`], so constructors do not re-validate it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModPoly {
    p: u64,
    terms: Vec<(u64, u64)>,
}

impl ModPoly {
    pub fn zero(p: u64) -> Self {
        ModPoly { p, terms: Vec::new() }
    }

    /// The constant polynomial `c mod p`.
    pub fn constant(p: u64, c: u64) -> Self {
        let c = c % p;
        if c == 0 {
            ModPoly::zero(p)
        } else {
            ModPoly {
                p,
                terms: vec![(0, c)],
            }
        }
    }

    pub fn one(p: u64) -> Self {
        ModPoly::constant(p, 1)
    }

    /// Canonical construction from arbitrary (monomial, coefficient) pairs.
    pub fn from_terms(p: u64, mut terms: Vec<(u64, u64)>) -> Self {
        terms.sort_by(|x, y| y.0.cmp(&x.0));
        let mut out: Vec<(u64, u64)> = Vec::with_capacity(terms.len());
        for (mono, c) in terms {
            let c = c % p;
            match out.last_mut() {
                Some(last) if last.0 == mono => last.1 = add_mod(last.1, c, p),
                _ => out.push((mono, c)),
            }
        }
        out.retain(|&(_, c)| c != 0);
        ModPoly { p, terms: out }
    }

    pub fn modulus(&self) -> u64 {
        self.p
    }

    pub fn terms(&self) -> &[(u64, u64)] {
        &self.terms
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    /// A nonzero constant: degree zero in every variable.
    pub fn is_scalar(&self) -> bool {
        self.terms.len() == 1 && self.terms[0].0 == 0
    }

    pub fn leading(&self) -> Option<(u64, u64)> {
        self.terms.first().copied()
    }

    /// The image shape, read off the leading packed monomial.
    pub fn shape(&self, ctx: &Ctx) -> Option<Shape> {
        let (mono, _) = self.leading()?;
        let xdeg = ctx.exponent(mono, 0);
        Some(Shape {
            xdeg,
            coeff_mono: mono - (xdeg << ctx.field_shift(0)),
        })
    }

    pub fn scalar_mul(&self, c: u64) -> ModPoly {
        let c = c % self.p;
        if c == 0 {
            return ModPoly::zero(self.p);
        }
        ModPoly {
            p: self.p,
            terms: self
                .terms
                .iter()
                .map(|&(m, t)| (m, mul_mod(t, c, self.p)))
                .collect(),
        }
    }

    /// Scale so the leading coefficient becomes 1. Identity on zero.
    pub fn monic(&self) -> ModPoly {
        match self.leading() {
            None => self.clone(),
            Some((_, lc)) => {
                let inv = inv_mod(lc, self.p)
                    .expect("nonzero leading coefficient is invertible modulo a prime");
                self.scalar_mul(inv)
            }
        }
    }

    /// Difference, term-merged.
    pub fn sub(&self, other: &ModPoly) -> ModPoly {
        debug_assert_eq!(self.p, other.p);
        let p = self.p;
        let (mut i, mut j) = (0, 0);
        let mut out = Vec::with_capacity(self.terms.len() + other.terms.len());
        while i < self.terms.len() && j < other.terms.len() {
            let (ma, ca) = self.terms[i];
            let (mb, cb) = other.terms[j];
            if ma > mb {
                out.push((ma, ca));
                i += 1;
            } else if ma < mb {
                out.push((mb, sub_mod(0, cb, p)));
                j += 1;
            } else {
                let d = sub_mod(ca, cb, p);
                if d != 0 {
                    out.push((ma, d));
                }
                i += 1;
                j += 1;
            }
        }
        out.extend_from_slice(&self.terms[i..]);
        out.extend(other.terms[j..].iter().map(|&(m, c)| (m, sub_mod(0, c, p))));
        ModPoly { p, terms: out }
    }

    /// Product, accumulated then renormalized.
    pub fn mul(&self, other: &ModPoly, ctx: &Ctx) -> ModPoly {
        debug_assert_eq!(self.p, other.p);
        let mut prods = Vec::with_capacity(self.terms.len() * other.terms.len());
        for &(ma, ca) in &self.terms {
            for &(mb, cb) in &other.terms {
                prods.push((ctx.mono_mul(ma, mb), mul_mod(ca, cb, self.p)));
            }
        }
        ModPoly::from_terms(self.p, prods)
    }

    /// Multiply every term by one monomial.
    pub fn mul_mono(&self, mono: u64, ctx: &Ctx) -> ModPoly {
        ModPoly {
            p: self.p,
            terms: self
                .terms
                .iter()
                .map(|&(m, c)| (ctx.mono_mul(m, mono), c))
                .collect(),
        }
    }

    /// Exact division: `Some(q)` with `self = q·d`, or `None` when `d` does
    /// not divide `self`.
    pub fn div_exact(&self, d: &ModPoly, ctx: &Ctx) -> Option<ModPoly> {
        debug_assert_eq!(self.p, d.p);
        let (dm, dc) = d.leading()?;
        let dcinv = inv_mod(dc, self.p)?;
        let mut r = self.clone();
        let mut q = ModPoly::zero(self.p);
        while let Some((rm, rc)) = r.leading() {
            if !ctx.mono_divides(rm, dm) {
                return None;
            }
            let qm = ctx.mono_div(rm, dm);
            let qc = mul_mod(rc, dcinv, self.p);
            // leading monomials strictly decrease, so pushes stay ordered
            q.terms.push((qm, qc));
            let t = ModPoly {
                p: self.p,
                terms: vec![(qm, qc)],
            };
            r = r.sub(&t.mul(d, ctx));
        }
        Some(q)
    }

    /// Degree in one variable (0 for the zero polynomial).
    pub fn deg_in(&self, var: usize, ctx: &Ctx) -> u64 {
        self.terms
            .iter()
            .map(|&(m, _)| ctx.exponent(m, var))
            .max()
            .unwrap_or(0)
    }

    /// View as a univariate polynomial in `var`, which must be the most
    /// significant variable present: coefficient polynomials in decreasing
    /// exponent order. Each coefficient keeps its remaining variables.
    pub fn coeffs_in_var(&self, var: usize, ctx: &Ctx) -> Vec<(u64, ModPoly)> {
        let shift = ctx.field_shift(var);
        let mut out: Vec<(u64, ModPoly)> = Vec::new();
        for &(m, c) in &self.terms {
            let e = ctx.exponent(m, var);
            let inner = m - (e << shift);
            match out.last_mut() {
                Some((le, lp)) if *le == e => lp.terms.push((inner, c)),
                _ => out.push((
                    e,
                    ModPoly {
                        p: self.p,
                        terms: vec![(inner, c)],
                    },
                )),
            }
        }
        out
    }

    /// The leading coefficient with respect to `var` (most significant
    /// variable present), as a polynomial in the remaining variables.
    pub fn lead_coeff_in(&self, var: usize, ctx: &Ctx) -> ModPoly {
        let deg = self.deg_in(var, ctx);
        let shift = ctx.field_shift(var);
        let terms = self
            .terms
            .iter()
            .take_while(|&&(m, _)| ctx.exponent(m, var) == deg)
            .map(|&(m, c)| (m - (deg << shift), c))
            .collect();
        ModPoly { p: self.p, terms }
    }

    /// Rebuild from the univariate-in-`var` view.
    pub fn from_var_coeffs(p: u64, var: usize, pairs: &[(u64, ModPoly)], ctx: &Ctx) -> ModPoly {
        let shift = ctx.field_shift(var);
        let mut terms = Vec::new();
        for (e, poly) in pairs {
            for &(m, c) in &poly.terms {
                terms.push((m + (e << shift), c));
            }
        }
        ModPoly::from_terms(p, terms)
    }
}

/// Reduce a [`UniPoly`] coefficient-wise modulo `p`. The flat image keeps
/// the recursive order because X packs into the most significant field.
pub fn reduce_uni(a: &UniPoly, p: u64, ctx: &Ctx) -> ModPoly {
    let shift = ctx.field_shift(0);
    let mut terms = Vec::new();
    for (xexp, poly) in a.terms() {
        for (mono, c) in poly.terms() {
            let cp = rem_u64(c, p);
            if cp != 0 {
                terms.push((mono | (xexp << shift), cp));
            }
        }
    }
    ModPoly { p, terms }
}

/// Convert an image into the recursive integer view with residues in
/// `[0, p)` — the CRT input form.
pub fn to_uni(g: &ModPoly, ctx: &Ctx) -> UniPoly {
    split_by_x(g, ctx, |c, _| Integer::from(c))
}

/// Convert an image into the recursive integer view with least-absolute
/// residues in `(−p/2, p/2]` — the single-prime reconstruction.
pub fn to_uni_symmetric(g: &ModPoly, ctx: &Ctx) -> UniPoly {
    split_by_x(g, ctx, |c, p| {
        if c > p / 2 {
            Integer::from(c) - Integer::from(p)
        } else {
            Integer::from(c)
        }
    })
}

fn split_by_x(g: &ModPoly, ctx: &Ctx, lift: impl Fn(u64, u64) -> Integer) -> UniPoly {
    let shift = ctx.field_shift(0);
    let p = g.modulus();
    let mut out = UniPoly::default();
    let mut cur: Option<(u64, Poly)> = None;
    for &(mono, c) in g.terms() {
        let xexp = ctx.exponent(mono, 0);
        let inner = mono - (xexp << shift);
        let coeff = lift(c, p);
        match &mut cur {
            Some((e, acc)) if *e == xexp => acc.push_term(inner, coeff),
            _ => {
                if let Some((e, acc)) = cur.take() {
                    out.push_term(e, acc);
                }
                let mut acc = Poly::default();
                acc.push_term(inner, coeff);
                cur = Some((xexp, acc));
            }
        }
    }
    if let Some((e, acc)) = cur {
        out.push_term(e, acc);
    }
    out
}
