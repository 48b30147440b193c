//! # Poly — Packed-Monomial Sparse Polynomials over the Integers
//!
//! Two containers back the engine:
//!
//! - [`Poly`]: a flat sparse multivariate polynomial, an ordered sequence of
//!   (packed exponent vector, coefficient) terms with strictly decreasing
//!   monomials and no zero coefficients.
//! - [`UniPoly`]: the same polynomial viewed recursively in one distinguished
//!   variable X — a sparse sequence of (X-exponent, [`Poly`]) pairs with
//!   strictly decreasing exponents. The modular engine works on this view.
//!
//! ## Packed monomials
//!
//! All exponents of a term pack into one `u64`, `64 / nvars` bits per
//! variable, variable 0 (the distinguished X) in the most significant field.
//! Plain `u64` comparison is then the lexicographic monomial order with X
//! strongest, and monomial division is plain subtraction once fieldwise
//! divisibility holds. Construction rejects exponents wider than a field
//! with [`GcdError::ExponentOverflow`]; *intermediate* products that outgrow
//! a field panic with a clear message, the same contract as an exponent that
//! would silently truncate.

use rug::Integer;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::GcdError;

/// Monomial layout: variable count and bits per packed exponent field.
/// Variable 0 is the distinguished variable X of the recursive view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ctx {
    nvars: usize,
    bits: u32,
}

impl Ctx {
    /// A context for `nvars` variables with the widest even field split.
    /// Fails when no usable layout exists (`nvars` 0 or more than 32).
    pub fn new(nvars: usize) -> Result<Self, GcdError> {
        if nvars == 0 || nvars > 32 {
            return Err(GcdError::ExponentOverflow);
        }
        Ok(Ctx {
            nvars,
            bits: (64 / nvars) as u32,
        })
    }

    pub fn nvars(&self) -> usize {
        self.nvars
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    #[inline]
    pub(crate) fn field_shift(&self, var: usize) -> u32 {
        debug_assert!(var < self.nvars);
        ((self.nvars - 1 - var) as u32) * self.bits
    }

    #[inline]
    pub(crate) fn field_mask(&self) -> u64 {
        if self.bits == 64 {
            u64::MAX
        } else {
            (1u64 << self.bits) - 1
        }
    }

    /// The exponent of `var` in a packed monomial.
    #[inline]
    pub fn exponent(&self, mono: u64, var: usize) -> u64 {
        (mono >> self.field_shift(var)) & self.field_mask()
    }

    /// Pack an exponent vector (one entry per variable, variable 0 first).
    pub fn pack(&self, exps: &[u64]) -> Result<u64, GcdError> {
        assert_eq!(
            exps.len(),
            self.nvars,
            "exponent vector length must match the context"
        );
        let mut mono = 0u64;
        for (var, &e) in exps.iter().enumerate() {
            if e > self.field_mask() {
                return Err(GcdError::ExponentOverflow);
            }
            mono |= e << self.field_shift(var);
        }
        Ok(mono)
    }

    /// Unpack a monomial into its exponent vector.
    pub fn unpack(&self, mono: u64) -> Vec<u64> {
        (0..self.nvars).map(|v| self.exponent(mono, v)).collect()
    }

    /// Monomial product. Panics if any exponent field overflows; silent
    /// truncation here would corrupt every downstream comparison.
    pub(crate) fn mono_mul(&self, a: u64, b: u64) -> u64 {
        let mut out = 0u64;
        for var in 0..self.nvars {
            let s = self
                .exponent(a, var)
                .checked_add(self.exponent(b, var))
                .filter(|&s| s <= self.field_mask())
                .unwrap_or_else(|| {
                    panic!(
                        "monomial product overflows the {}-bit exponent field",
                        self.bits
                    )
                });
            out |= s << self.field_shift(var);
        }
        out
    }

    /// Does `b` divide `a` fieldwise?
    #[inline]
    pub(crate) fn mono_divides(&self, a: u64, b: u64) -> bool {
        (0..self.nvars).all(|v| self.exponent(b, v) <= self.exponent(a, v))
    }

    /// Monomial quotient a / b. With fieldwise divisibility established,
    /// no field borrows, so the packed subtraction is exact.
    #[inline]
    pub(crate) fn mono_div(&self, a: u64, b: u64) -> u64 {
        debug_assert!(self.mono_divides(a, b));
        a - b
    }
}

/// Flat sparse multivariate polynomial over the integers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Poly {
    terms: Vec<(u64, Integer)>,
}

impl Poly {
    pub fn zero() -> Self {
        Poly::default()
    }

    /// The constant polynomial `c` (the zero polynomial when `c = 0`).
    pub fn constant(c: Integer) -> Self {
        if c == 0 {
            Poly::default()
        } else {
            Poly {
                terms: vec![(0, c)],
            }
        }
    }

    pub fn one() -> Self {
        Poly::constant(Integer::from(1u32))
    }

    /// Canonical construction: sorts descending, combines equal monomials,
    /// drops zero coefficients.
    pub fn from_terms(mut terms: Vec<(u64, Integer)>) -> Self {
        terms.sort_by(|x, y| y.0.cmp(&x.0));
        let mut out: Vec<(u64, Integer)> = Vec::with_capacity(terms.len());
        for (mono, c) in terms {
            match out.last_mut() {
                Some(last) if last.0 == mono => last.1 += c,
                _ => out.push((mono, c)),
            }
        }
        out.retain(|(_, c)| *c != 0);
        Poly { terms: out }
    }

    /// Build from (coefficient, exponent vector) pairs; test and example
    /// convenience.
    pub fn from_pairs(ctx: &Ctx, pairs: &[(i64, &[u64])]) -> Result<Self, GcdError> {
        let mut terms = Vec::with_capacity(pairs.len());
        for &(c, exps) in pairs {
            terms.push((ctx.pack(exps)?, Integer::from(c)));
        }
        Ok(Poly::from_terms(terms))
    }

    pub fn terms(&self) -> &[(u64, Integer)] {
        &self.terms
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn is_one(&self) -> bool {
        self.terms.len() == 1 && self.terms[0].0 == 0 && self.terms[0].1 == 1
    }

    /// Leading (greatest) term, if any.
    pub fn leading(&self) -> Option<(u64, &Integer)> {
        self.terms.first().map(|(m, c)| (*m, c))
    }

    /// Append a term below every existing one. Callers supply terms in
    /// strictly decreasing monomial order with nonzero coefficients.
    pub(crate) fn push_term(&mut self, mono: u64, c: Integer) {
        debug_assert!(c != 0);
        debug_assert!(self.terms.last().map_or(true, |(m, _)| *m > mono));
        self.terms.push((mono, c));
    }

    /// Positive integer gcd of all coefficients; 0 for the zero polynomial.
    pub fn content(&self) -> Integer {
        let mut g = Integer::new();
        for (_, c) in &self.terms {
            g = Integer::from(g.gcd_ref(c));
            if g == 1 {
                break;
            }
        }
        g
    }

    /// Maximum absolute coefficient value; 0 for the zero polynomial.
    pub fn height(&self) -> Integer {
        let mut h = Integer::new();
        for (_, c) in &self.terms {
            let a = Integer::from(c.abs_ref());
            if a > h {
                h = a;
            }
        }
        h
    }

    pub fn neg(&self) -> Poly {
        Poly {
            terms: self
                .terms
                .iter()
                .map(|(m, c)| (*m, Integer::from(-c)))
                .collect(),
        }
    }

    /// Scalar multiple; `c` must be nonzero or the zero polynomial results.
    pub fn mul_int(&self, c: &Integer) -> Poly {
        if *c == 0 {
            return Poly::default();
        }
        Poly {
            terms: self
                .terms
                .iter()
                .map(|(m, t)| (*m, Integer::from(t * c)))
                .collect(),
        }
    }

    /// Exact scalar division; every coefficient must be divisible by `c`.
    pub fn divexact_int(&self, c: &Integer) -> Poly {
        debug_assert!(*c != 0);
        Poly {
            terms: self
                .terms
                .iter()
                .map(|(m, t)| (*m, Integer::from(t.div_exact_ref(c))))
                .collect(),
        }
    }

    /// Sum of two canonical polynomials (merge of sorted term lists).
    pub fn add(&self, other: &Poly) -> Poly {
        let (mut i, mut j) = (0, 0);
        let mut out = Vec::with_capacity(self.terms.len() + other.terms.len());
        while i < self.terms.len() && j < other.terms.len() {
            let (ma, ca) = &self.terms[i];
            let (mb, cb) = &other.terms[j];
            if ma > mb {
                out.push((*ma, ca.clone()));
                i += 1;
            } else if ma < mb {
                out.push((*mb, cb.clone()));
                j += 1;
            } else {
                let s = Integer::from(ca + cb);
                if s != 0 {
                    out.push((*ma, s));
                }
                i += 1;
                j += 1;
            }
        }
        out.extend(self.terms[i..].iter().cloned());
        out.extend(other.terms[j..].iter().cloned());
        Poly { terms: out }
    }

    pub fn sub(&self, other: &Poly) -> Poly {
        self.add(&other.neg())
    }

    /// Product of two polynomials. Quadratic in the term counts; used by the
    /// identity checks in tests, never on the engine's hot path.
    pub fn mul(&self, other: &Poly, ctx: &Ctx) -> Poly {
        let mut acc: BTreeMap<Reverse<u64>, Integer> = BTreeMap::new();
        for (ma, ca) in &self.terms {
            for (mb, cb) in &other.terms {
                let m = ctx.mono_mul(*ma, *mb);
                *acc.entry(Reverse(m)).or_insert_with(Integer::new) += Integer::from(ca * cb);
            }
        }
        Poly {
            terms: acc
                .into_iter()
                .filter(|(_, c)| *c != 0)
                .map(|(Reverse(m), c)| (m, c))
                .collect(),
        }
    }
}

/// Image shape: the exponent of the leading X-term paired with the leading
/// monomial of its coefficient. The total (lexicographic) order on shapes
/// drives unlucky-prime recovery — a strictly smaller shape wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Shape {
    pub xdeg: u64,
    pub coeff_mono: u64,
}

/// Sparse polynomial in the distinguished variable X over [`Poly`]
/// coefficients; X-exponents strictly decreasing, coefficients nonzero.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UniPoly {
    terms: Vec<(u64, Poly)>,
}

impl UniPoly {
    pub fn zero() -> Self {
        UniPoly::default()
    }

    pub fn constant(c: Integer) -> Self {
        let p = Poly::constant(c);
        if p.is_zero() {
            UniPoly::default()
        } else {
            UniPoly {
                terms: vec![(0, p)],
            }
        }
    }

    pub fn one() -> Self {
        UniPoly::constant(Integer::from(1u32))
    }

    pub fn from_terms(mut terms: Vec<(u64, Poly)>) -> Self {
        terms.retain(|(_, p)| !p.is_zero());
        terms.sort_by(|x, y| y.0.cmp(&x.0));
        debug_assert!(terms.windows(2).all(|w| w[0].0 > w[1].0));
        UniPoly { terms }
    }

    pub fn terms(&self) -> &[(u64, Poly)] {
        &self.terms
    }

    pub(crate) fn into_terms(self) -> Vec<(u64, Poly)> {
        self.terms
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    /// Degree in X, `None` for the zero polynomial.
    pub fn degree(&self) -> Option<u64> {
        self.terms.first().map(|(e, _)| *e)
    }

    /// The coefficient of X^exp, if present.
    pub fn coeff_of(&self, exp: u64) -> Option<&Poly> {
        self.terms
            .binary_search_by(|(e, _)| exp.cmp(e))
            .ok()
            .map(|i| &self.terms[i].1)
    }

    /// The leading coefficient polynomial.
    pub fn leading_poly(&self) -> Option<&Poly> {
        self.terms.first().map(|(_, p)| p)
    }

    /// The leading scalar: the integer coefficient of the overall leading
    /// monomial. Zero for the zero polynomial.
    pub fn lead_scalar(&self) -> Integer {
        self.leading_poly()
            .and_then(|p| p.leading())
            .map(|(_, c)| c.clone())
            .unwrap_or_default()
    }

    /// The shape of a nonzero polynomial.
    pub fn shape(&self) -> Option<Shape> {
        let (xdeg, p) = self.terms.first()?;
        let (coeff_mono, _) = p.leading()?;
        Some(Shape {
            xdeg: *xdeg,
            coeff_mono,
        })
    }

    /// Append a term below every existing one (strictly smaller exponent).
    pub(crate) fn push_term(&mut self, exp: u64, p: Poly) {
        debug_assert!(!p.is_zero());
        debug_assert!(self.terms.last().map_or(true, |(e, _)| *e > exp));
        self.terms.push((exp, p));
    }

    /// Positive integer gcd over all coefficients of all terms.
    pub fn content(&self) -> Integer {
        let mut g = Integer::new();
        for (_, p) in &self.terms {
            g = Integer::from(g.gcd_ref(&p.content()));
            if g == 1 {
                break;
            }
        }
        g
    }

    /// Maximum absolute coefficient over the whole polynomial.
    pub fn height(&self) -> Integer {
        let mut h = Integer::new();
        for (_, p) in &self.terms {
            let a = p.height();
            if a > h {
                h = a;
            }
        }
        h
    }

    pub fn neg(&self) -> UniPoly {
        UniPoly {
            terms: self.terms.iter().map(|(e, p)| (*e, p.neg())).collect(),
        }
    }

    pub fn mul_int(&self, c: &Integer) -> UniPoly {
        if *c == 0 {
            return UniPoly::default();
        }
        UniPoly {
            terms: self
                .terms
                .iter()
                .map(|(e, p)| (*e, p.mul_int(c)))
                .collect(),
        }
    }

    pub fn divexact_int(&self, c: &Integer) -> UniPoly {
        UniPoly {
            terms: self
                .terms
                .iter()
                .map(|(e, p)| (*e, p.divexact_int(c)))
                .collect(),
        }
    }

    /// Product in the recursive view; the X-exponent arithmetic is plain
    /// addition, coefficients multiply as [`Poly`]. Test support.
    pub fn mul(&self, other: &UniPoly, ctx: &Ctx) -> UniPoly {
        let mut acc: BTreeMap<Reverse<u64>, Poly> = BTreeMap::new();
        for (ea, pa) in &self.terms {
            for (eb, pb) in &other.terms {
                let prod = pa.mul(pb, ctx);
                let slot = acc.entry(Reverse(ea + eb)).or_default();
                *slot = slot.add(&prod);
            }
        }
        UniPoly {
            terms: acc
                .into_iter()
                .filter(|(_, p)| !p.is_zero())
                .map(|(Reverse(e), p)| (e, p))
                .collect(),
        }
    }

    /// Collapse into the flat view: X's exponent moves into field 0 of each
    /// packed monomial.
    pub fn to_flat(&self, ctx: &Ctx) -> Poly {
        let shift = ctx.field_shift(0);
        let mut out = Poly::default();
        for (xexp, p) in &self.terms {
            debug_assert!(*xexp <= ctx.field_mask());
            for (mono, c) in p.terms() {
                out.push_term(mono | (xexp << shift), c.clone());
            }
        }
        out
    }

    /// Split the flat view on variable 0. Inverse of [`UniPoly::to_flat`].
    pub fn from_flat(p: &Poly, ctx: &Ctx) -> UniPoly {
        let shift = ctx.field_shift(0);
        let mut out = UniPoly::default();
        let mut cur: Option<(u64, Poly)> = None;
        for (mono, c) in p.terms() {
            let xexp = ctx.exponent(*mono, 0);
            let inner = mono - (xexp << shift);
            match &mut cur {
                Some((e, acc)) if *e == xexp => acc.push_term(inner, c.clone()),
                _ => {
                    if let Some((e, acc)) = cur.take() {
                        out.push_term(e, acc);
                    }
                    let mut acc = Poly::default();
                    acc.push_term(inner, c.clone());
                    cur = Some((xexp, acc));
                }
            }
        }
        if let Some((e, acc)) = cur {
            out.push_term(e, acc);
        }
        out
    }
}
