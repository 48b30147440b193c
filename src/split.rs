//! # Split — Parallel Collection of Prime Images
//!
//! Masters share two things: a strictly increasing prime cursor behind one
//! mutex, and the `gcd_is_one` flag. Everything else — the running G, Abar,
//! Bbar accumulators, their modulus, and the image count — is private to
//! each master, so the only synchronization cost is one short lock per
//! prime fetched.
//!
//! Per prime the master reduces both inputs, asks the modular GCD for an
//! image with cofactors, and folds the image into its accumulators:
//! single-prime symmetric lift for the first image, a two-moduli CRT
//! combine afterwards. Defective primes heal themselves:
//!
//! - `γ mod p = 0` or a declined modular GCD: skip the prime.
//! - image shape strictly larger than the accumulated shape: the prime is
//!   unlucky, skip it.
//! - image shape strictly smaller: every *previous* prime was unlucky —
//!   reset the accumulators and restart from this image.
//! - a constant image: the gcd is 1; raise the shared flag so every master
//!   winds down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use rug::Integer;
use tracing::{debug, trace};

use crate::crt::{CrtProgram, CrtScratch};
use crate::merge;
use crate::modgcd;
use crate::modpoly::{self, ModPoly};
use crate::poly::{Ctx, UniPoly};
use crate::primes;
use crate::rem_u64;

/// State shared by every master of one split section. The polynomial
/// inputs and γ are read-only during the section.
pub struct SplitState<'a> {
    ctx: &'a Ctx,
    a: &'a UniPoly,
    b: &'a UniPoly,
    gamma: &'a Integer,
    cursor: Mutex<u64>,
    gcd_is_one: AtomicBool,
}

impl<'a> SplitState<'a> {
    /// Shared state with the prime cursor at the engine's floor (2^62).
    pub fn new(ctx: &'a Ctx, a: &'a UniPoly, b: &'a UniPoly, gamma: &'a Integer) -> Self {
        SplitState::with_floor(ctx, a, b, gamma, primes::PRIME_FLOOR)
    }

    /// Shared state with an explicit prime floor. The floor is exclusive:
    /// the first prime handed out is the least prime above it.
    pub fn with_floor(
        ctx: &'a Ctx,
        a: &'a UniPoly,
        b: &'a UniPoly,
        gamma: &'a Integer,
        floor: u64,
    ) -> Self {
        SplitState {
            ctx,
            a,
            b,
            gamma,
            cursor: Mutex::new(floor),
            gcd_is_one: AtomicBool::new(false),
        }
    }

    /// Has any master discovered a constant image? Lock-free hint; the
    /// authoritative write happens in [`collect_images`].
    pub fn gcd_is_one(&self) -> bool {
        self.gcd_is_one.load(Ordering::Acquire)
    }

    fn set_gcd_is_one(&self) {
        self.gcd_is_one.store(true, Ordering::Release);
    }

    /// Advance the shared cursor and return a fresh prime, or `None` once
    /// the 64-bit pool is exhausted.
    fn fetch_prime(&self) -> Option<u64> {
        let mut cur = self.cursor.lock().unwrap();
        let p = primes::next_prime(*cur)?;
        *cur = p;
        Some(p)
    }
}

/// One master's accumulated reconstruction: G, Abar, Bbar lifted over
/// `modulus` (the product of the images' primes), plus the image count.
#[derive(Clone, Debug)]
pub struct MasterImage {
    pub g: UniPoly,
    pub abar: UniPoly,
    pub bbar: UniPoly,
    pub modulus: Integer,
    pub images: usize,
}

impl MasterImage {
    fn empty() -> Self {
        MasterImage {
            g: UniPoly::zero(),
            abar: UniPoly::zero(),
            bbar: UniPoly::zero(),
            modulus: Integer::from(1u32),
            images: 0,
        }
    }

    fn reset(&mut self) {
        *self = MasterImage::empty();
    }
}

/// Master loop: accumulate `required` prime images, giving the modular GCD
/// `helpers` extra threads. Exits early when the pool is dry (fewer images
/// than required — the caller surfaces that as failure) or when any master
/// has set the gcd-is-one flag.
pub fn collect_images(state: &SplitState, required: usize, helpers: usize) -> MasterImage {
    let ctx = state.ctx;
    let mut acc = MasterImage::empty();

    while acc.images < required {
        if state.gcd_is_one() {
            break;
        }
        let Some(p) = state.fetch_prime() else {
            debug!("prime pool exhausted at {} of {required} images", acc.images);
            break;
        };

        let gamma_p = rem_u64(state.gamma, p);
        if gamma_p == 0 {
            trace!("prime {p} divides the leading-coefficient gcd, skipped");
            continue;
        }

        let ap = modpoly::reduce_uni(state.a, p, ctx);
        let bp = modpoly::reduce_uni(state.b, p, ctx);
        let Some((gp, abarp, bbarp)) = modgcd::gcd_cofactors(&ap, &bp, ctx, helpers) else {
            trace!("modular gcd declined prime {p}, skipped");
            continue;
        };

        if state.gcd_is_one() {
            break;
        }
        if gp.is_scalar() {
            debug!("constant image at prime {p}: inputs are coprime");
            state.set_gcd_is_one();
            break;
        }

        if acc.images > 0 {
            let new = gp.shape(ctx).expect("nonzero image has a shape");
            let cur = acc.g.shape().expect("nonempty accumulator has a shape");
            match new.cmp(&cur) {
                std::cmp::Ordering::Greater => {
                    trace!("unlucky prime {p}: image shape too large, skipped");
                    continue;
                }
                std::cmp::Ordering::Less => {
                    trace!("image at prime {p} beats the accumulator: resetting");
                    acc.reset();
                }
                std::cmp::Ordering::Equal => {}
            }
        }

        // the modular gcd is monic; rescale so lc matches γ mod p
        let gp = gp.scalar_mul(gamma_p);
        fold_image(&mut acc, &gp, &abarp, &bbarp, p, ctx);
    }
    acc
}

/// Fold one accepted image into the accumulators: symmetric lift for the
/// first prime, two-moduli CRT combine afterwards.
fn fold_image(
    acc: &mut MasterImage,
    gp: &ModPoly,
    abarp: &ModPoly,
    bbarp: &ModPoly,
    p: u64,
    ctx: &Ctx,
) {
    if acc.images == 0 {
        acc.g = modpoly::to_uni_symmetric(gp, ctx);
        acc.abar = modpoly::to_uni_symmetric(abarp, ctx);
        acc.bbar = modpoly::to_uni_symmetric(bbarp, ctx);
        acc.modulus = Integer::from(p);
    } else {
        let prog = CrtProgram::compile(&[acc.modulus.clone(), Integer::from(p)])
            .expect("a fresh prime is coprime to the accumulated modulus");
        let mut scratch = CrtScratch::for_program(&prog);
        let (mut hmax, mut hsum) = (Integer::new(), Integer::new());
        acc.g = merge::crt_uni(
            &prog,
            &mut scratch,
            &mut hmax,
            &mut hsum,
            &[&acc.g, &modpoly::to_uni(gp, ctx)],
        );
        acc.abar = merge::crt_uni(
            &prog,
            &mut scratch,
            &mut hmax,
            &mut hsum,
            &[&acc.abar, &modpoly::to_uni(abarp, ctx)],
        );
        acc.bbar = merge::crt_uni(
            &prog,
            &mut scratch,
            &mut hmax,
            &mut hsum,
            &[&acc.bbar, &modpoly::to_uni(bbarp, ctx)],
        );
        acc.modulus *= Integer::from(p);
    }
    acc.images += 1;
}
