//! # Join — Parallel CRT Reconstruction across Exponent Slots
//!
//! Per-exponent reconstruction is embarrassingly parallel: every X-exponent
//! of G, Abar, and Bbar can be merged independently. One CRT program is
//! compiled over all image moduli; three descending exponent cursors (G
//! first, then Abar, then Bbar) sit behind a single mutex, and each worker
//! repeatedly claims one exponent, runs the aligned merge into its private
//! output, and tracks its own height statistics. A cursor below zero is
//! spent; when all three are spent the workers drain.
//!
//! Workers claim exponents in descending order, so each private output is
//! itself strictly decreasing; the serial final merge just keeps swapping
//! out whichever worker's head carries the greatest exponent — O(terms ×
//! workers), no re-sorting.

use std::sync::Mutex;

use rayon::prelude::*;
use rug::Integer;

use crate::crt::{CrtProgram, CrtScratch};
use crate::merge;
use crate::poly::UniPoly;
use crate::GcdError;

/// One image triple awaiting reconstruction, with its modulus.
#[derive(Clone, Copy, Debug)]
pub struct JoinImage<'a> {
    pub g: &'a UniPoly,
    pub abar: &'a UniPoly,
    pub bbar: &'a UniPoly,
    pub modulus: &'a Integer,
}

/// The reconstructed triple plus the height statistics the divisibility
/// check consumes, and the combined modulus.
#[derive(Clone, Debug)]
pub struct Joined {
    pub g: UniPoly,
    pub abar: UniPoly,
    pub bbar: UniPoly,
    pub gmax: Integer,
    pub gsum: Integer,
    pub abarmax: Integer,
    pub abarsum: Integer,
    pub bbarmax: Integer,
    pub bbarsum: Integer,
    pub modulus: Integer,
}

const CHANNELS: usize = 3;

struct Shared<'a> {
    prog: &'a CrtProgram,
    inputs: [Vec<&'a UniPoly>; CHANNELS],
    cursors: Mutex<[i64; CHANNELS]>,
}

#[derive(Default)]
struct WorkerOut {
    polys: [UniPoly; CHANNELS],
    hmax: [Integer; CHANNELS],
    hsum: [Integer; CHANNELS],
}

/// Reconstruct `images` (all lifted over pairwise coprime moduli) with
/// `workers` parallel workers.
pub fn join(images: &[JoinImage], workers: usize) -> Result<Joined, GcdError> {
    let moduli: Vec<Integer> = images.iter().map(|im| im.modulus.clone()).collect();
    let prog = CrtProgram::compile(&moduli).ok_or(GcdError::NonCoprimeModuli)?;

    let inputs: [Vec<&UniPoly>; CHANNELS] = [
        images.iter().map(|im| im.g).collect(),
        images.iter().map(|im| im.abar).collect(),
        images.iter().map(|im| im.bbar).collect(),
    ];
    let cursors = [
        top_exp(&inputs[0]),
        top_exp(&inputs[1]),
        top_exp(&inputs[2]),
    ];
    let shared = Shared {
        prog: &prog,
        inputs,
        cursors: Mutex::new(cursors),
    };

    let outs: Vec<WorkerOut> = (0..workers.max(1))
        .into_par_iter()
        .map(|_| run_worker(&shared))
        .collect();

    let mut polys: [Vec<UniPoly>; CHANNELS] = Default::default();
    let mut hmax = [Integer::new(), Integer::new(), Integer::new()];
    let mut hsum = [Integer::new(), Integer::new(), Integer::new()];
    for out in outs {
        for (ch, poly) in out.polys.into_iter().enumerate() {
            polys[ch].push(poly);
            if out.hmax[ch] > hmax[ch] {
                hmax[ch] = out.hmax[ch].clone();
            }
            hsum[ch] += &out.hsum[ch];
        }
    }
    let [g, abar, bbar] = polys.map(merge_worker_outputs);
    let [gmax, abarmax, bbarmax] = hmax;
    let [gsum, abarsum, bbarsum] = hsum;
    Ok(Joined {
        g,
        abar,
        bbar,
        gmax,
        gsum,
        abarmax,
        abarsum,
        bbarmax,
        bbarsum,
        modulus: prog.total_modulus().clone(),
    })
}

/// The greatest X-degree across a channel's images, or −1 when all are zero.
fn top_exp(list: &[&UniPoly]) -> i64 {
    list.iter()
        .filter_map(|u| u.degree())
        .max()
        .map_or(-1, |d| d as i64)
}

/// Claim exponents one at a time — G first, then Abar, then Bbar — and
/// reconstruct each into the worker's private output.
fn run_worker(shared: &Shared) -> WorkerOut {
    let mut scratch = CrtScratch::for_program(shared.prog);
    let mut out = WorkerOut::default();
    loop {
        let claim = {
            let mut cursors = shared.cursors.lock().unwrap();
            let mut claim = None;
            for (ch, cursor) in cursors.iter_mut().enumerate() {
                if *cursor >= 0 {
                    claim = Some((ch, *cursor as u64));
                    *cursor -= 1;
                    break;
                }
            }
            claim
        };
        let Some((ch, exp)) = claim else {
            return out;
        };
        merge::crt_exp(
            shared.prog,
            &mut scratch,
            &mut out.hmax[ch],
            &mut out.hsum[ch],
            &mut out.polys[ch],
            exp,
            &shared.inputs[ch],
        );
    }
}

/// Serial final merge: worker outputs hold disjoint exponents, each in
/// decreasing order, so repeatedly swapping out the greatest head restores
/// the canonical order.
fn merge_worker_outputs(parts: Vec<UniPoly>) -> UniPoly {
    let mut lists: Vec<Vec<(u64, crate::poly::Poly)>> =
        parts.into_iter().map(UniPoly::into_terms).collect();
    let mut cursors = vec![0usize; lists.len()];
    let mut out = UniPoly::zero();
    loop {
        let mut best: Option<(usize, u64)> = None;
        for (w, list) in lists.iter().enumerate() {
            if let Some(&(exp, _)) = list.get(cursors[w]) {
                if best.map_or(true, |(_, e)| exp > e) {
                    best = Some((w, exp));
                }
            }
        }
        let Some((w, exp)) = best else {
            return out;
        };
        let coeff = std::mem::take(&mut lists[w][cursors[w]].1);
        cursors[w] += 1;
        out.push_term(exp, coeff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poly::{Ctx, Poly};

    fn ctx2() -> Ctx {
        Ctx::new(2).unwrap()
    }

    fn uni(ctx: &Ctx, pairs: &[(i64, &[u64])]) -> UniPoly {
        UniPoly::from_flat(&Poly::from_pairs(ctx, pairs).unwrap(), ctx)
    }

    /// A single image joins to its own symmetric reduction; heights track
    /// the reconstructed coefficients.
    #[test]
    fn single_image_identity() {
        let ctx = ctx2();
        let g = uni(&ctx, &[(3, &[2, 0]), (-2, &[0, 1])]);
        let abar = uni(&ctx, &[(1, &[1, 0])]);
        let bbar = uni(&ctx, &[(5, &[0, 0])]);
        let m = Integer::from(1009u32);
        let joined = join(
            &[JoinImage {
                g: &g,
                abar: &abar,
                bbar: &bbar,
                modulus: &m,
            }],
            2,
        )
        .unwrap();
        assert_eq!(joined.g, g);
        assert_eq!(joined.abar, abar);
        assert_eq!(joined.bbar, bbar);
        assert_eq!(joined.gmax, Integer::from(3u32));
        assert_eq!(joined.gsum, Integer::from(5u32));
        assert_eq!(joined.modulus, m);
    }

    /// Two images over coprime moduli reconstruct coefficients the same
    /// way the scalar CRT does, across the union of supports.
    #[test]
    fn two_images_reconstruct() {
        let ctx = ctx2();
        // true G = 12x + 7y: images mod 5 and mod 7
        let g5 = uni(&ctx, &[(2, &[1, 0]), (2, &[0, 1])]);
        let g7 = uni(&ctx, &[(5, &[1, 0])]); // 7y vanished mod 7
        let zero = UniPoly::zero();
        let m5 = Integer::from(5u32);
        let m7 = Integer::from(7u32);
        let joined = join(
            &[
                JoinImage { g: &g5, abar: &zero, bbar: &zero, modulus: &m5 },
                JoinImage { g: &g7, abar: &zero, bbar: &zero, modulus: &m7 },
            ],
            3,
        )
        .unwrap();
        let want = uni(&ctx, &[(12, &[1, 0]), (7, &[0, 1])]);
        assert_eq!(joined.g, want);
        assert!(joined.abar.is_zero());
        assert_eq!(joined.modulus, Integer::from(35u32));
    }

    /// Non-coprime moduli surface as an error, not a bad answer.
    #[test]
    fn non_coprime_moduli_error() {
        let ctx = ctx2();
        let g = uni(&ctx, &[(1, &[1, 0])]);
        let m6 = Integer::from(6u32);
        let m10 = Integer::from(10u32);
        let images = [
            JoinImage { g: &g, abar: &g, bbar: &g, modulus: &m6 },
            JoinImage { g: &g, abar: &g, bbar: &g, modulus: &m10 },
        ];
        assert_eq!(join(&images, 2).unwrap_err(), GcdError::NonCoprimeModuli);
    }

    /// The worker count never changes the answer: claims are dynamic but
    /// every exponent is reconstructed exactly once and the final merge
    /// restores canonical order.
    #[test]
    fn worker_count_invariance() {
        let ctx = ctx2();
        let g5 = uni(
            &ctx,
            &[(1, &[6, 0]), (2, &[4, 1]), (3, &[2, 0]), (4, &[0, 1])],
        );
        let g7 = uni(&ctx, &[(6, &[6, 0]), (1, &[3, 2]), (2, &[1, 0])]);
        let a5 = uni(&ctx, &[(2, &[5, 0]), (1, &[0, 3])]);
        let a7 = uni(&ctx, &[(3, &[5, 0]), (4, &[2, 2])]);
        let m5 = Integer::from(5u32);
        let m7 = Integer::from(7u32);
        let images = [
            JoinImage { g: &g5, abar: &a5, bbar: &g5, modulus: &m5 },
            JoinImage { g: &g7, abar: &a7, bbar: &g7, modulus: &m7 },
        ];
        let one = join(&images, 1).unwrap();
        for workers in [2usize, 4, 8] {
            let many = join(&images, workers).unwrap();
            assert_eq!(many.g, one.g);
            assert_eq!(many.abar, one.abar);
            assert_eq!(many.bbar, one.bbar);
            assert_eq!(many.gmax, one.gmax);
            assert_eq!(many.gsum, one.gsum);
            assert_eq!(many.abarsum, one.abarsum);
        }
    }

    /// Exponent gaps: X-degrees skipped by every image produce no term,
    /// and the output order stays strictly decreasing.
    #[test]
    fn gaps_in_supports() {
        let ctx = ctx2();
        let g5 = uni(&ctx, &[(1, &[9, 0]), (2, &[0, 0])]);
        let g7 = uni(&ctx, &[(3, &[9, 0]), (1, &[5, 1])]);
        let zero = UniPoly::zero();
        let m5 = Integer::from(5u32);
        let m7 = Integer::from(7u32);
        let joined = join(
            &[
                JoinImage { g: &g5, abar: &zero, bbar: &zero, modulus: &m5 },
                JoinImage { g: &g7, abar: &zero, bbar: &zero, modulus: &m7 },
            ],
            4,
        )
        .unwrap();
        let exps: Vec<u64> = joined.g.terms().iter().map(|(e, _)| *e).collect();
        assert_eq!(exps, vec![9, 5, 0]);
    }
}
