//! # CRT — Compiled Chinese-Remainder Programs
//!
//! Reconstructing one integer from residues happens once per output monomial
//! — millions of times per join — so the combine tree is compiled once into
//! a straight-line program and then executed with per-call scratch, keeping
//! a single program safely shared across every worker thread.
//!
//! ## Compilation
//!
//! Moduli are sorted by bit length and split recursively into a binary tree,
//! rebalancing each split so both sides carry roughly equal total bits (the
//! multiplication depth then stays logarithmic in the total size). Each
//! internal node becomes one instruction
//!
//! ```text
//! slot[dst] ← B + I·(C − B)  reduced to the least-absolute residue mod M
//! ```
//!
//! where `B`, `C` read either an input residue or a previously written slot,
//! `M` is the product of the subtree's moduli, and `I` is the idempotent
//! with `I ≡ 1 (mod M_left)`, `I ≡ 0 (mod M_right)`, computed as
//! `M_left · (M_left⁻¹ mod M_right)`. A failed inverse means two moduli
//! share a factor; compilation reports that by returning `None`.
//!
//! Slot allocation reuses registers: a subtree rooted at slot `r` scribbles
//! on slots above `r` while it runs, but only `r` is live when it finishes,
//! so its sibling can reuse the same space. Peak slot count is therefore
//! proportional to the tree depth, not the leaf count.
//!
//! ## Execution
//!
//! [`CrtProgram::run`] walks the instructions in emission (post-)order; the
//! final instruction always lands in slot 0. All mutable state lives in the
//! caller's [`CrtScratch`], so concurrent runs of one program never touch
//! shared memory.

use rug::{Assign, Integer};

use crate::smod;

/// Where a combine operand comes from: a caller-supplied input residue or a
/// slot written by an earlier instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Src {
    Input(usize),
    Slot(usize),
}

/// One combine step: `slot[dst] ← B + idem·(C − B) mods modulus`.
#[derive(Clone, Debug)]
struct Instr {
    dst: usize,
    b: Src,
    c: Src,
    idem: Integer,
    modulus: Integer,
}

/// A compiled combine tree over a fixed list of moduli.
#[derive(Clone, Debug)]
pub struct CrtProgram {
    instrs: Vec<Instr>,
    slots: usize,
    inputs: usize,
}

/// Caller-owned execution scratch: the slot array plus the two working
/// temporaries. One per running thread; never shared.
#[derive(Clone, Debug)]
pub struct CrtScratch {
    slots: Vec<Integer>,
    t1: Integer,
    t2: Integer,
}

impl CrtScratch {
    /// Scratch sized exactly for `prog`. Any scratch with at least as many
    /// slots works ([`CrtProgram::run`] only indexes below the slot count).
    pub fn for_program(prog: &CrtProgram) -> Self {
        CrtScratch {
            slots: vec![Integer::new(); prog.slots],
            t1: Integer::new(),
            t2: Integer::new(),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

impl CrtProgram {
    /// Compile a combine program for the given moduli. Returns `None` when
    /// the list is empty, contains zero, or is not pairwise coprime — the
    /// program is unusable and no partial state leaks out.
    pub fn compile(moduli: &[Integer]) -> Option<CrtProgram> {
        let len = moduli.len();
        if len == 0 {
            return None;
        }
        let mut perm: Vec<usize> = (0..len).collect();
        perm.sort_by_key(|&i| moduli[i].significant_bits());

        if len == 1 {
            if moduli[0] == 0 {
                return None;
            }
            // degenerate single-modulus program: reduce input 0 symmetrically
            return Some(CrtProgram {
                instrs: vec![Instr {
                    dst: 0,
                    b: Src::Input(0),
                    c: Src::Input(0),
                    idem: Integer::new(),
                    modulus: moduli[0].clone(),
                }],
                slots: 1,
                inputs: 1,
            });
        }

        let mut instrs = Vec::with_capacity(len - 1);
        let mut max_slot = 0usize;
        let (root, _) = build(&mut instrs, moduli, &perm, 0, len, 0, &mut max_slot)?;
        debug_assert_eq!(root, Src::Slot(0));
        debug_assert_eq!(instrs.len(), len - 1);
        Some(CrtProgram {
            instrs,
            slots: max_slot + 1,
            inputs: len,
        })
    }

    /// Number of input residues the program expects.
    pub fn input_count(&self) -> usize {
        self.inputs
    }

    /// Slots a scratch buffer must provide.
    pub fn slot_count(&self) -> usize {
        self.slots
    }

    /// The product of all moduli (the root instruction's modulus).
    pub fn total_modulus(&self) -> &Integer {
        &self.instrs.last().expect("compiled programs are nonempty").modulus
    }

    /// Execute the program on one residue vector. The result is the unique
    /// `r` with `r ≡ inputs[i] (mod moduli[i])` for all `i` and
    /// `r ∈ (−M/2, M/2]` for `M` the product of the moduli.
    ///
    /// Reentrant: any number of threads may run one program concurrently as
    /// long as each brings its own scratch.
    pub fn run(&self, scratch: &mut CrtScratch, inputs: &[Integer]) -> Integer {
        assert_eq!(inputs.len(), self.inputs, "one residue per modulus");
        assert!(
            scratch.slots.len() >= self.slots,
            "scratch must provide at least slot_count() slots"
        );
        for ins in &self.instrs {
            let bv = match ins.b {
                Src::Input(i) => &inputs[i],
                Src::Slot(s) => &scratch.slots[s],
            };
            let cv = match ins.c {
                Src::Input(i) => &inputs[i],
                Src::Slot(s) => &scratch.slots[s],
            };
            scratch.t1.assign(bv - cv);
            scratch.t2.assign(&ins.idem * &scratch.t1);
            scratch.t1.assign(bv - &scratch.t2);
            let v = smod(&scratch.t1, &ins.modulus);
            scratch.slots[ins.dst] = v;
        }
        scratch.slots[0].clone()
    }
}

/// Recursive tree construction over `perm[start..stop]`, writing the subtree
/// result to slot `ret`. Returns the operand source for the parent and the
/// subtree's modulus product.
fn build(
    instrs: &mut Vec<Instr>,
    moduli: &[Integer],
    perm: &[usize],
    start: usize,
    stop: usize,
    ret: usize,
    max_slot: &mut usize,
) -> Option<(Src, Integer)> {
    if stop - start == 1 {
        let idx = perm[start];
        if moduli[idx] == 0 {
            return None;
        }
        return Some((Src::Input(idx), moduli[idx].clone()));
    }

    // midpoint split, then shift elements left while that evens out the
    // total bit weight of the two sides
    let bits = |i: usize| u64::from(moduli[perm[i]].significant_bits());
    let mut mid = start + (stop - start) / 2;
    let mut left: u64 = (start..mid).map(bits).sum();
    let mut right: u64 = (mid..stop).map(bits).sum();
    while left < right && bits(mid) < right - left {
        left += bits(mid);
        right -= bits(mid);
        mid += 1;
    }

    *max_slot = (*max_slot).max(ret + 2);
    let (b, m_left) = build(instrs, moduli, perm, start, mid, ret + 1, max_slot)?;
    let (c, m_right) = build(instrs, moduli, perm, mid, stop, ret + 2, max_slot)?;

    let inv = match m_left.clone().invert(&m_right) {
        Ok(inv) => inv,
        Err(_) => return None, // shared factor between the subtrees
    };
    let idem = Integer::from(&m_left * &inv);
    let modulus = Integer::from(&m_left * &m_right);
    instrs.push(Instr {
        dst: ret,
        b,
        c,
        idem,
        modulus: modulus.clone(),
    });
    Some((Src::Slot(ret), modulus))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(v: &[i64]) -> Vec<Integer> {
        v.iter().map(|&x| Integer::from(x)).collect()
    }

    /// Two coprime moduli [3, 5] with residues [2, 3]: the CRT value 8
    /// exceeds 15/2 and must come back as the symmetric representative −7.
    #[test]
    fn two_moduli_symmetric_result() {
        let prog = CrtProgram::compile(&ints(&[3, 5])).unwrap();
        let mut scratch = CrtScratch::for_program(&prog);
        let r = prog.run(&mut scratch, &ints(&[2, 3]));
        assert_eq!(r, Integer::from(-7));
    }

    /// Three moduli [7, 11, 13]: the result matches every congruence and
    /// stays within half the 1001-modulus.
    #[test]
    fn three_moduli_congruences() {
        let moduli = ints(&[7, 11, 13]);
        let prog = CrtProgram::compile(&moduli).unwrap();
        let mut scratch = CrtScratch::for_program(&prog);
        let r = prog.run(&mut scratch, &ints(&[1, 2, 3]));
        for (m, want) in moduli.iter().zip([1u32, 2, 3]) {
            assert_eq!(crate::smod(&Integer::from(&r - want), m), 0);
        }
        assert!(Integer::from(r.abs_ref()) <= 500);
        assert_eq!(prog.total_modulus(), &Integer::from(1001u32));
    }

    /// A single modulus compiles to the degenerate program that reduces its
    /// one input symmetrically.
    #[test]
    fn single_modulus_degenerate() {
        let prog = CrtProgram::compile(&ints(&[10])).unwrap();
        let mut scratch = CrtScratch::for_program(&prog);
        assert_eq!(prog.run(&mut scratch, &ints(&[7])), Integer::from(-3));
        assert_eq!(prog.run(&mut scratch, &ints(&[5])), Integer::from(5));
        assert_eq!(prog.slot_count(), 1);
    }

    /// Non-coprime moduli {6, 10} must refuse to compile; so must a zero
    /// modulus or an empty list.
    #[test]
    fn non_coprime_refused() {
        assert!(CrtProgram::compile(&ints(&[6, 10])).is_none());
        assert!(CrtProgram::compile(&ints(&[0])).is_none());
        assert!(CrtProgram::compile(&ints(&[5, 0])).is_none());
        assert!(CrtProgram::compile(&[]).is_none());
    }

    /// Re-running with the same inputs and a different scratch reproduces
    /// the result exactly — the program holds no mutable state.
    #[test]
    fn rerun_with_fresh_scratch_is_idempotent() {
        let prog = CrtProgram::compile(&ints(&[101, 103, 107, 109])).unwrap();
        let inputs = ints(&[17, 29, 31, 99]);
        let mut s1 = CrtScratch::for_program(&prog);
        let mut s2 = CrtScratch::for_program(&prog);
        let r1 = prog.run(&mut s1, &inputs);
        let r2 = prog.run(&mut s2, &inputs);
        let r3 = prog.run(&mut s1, &inputs);
        assert_eq!(r1, r2);
        assert_eq!(r1, r3);
    }

    /// Oversized scratch is accepted: only the contract "at least
    /// slot_count slots, result in slot 0" matters.
    #[test]
    fn oversized_scratch_accepted() {
        let prog = CrtProgram::compile(&ints(&[3, 5, 7])).unwrap();
        let mut big = CrtScratch {
            slots: vec![Integer::from(999u32); prog.slot_count() + 7],
            t1: Integer::new(),
            t2: Integer::new(),
        };
        let mut exact = CrtScratch::for_program(&prog);
        let inputs = ints(&[1, 2, 3]);
        assert_eq!(prog.run(&mut big, &inputs), prog.run(&mut exact, &inputs));
    }

    /// A wider sample of residue systems round-trips every congruence and
    /// respects the (−M/2, M/2] window.
    #[test]
    fn many_leaf_congruences() {
        let moduli = ints(&[3, 5, 7, 11, 13, 17, 19, 23]);
        let prog = CrtProgram::compile(&moduli).unwrap();
        let mut scratch = CrtScratch::for_program(&prog);
        let inputs = ints(&[2, 4, 3, 10, 12, 5, 18, 1]);
        let r = prog.run(&mut scratch, &inputs);
        let total = prog.total_modulus().clone();
        for (m, want) in moduli.iter().zip(&inputs) {
            assert_eq!(crate::smod(&Integer::from(&r - want), m), 0);
        }
        assert!(Integer::from(&r << 1u32) <= total);
        assert!(Integer::from(&r << 1u32) > -total);
    }

    /// Negative residue inputs are legal representatives.
    #[test]
    fn negative_residues_accepted() {
        let prog = CrtProgram::compile(&ints(&[3, 5])).unwrap();
        let mut scratch = CrtScratch::for_program(&prog);
        // −1 ≡ 2 (mod 3), −2 ≡ 3 (mod 5) — same system as [2, 3]
        let r = prog.run(&mut scratch, &ints(&[-1, -2]));
        assert_eq!(r, Integer::from(-7));
    }

    /// The slot budget stays logarithmic: 64 moduli need far fewer slots
    /// than leaves thanks to register reuse, and the program still solves
    /// every congruence.
    #[test]
    fn slot_reuse_keeps_buffer_small() {
        let mut p = 2u64;
        let mut moduli = Vec::new();
        for _ in 0..64 {
            moduli.push(Integer::from(p));
            p = crate::primes::next_prime(p).unwrap();
        }
        let prog = CrtProgram::compile(&moduli).unwrap();
        assert!(prog.slot_count() < 64, "register reuse beats one-slot-per-leaf");
        let inputs: Vec<Integer> = (0..64u32).map(Integer::from).collect();
        let mut scratch = CrtScratch::for_program(&prog);
        let r = prog.run(&mut scratch, &inputs);
        for (m, want) in moduli.iter().zip(&inputs) {
            assert_eq!(crate::smod(&Integer::from(&r - want), m), 0);
        }
    }
}
