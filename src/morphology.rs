// morphology.rs — Erode / dilate over binary masks (CPU reference).
//
// Both operations use the same asymmetric 6-neighbour stencil (y grows
// downward):
//
//        (-1,-1) (0,-1)   ·
//        (-1, 0)   ·    (1, 0)
//           ·    (0, 1) (1, 1)
//
// and differ only in the cutoff on the neighbour sum:
//
//   erode:  out = 1 if Σ neighbours > 2
//   dilate: out = 1 if Σ neighbours > 0
//
// The centre pixel does not contribute. Samples outside the image replicate
// the edge pixel.
//
// PING-PONG OWNERSHIP
// ───────────────────
// Iterated passes alternate between two scratch masks. Instead of hiding the
// pair inside the stage, `PingPong` is a value the caller owns and threads
// through each call:
//
//   let buffers = PingPong::new(w, h).load(&mask);
//   let buffers = buffers.erode(2).dilate(3);
//   let cleaned = buffers.read();
//
// Each method consumes the pair and hands it back, so a result can never be
// read while a later pass is writing into the same storage, and chaining
// erode → dilate reads the erode output without an extra copy.

use crate::image::Image;

/// Neighbour offsets sampled by both operations, as (dx, dy).
pub const STENCIL: [(isize, isize); 6] = [(-1, -1), (0, -1), (1, 1), (1, 0), (-1, 0), (0, 1)];

/// Which morphology operation a pass performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorphOp {
    Erode,
    Dilate,
}

impl MorphOp {
    /// A pixel is set when the neighbour sum is strictly greater than this.
    #[inline]
    pub fn neighbour_cutoff(self) -> f32 {
        match self {
            MorphOp::Erode => 2.0,
            MorphOp::Dilate => 0.0,
        }
    }
}

/// One morphology pass from `src` into `dst`.
///
/// # Panics
/// Panics if the two masks differ in size.
pub fn morph_pass(op: MorphOp, src: &Image<f32>, dst: &mut Image<f32>) {
    assert!(src.same_size(dst), "morph_pass: dimension mismatch");
    let cutoff = op.neighbour_cutoff();
    let w = src.width();
    for (i, out) in dst.as_mut_slice().iter_mut().enumerate() {
        let x = (i % w) as isize;
        let y = (i / w) as isize;
        let sum: f32 = STENCIL
            .iter()
            .map(|&(dx, dy)| src.get_clamped(x + dx, y + dy))
            .sum();
        *out = if sum > cutoff { 1.0 } else { 0.0 };
    }
}

/// Two scratch masks and the index of the one currently holding the result.
pub struct PingPong {
    slots: [Image<f32>; 2],
    read: usize,
}

/// An empty 0×0 pair, so an owner can `mem::take` its buffers for a call.
impl Default for PingPong {
    fn default() -> Self {
        PingPong::new(0, 0)
    }
}

impl PingPong {
    /// Allocate a zeroed pair. Slot 0 starts in the read role.
    pub fn new(width: usize, height: usize) -> Self {
        PingPong { slots: [Image::new(width, height), Image::new(width, height)], read: 0 }
    }

    /// Copy `mask` into the read slot so the next pass uses it as input.
    pub fn load(mut self, mask: &Image<f32>) -> Self {
        self.slots[self.read].copy_from(mask);
        self
    }

    /// Mask produced by the most recent pass (or the loaded input).
    pub fn read(&self) -> &Image<f32> {
        &self.slots[self.read]
    }

    /// Index of the slot in the read role. Flips once per pass.
    pub fn read_slot(&self) -> usize {
        self.read
    }

    /// Give up the pair and keep only the result.
    pub fn into_read(self) -> Image<f32> {
        let [a, b] = self.slots;
        if self.read == 0 { a } else { b }
    }

    /// Run `iterations` erode passes on the current read slot.
    pub fn erode(self, iterations: usize) -> Self {
        self.run(MorphOp::Erode, iterations)
    }

    /// Run `iterations` dilate passes on the current read slot.
    pub fn dilate(self, iterations: usize) -> Self {
        self.run(MorphOp::Dilate, iterations)
    }

    /// Zero iterations leave the read slot untouched.
    pub fn run(mut self, op: MorphOp, iterations: usize) -> Self {
        for _ in 0..iterations {
            let (src, dst) = self.split();
            morph_pass(op, src, dst);
            self.read = 1 - self.read;
        }
        self
    }

    fn split(&mut self) -> (&Image<f32>, &mut Image<f32>) {
        let [a, b] = &mut self.slots;
        if self.read == 0 { (a, b) } else { (b, a) }
    }
}

/// Erode `mask` through `buffers`; the result is `returned.read()`.
pub fn erode(mask: &Image<f32>, iterations: usize, buffers: PingPong) -> PingPong {
    buffers.load(mask).erode(iterations)
}

/// Dilate `mask` through `buffers`; the result is `returned.read()`.
pub fn dilate(mask: &Image<f32>, iterations: usize, buffers: PingPong) -> PingPong {
    buffers.load(mask).dilate(iterations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from(rows: &[&str]) -> Image<f32> {
        let h = rows.len();
        let w = rows[0].len();
        Image::from_fn(w, h, |x, y| if rows[y].as_bytes()[x] == b'#' { 1.0 } else { 0.0 })
    }

    #[test]
    fn test_single_pixel_erased_by_one_erode() {
        let mask = mask_from(&[".....", ".....", "..#..", ".....", "....."]);
        let out = erode(&mask, 1, PingPong::new(5, 5));
        assert_eq!(out.read().count_above(0.0), 0);
    }

    #[test]
    fn test_solid_block_survives_erode_interior() {
        let mask = mask_from(&[
            "........",
            ".######.",
            ".######.",
            ".######.",
            ".######.",
            "........",
        ]);
        let out = erode(&mask, 1, PingPong::new(8, 6)).into_read();
        // Interior pixels see all six neighbours set.
        assert_eq!(out.get(3, 2), 1.0);
        assert_eq!(out.get(4, 3), 1.0);
    }

    #[test]
    fn test_erode_threshold_is_strictly_greater_than_two() {
        // Centre (2, 2) sees exactly (-1,0) and (1,0) set: sum = 2 → cleared.
        let two = mask_from(&[".....", ".....", ".#.#.", ".....", "....."]);
        assert_eq!(erode(&two, 1, PingPong::new(5, 5)).read().get(2, 2), 0.0);

        // Add (0,-1): sum = 3 → set.
        let three = mask_from(&[".....", "..#..", ".#.#.", ".....", "....."]);
        assert_eq!(erode(&three, 1, PingPong::new(5, 5)).read().get(2, 2), 1.0);
    }

    #[test]
    fn test_dilate_grows_along_stencil_only() {
        let mask = mask_from(&[".....", ".....", "..#..", ".....", "....."]);
        let out = dilate(&mask, 1, PingPong::new(5, 5)).into_read();
        // Pixels that reach (2,2) through one of the stencil offsets.
        for &(dx, dy) in &STENCIL {
            let (x, y) = ((2 - dx) as usize, (2 - dy) as usize);
            assert_eq!(out.get(x, y), 1.0, "({x},{y}) should be set");
        }
        // The other diagonals are not in the stencil.
        assert_eq!(out.get(3, 1), 0.0);
        assert_eq!(out.get(1, 3), 0.0);
        // Nor is the centre itself (it has no set neighbours).
        assert_eq!(out.get(2, 2), 0.0);
        assert_eq!(out.count_above(0.0), 6);
    }

    #[test]
    fn test_result_slot_alternates_with_parity() {
        let mask = mask_from(&["##", "##"]);
        for iterations in 0..5 {
            let out = dilate(&mask, iterations, PingPong::new(2, 2));
            assert_eq!(out.read_slot(), iterations % 2, "iterations = {iterations}");
        }
    }

    #[test]
    fn test_zero_iterations_passthrough() {
        let mask = mask_from(&["#.", ".#"]);
        let out = erode(&mask, 0, PingPong::new(2, 2));
        assert_eq!(out.read(), &mask);
    }

    #[test]
    fn test_chained_matches_separate_calls() {
        let mask = mask_from(&[
            "..........",
            ".####.....",
            ".####..#..",
            ".####.....",
            "......###.",
            "......###.",
        ]);
        let chained = PingPong::new(10, 6).load(&mask).erode(2).dilate(3).into_read();

        let eroded = erode(&mask, 2, PingPong::new(10, 6)).into_read();
        let separate = dilate(&eroded, 3, PingPong::new(10, 6)).into_read();
        assert_eq!(chained, separate);
    }
}
