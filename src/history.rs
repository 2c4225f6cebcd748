// history.rs — Temporal background model (CPU reference).
//
// The model keeps the last N raw frames in a ring and treats their mean as
// the background:
//
//   history(p)  = Σ_i slot_i(p) / N          (all N slots, newest included)
//   distance(p) = ‖latest(p).rgb − history(p).rgb‖
//   mask(p)     = 1.0 if distance(p) > foreground_distance else 0.0
//
// Frames enter through a scoped slot:
//
//   let mut slot = history.begin_frame();   // clears and borrows slot[cursor]
//   draw_into(&mut slot);                   // external draw step
//   drop(slot);                             // end of frame: cursor advances
//
// `FrameSlot` is the begin/end pair. Its `Drop` is the end-of-frame, so the
// cursor cannot be left un-advanced and no second slot can be opened while
// one is live (the slot holds `&mut FrameHistory`).
//
// The ring is allocated up front and always holds exactly N frames; before
// N frames have been written the unwritten slots are black, exactly like
// freshly cleared render targets.

use std::ops::{Deref, DerefMut};

use crate::image::{Image, Rgb};

/// Fixed-size ring of recent frames plus the foreground test.
pub struct FrameHistory {
    slots: Vec<Image<Rgb>>,
    /// Slot the next `begin_frame` writes into.
    cursor: usize,
    /// Slot most recently opened by `begin_frame`.
    latest: usize,
    foreground_distance: f32,
    width: usize,
    height: usize,
}

impl FrameHistory {
    /// Allocate `len` black frames of the given size.
    ///
    /// # Panics
    /// Panics if `len == 0`. `TrackerConfig::validate` rejects that first.
    pub fn new(width: usize, height: usize, len: usize, foreground_distance: f32) -> Self {
        assert!(len > 0, "history ring needs at least one slot");
        FrameHistory {
            slots: (0..len).map(|_| Image::new(width, height)).collect(),
            cursor: 0,
            latest: 0,
            foreground_distance,
            width,
            height,
        }
    }

    /// Number of slots (N). Constant for the life of the ring.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false; the ring has at least one slot.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Index of the slot the next frame will be written into.
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Index of the most recently written slot.
    #[inline]
    pub fn latest_index(&self) -> usize {
        self.latest
    }

    /// The most recently written raw frame.
    pub fn latest(&self) -> &Image<Rgb> {
        &self.slots[self.latest]
    }

    pub fn slot(&self, index: usize) -> &Image<Rgb> {
        &self.slots[index]
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Open the next slot as a write target. The slot is cleared to black.
    /// Dropping the returned guard ends the frame and advances the cursor.
    pub fn begin_frame(&mut self) -> FrameSlot<'_> {
        let index = self.cursor;
        self.latest = index;
        self.slots[index].fill(Rgb::BLACK);
        FrameSlot { history: self, index }
    }

    /// Convenience: one full begin/copy/end cycle.
    ///
    /// # Panics
    /// Panics if `frame` does not match the ring's dimensions.
    pub fn push(&mut self, frame: &Image<Rgb>) {
        let mut slot = self.begin_frame();
        slot.copy_from(frame);
    }

    /// Compare the latest frame against the ring average.
    pub fn compute_foreground_mask(&self) -> Image<f32> {
        let mut mask = Image::new(self.width, self.height);
        self.compute_foreground_mask_into(&mut mask);
        mask
    }

    /// Same as [`compute_foreground_mask`](Self::compute_foreground_mask),
    /// writing into a caller-owned buffer.
    pub fn compute_foreground_mask_into(&self, mask: &mut Image<f32>) {
        assert!(
            mask.width() == self.width && mask.height() == self.height,
            "foreground mask is {}×{}, ring is {}×{}",
            mask.width(), mask.height(), self.width, self.height,
        );
        let weight = 1.0 / self.slots.len() as f32;
        let latest = self.slots[self.latest].as_slice();
        let out = mask.as_mut_slice();

        for (i, (dst, &last)) in out.iter_mut().zip(latest).enumerate() {
            let mut history = Rgb::BLACK;
            for slot in &self.slots {
                history += slot.as_slice()[i].scale(weight);
            }
            *dst = if last.distance(history) > self.foreground_distance { 1.0 } else { 0.0 };
        }
    }

    fn end_frame(&mut self) {
        self.cursor = (self.cursor + 1) % self.slots.len();
    }
}

/// Write access to one ring slot for the duration of a frame.
pub struct FrameSlot<'a> {
    history: &'a mut FrameHistory,
    index: usize,
}

impl FrameSlot<'_> {
    /// Ring index being written.
    pub fn index(&self) -> usize {
        self.index
    }

    /// End the frame explicitly. Equivalent to dropping the slot.
    pub fn end(self) {}
}

impl Deref for FrameSlot<'_> {
    type Target = Image<Rgb>;

    fn deref(&self) -> &Image<Rgb> {
        &self.history.slots[self.index]
    }
}

impl DerefMut for FrameSlot<'_> {
    fn deref_mut(&mut self) -> &mut Image<Rgb> {
        &mut self.history.slots[self.index]
    }
}

impl Drop for FrameSlot<'_> {
    fn drop(&mut self) {
        self.history.end_frame();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: usize, h: usize, c: Rgb) -> Image<Rgb> {
        Image::filled(w, h, c)
    }

    #[test]
    fn test_cursor_wraps_after_n_frames() {
        let mut h = FrameHistory::new(4, 4, 3, 0.1);
        assert_eq!(h.cursor(), 0);
        for expected in [1, 2, 0, 1] {
            h.begin_frame().end();
            assert_eq!(h.cursor(), expected);
            assert_eq!(h.len(), 3);
        }
    }

    #[test]
    fn test_latest_tracks_written_slot() {
        let mut h = FrameHistory::new(2, 2, 2, 0.1);
        let red = Rgb::new(1.0, 0.0, 0.0);
        {
            let mut slot = h.begin_frame();
            assert_eq!(slot.index(), 0);
            slot.set(1, 1, red);
        }
        assert_eq!(h.latest_index(), 0);
        assert_eq!(h.latest().get(1, 1), red);
        h.push(&solid(2, 2, Rgb::BLACK));
        assert_eq!(h.latest_index(), 1);
    }

    #[test]
    fn test_begin_frame_clears_slot() {
        let mut h = FrameHistory::new(2, 2, 1, 0.1);
        h.push(&solid(2, 2, Rgb::new(0.5, 0.5, 0.5)));
        let slot = h.begin_frame();
        assert!(slot.as_slice().iter().all(|&p| p == Rgb::BLACK));
    }

    #[test]
    fn test_static_scene_has_no_foreground() {
        let mut h = FrameHistory::new(8, 6, 4, 0.1);
        let grey = solid(8, 6, Rgb::new(0.3, 0.6, 0.2));
        for _ in 0..5 {
            h.push(&grey);
        }
        assert_eq!(h.compute_foreground_mask().count_above(0.0), 0);
    }

    #[test]
    fn test_new_object_is_foreground() {
        let mut h = FrameHistory::new(8, 8, 4, 0.1);
        let bg = solid(8, 8, Rgb::new(0.2, 0.2, 0.2));
        for _ in 0..4 {
            h.push(&bg);
        }
        let mut frame = bg.clone();
        frame.set(3, 3, Rgb::new(1.0, 1.0, 1.0));
        h.push(&frame);

        let mask = h.compute_foreground_mask();
        assert_eq!(mask.get(3, 3), 1.0);
        assert_eq!(mask.count_above(0.0), 1);
    }

    #[test]
    fn test_average_includes_newest_slot() {
        // N = 2: history = (black + white) / 2 = 0.5 grey.
        // distance(white, grey) = sqrt(3 * 0.25) ≈ 0.866 > 0.1.
        let mut h = FrameHistory::new(1, 1, 2, 0.1);
        h.push(&solid(1, 1, Rgb::BLACK));
        h.push(&solid(1, 1, Rgb::new(1.0, 1.0, 1.0)));
        assert_eq!(h.compute_foreground_mask().get(0, 0), 1.0);

        // With a cutoff above 0.866 the same change is background.
        let mut h = FrameHistory::new(1, 1, 2, 0.9);
        h.push(&solid(1, 1, Rgb::BLACK));
        h.push(&solid(1, 1, Rgb::new(1.0, 1.0, 1.0)));
        assert_eq!(h.compute_foreground_mask().get(0, 0), 0.0);
    }

    #[test]
    #[should_panic(expected = "at least one slot")]
    fn test_zero_slots_panics() {
        let _ = FrameHistory::new(2, 2, 0, 0.1);
    }
}
