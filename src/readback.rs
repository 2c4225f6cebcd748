// readback.rs — Double-buffered device→host mask transfer.
//
// Each cycle does two things with two staging slots:
//
//   1. request: start copying this frame's mask into slot[toggle]
//   2. acquire: take the copy requested last cycle out of slot[1 − toggle]
//
// then flips the toggle. The consumer always sees the mask from one frame
// earlier, and the transfer of frame k overlaps the device work of k + 1.
//
//   cycle     request into   acquire from   consumer sees
//   ─────     ────────────   ────────────   ─────────────
//     0         slot 0          (none)       all background
//     1         slot 1          slot 0       frame 0
//     2         slot 0          slot 1       frame 1
//
// FENCES
// ──────
// `request` returns a fence for the transfer it started; `acquire` receives
// that same fence and must wait on it before touching the slot. A slot
// without a recorded fence is never acquired, so the first cycle simply
// reports that nothing was available. For the GPU the fence is the queue
// submission that performed the copy; for host memory it is the frame
// number, which is complete as soon as the copy returns.

use tracing::debug;

use crate::convert::mask_f32_into_u8;
use crate::image::Image;

/// Two staging slots, their pending fences, and the toggle bit.
pub struct ReadbackRing<S, F> {
    slots: [S; 2],
    fences: [Option<F>; 2],
    toggle: usize,
}

impl<S, F> ReadbackRing<S, F> {
    pub fn new(first: S, second: S) -> Self {
        ReadbackRing { slots: [first, second], fences: [None, None], toggle: 0 }
    }

    /// Slot the next cycle will request into.
    #[inline]
    pub fn toggle(&self) -> usize {
        self.toggle
    }

    pub fn slot(&self, index: usize) -> &S {
        &self.slots[index]
    }

    /// `true` when slot `index` holds a requested but not yet acquired
    /// transfer.
    pub fn is_pending(&self, index: usize) -> bool {
        self.fences[index].is_some()
    }

    /// Request into the write slot, acquire the read slot if it has a
    /// pending fence, flip. Returns what `acquire` produced, or `None` when
    /// there was nothing to acquire.
    pub fn cycle<R>(
        &mut self,
        request: impl FnOnce(&mut S) -> F,
        acquire: impl FnOnce(&mut S, F) -> R,
    ) -> Option<R> {
        let write = self.toggle;
        let read = 1 - write;

        self.fences[write] = Some(request(&mut self.slots[write]));
        let acquired = self.fences[read].take().map(|fence| acquire(&mut self.slots[read], fence));

        self.toggle = read;
        acquired
    }
}

/// Host-memory backend used by the CPU pipeline. Staging slots are f32
/// masks; the acquired mask is converted to the u8 tracker input.
pub struct HostReadback {
    ring: ReadbackRing<Image<f32>, u64>,
    output: Image<u8>,
    frame: u64,
    acquired_frame: Option<u64>,
}

impl HostReadback {
    pub fn new(width: usize, height: usize) -> Self {
        HostReadback {
            ring: ReadbackRing::new(Image::new(width, height), Image::new(width, height)),
            output: Image::new(width, height),
            frame: 0,
            acquired_frame: None,
        }
    }

    /// Stage `mask` and publish the mask staged on the previous call.
    /// Returns the frame number of the published mask, or `None` on the
    /// first call (the output is then all background).
    pub fn apply(&mut self, mask: &Image<f32>) -> Option<u64> {
        let frame = self.frame;
        self.frame += 1;

        let output = &mut self.output;
        let acquired = self.ring.cycle(
            |slot| {
                slot.copy_from(mask);
                frame
            },
            |slot, fence| {
                mask_f32_into_u8(slot, output);
                fence
            },
        );

        if acquired.is_none() {
            debug!(frame, "no staged mask yet; tracker input cleared");
            self.output.fill(0);
        }
        self.acquired_frame = acquired;
        acquired
    }

    /// Tracker input: the mask staged one call earlier, as 0/255.
    pub fn output(&self) -> &Image<u8> {
        &self.output
    }

    /// Frame number of the mask currently in `output`.
    pub fn acquired_frame(&self) -> Option<u64> {
        self.acquired_frame
    }

    pub fn toggle(&self) -> usize {
        self.ring.toggle()
    }
}
