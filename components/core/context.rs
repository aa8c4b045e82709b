/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

use std::cell::Cell;

use euclid::default::Rect;
use icet_comm::Communicator;
use icet_image::{DenseImage, ImageFormat, PackedBackground};
use icet_projection::Matrix4;

use crate::diagnostics::{Diagnostics, Verbosity};
use crate::error::IcetError;
use crate::state::ContextState;

/// The draw callback contract of spec.md §4.6: called with `(projection,
/// modelview, background, readback_viewport)`, returns a dense image
/// covering exactly `readback_viewport`'s pixels; anything outside that
/// viewport is the frame driver's concern, not the callback's.
pub type DrawCallback =
    dyn FnMut(&Matrix4, &Matrix4, &PackedBackground, Rect<i32>) -> DenseImage;

/// Independent state + communicator + draw callback, analogous to the
/// original's `IceTContext`. Several contexts may exist per process, but
/// spec.md §5 requires exactly one to be driving a frame at a time; this
/// is enforced per-context via `in_frame`, not process-globally (this
/// port never introduces the original's process-wide `current_context`
/// pointer, per spec.md §9 "Global state").
pub struct Context {
    pub(crate) comm: Box<dyn Communicator>,
    pub state: ContextState,
    pub(crate) draw_callback: Option<Box<DrawCallback>>,
    pub(crate) in_frame: bool,
    last_error: Cell<Option<IcetError>>,
    pub(crate) diagnostics: Diagnostics,
}

impl Context {
    pub fn new(comm: Box<dyn Communicator>, format: ImageFormat) -> Self {
        let rank = comm.rank();
        let num_processes = comm.size();
        Context {
            comm,
            state: ContextState::new(rank, num_processes, format),
            draw_callback: None,
            in_frame: false,
            last_error: Cell::new(None),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn rank(&self) -> i32 {
        self.comm.rank()
    }

    pub fn num_processes(&self) -> i32 {
        self.comm.size()
    }

    pub fn set_draw_callback(&mut self, callback: Box<DrawCallback>) {
        self.draw_callback = Some(callback);
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    /// Reads and clears the per-context "current error" slot, matching
    /// `icetGetError`'s reset-on-read semantics (spec.md §7).
    pub fn last_error(&self) -> Option<IcetError> {
        self.last_error.take()
    }

    /// Records `err` as the frame's primary error if none is set yet,
    /// always logs a diagnostic, and returns `err` unchanged so callers
    /// can `return Err(ctx.record_error(...))`. spec.md §7: "the first
    /// error on a frame wins; subsequent ones are still logged but do
    /// not overwrite the primary."
    pub(crate) fn record_error(&self, err: IcetError, message: &str) -> IcetError {
        if self.last_error.get().is_none() {
            self.last_error.set(Some(err));
        }
        self.diagnostics
            .report(self.comm.rank(), Verbosity::Errors, message);
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icet_comm::LocalGroup;
    use icet_image::{ColorFormat, DepthFormat};

    #[test]
    fn last_error_resets_on_read() {
        let comm = LocalGroup::new(1).into_iter().next().unwrap();
        let format = ImageFormat::new(ColorFormat::RgbaUByte, DepthFormat::Float);
        let ctx = Context::new(Box::new(comm), format);
        assert_eq!(ctx.last_error(), None);
        ctx.record_error(IcetError::InvalidOperation, "synthetic test error");
        assert_eq!(ctx.last_error(), Some(IcetError::InvalidOperation));
        assert_eq!(ctx.last_error(), None);
    }

    #[test]
    fn first_error_in_a_frame_wins() {
        let comm = LocalGroup::new(1).into_iter().next().unwrap();
        let format = ImageFormat::new(ColorFormat::RgbaUByte, DepthFormat::Float);
        let ctx = Context::new(Box::new(comm), format);
        ctx.record_error(IcetError::InvalidValue, "first");
        ctx.record_error(IcetError::SanityCheckFail, "second");
        assert_eq!(ctx.last_error(), Some(IcetError::InvalidValue));
    }
}
