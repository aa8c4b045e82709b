/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

//! Image buffer types shared by every crate that touches pixel data:
//! dense (fixed layout) and sparse (run-length) images, their shared
//! format descriptor, and the packed background color used to clear
//! them. Corresponds to component C2 "Image buffers".

mod dense;
mod format;
mod sparse;

pub use dense::{dense_image_buffer_size, DenseImage, PackedBackground};
pub use format::{ColorFormat, CompositeMode, DepthFormat, ImageFormat};
pub use sparse::{sparse_image_max_buffer_size, Run, RunIter, SparseBuilder, SparseImage};

/// Errors raised while constructing, clearing, or (de)serializing an
/// image buffer. Mirrors `servo_channel::ChannelError`'s hand-written
/// `Display`/`Error` pattern rather than a derive-macro crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcetImageError {
    /// Two images expected to share a format (and therefore a pixel
    /// layout) didn't.
    FormatMismatch,
    /// Two regions expected to share dimensions didn't.
    SizeMismatch,
    /// A wire buffer ended before its header said it would.
    Truncated,
    /// A header field did not decode to a known enum value.
    InvalidEnum,
    /// A header field decoded but held a value this format can't have
    /// (e.g. a magic number for the wrong image kind).
    InvalidValue,
    /// A structural invariant (e.g. run accounting) failed.
    SanityCheckFail,
}

impl std::fmt::Display for IcetImageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            IcetImageError::FormatMismatch => "image format mismatch",
            IcetImageError::SizeMismatch => "image size mismatch",
            IcetImageError::Truncated => "image buffer truncated",
            IcetImageError::InvalidEnum => "invalid image format tag",
            IcetImageError::InvalidValue => "invalid image header value",
            IcetImageError::SanityCheckFail => "image failed internal sanity check",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for IcetImageError {}

pub type IcetImageResult<T> = Result<T, IcetImageError>;
