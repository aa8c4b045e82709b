/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

//! Run-length sparse codec: compress a dense image into runs, expand
//! runs back into a dense image, and composite sparse/dense images
//! under a composite mode. Corresponds to component C3 "Sparse codec".

mod composite;
mod compress;
mod decompress;
mod pixelio;

pub use composite::{composite_compressed, composite_into_dense, composite_into_dense_range};
pub use compress::{compress, compress_padded, compress_range};
pub use decompress::decompress;
pub use pixelio::{DensePixelCursor, PaddedPixelCursor, PaddingSpec, PixelIo};

/// Errors raised by the codec. Distinct from [`icet_image::IcetImageError`]
/// because these map to the subset of spec error codes codec operations
/// can themselves raise (`INVALID_OPERATION`, `INVALID_VALUE`,
/// `SANITY_CHECK_FAIL`) rather than buffer-layout errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcetCodecError {
    /// The requested composite mode has no matching active channel
    /// (e.g. Z-buffer compress on a color-only image).
    InvalidOperation,
    /// A header or run field held a value inconsistent with the
    /// surrounding data.
    InvalidValue,
    /// Two images that must agree do not (mismatched pixel counts).
    SanityCheckFail,
    /// Two images that must share a format do not.
    FormatMismatch,
}

impl std::fmt::Display for IcetCodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            IcetCodecError::InvalidOperation => "invalid codec operation for this image format",
            IcetCodecError::InvalidValue => "corrupt or inconsistent run stream",
            IcetCodecError::SanityCheckFail => "composite inputs fail a sanity check",
            IcetCodecError::FormatMismatch => "composite inputs have mismatched formats",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for IcetCodecError {}

pub type IcetCodecResult<T> = Result<T, IcetCodecError>;
