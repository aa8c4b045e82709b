/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

use std::fmt;

/// The closed set of error codes from spec.md §6/§7. Mirrors
/// `original_source/src/include/GL/ice-t.h`'s `ICET_*` enum, minus
/// `NO_ERROR` (modeled here as `Ok(())`).
///
/// Grounded on `servo_channel::ChannelError` in `components/channel/lib.rs`
/// for the "hand-written enum, manual `Display`/`Error`" idiom; the teacher
/// does not pull in `thiserror` or `anyhow` anywhere in this snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcetError {
    /// An internal invariant was violated (mismatched sizes, bad run
    /// accounting, buffer over-reservation).
    SanityCheckFail,
    /// An out-of-range or unrecognized enum value was supplied.
    InvalidEnum,
    /// A numeric conversion lost information it should not have.
    BadCast,
    /// An allocation failed.
    OutOfMemory,
    /// The call is not valid in the context's current state (missing draw
    /// callback, no tiles, recursive `draw_frame`, ...).
    InvalidOperation,
    /// An argument value was out of its valid domain (negative tile size,
    /// non-permutation composite order, ...).
    InvalidValue,
}

impl fmt::Display for IcetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            IcetError::SanityCheckFail => "an internal sanity check failed",
            IcetError::InvalidEnum => "an invalid enum value was supplied",
            IcetError::BadCast => "a numeric cast lost information",
            IcetError::OutOfMemory => "allocation failed",
            IcetError::InvalidOperation => "the operation is not valid in the current state",
            IcetError::InvalidValue => "an argument value is out of its valid domain",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for IcetError {}

pub type IcetResult<T> = Result<T, IcetError>;

impl From<icet_tiles::IcetTilesError> for IcetError {
    fn from(err: icet_tiles::IcetTilesError) -> Self {
        match err {
            icet_tiles::IcetTilesError::Transport => IcetError::InvalidOperation,
            icet_tiles::IcetTilesError::InvalidCompositeOrder => IcetError::InvalidValue,
            icet_tiles::IcetTilesError::InvalidTileBounds => IcetError::InvalidValue,
        }
    }
}

impl From<icet_strategies::IcetStrategiesError> for IcetError {
    fn from(err: icet_strategies::IcetStrategiesError) -> Self {
        match err {
            icet_strategies::IcetStrategiesError::Transport => IcetError::InvalidOperation,
            icet_strategies::IcetStrategiesError::InvalidGroup => IcetError::InvalidValue,
            icet_strategies::IcetStrategiesError::Codec => IcetError::SanityCheckFail,
        }
    }
}

impl From<icet_image::IcetImageError> for IcetError {
    fn from(_: icet_image::IcetImageError) -> Self {
        IcetError::SanityCheckFail
    }
}

impl From<icet_codec::IcetCodecError> for IcetError {
    fn from(_: icet_codec::IcetCodecError) -> Self {
        IcetError::SanityCheckFail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiles_transport_error_maps_to_invalid_operation() {
        let err: IcetError = icet_tiles::IcetTilesError::Transport.into();
        assert_eq!(err, IcetError::InvalidOperation);
    }
}
