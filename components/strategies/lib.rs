/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

//! Single-image and multi-tile compositing strategies: the algorithms
//! that decide which pairs of processes exchange fragments and in what
//! order, on top of the transport primitives in [`transport`].
//! Corresponds to components C7 "Multi-tile strategies" and C8
//! "Single-image strategies".

mod multi_tile;
mod single_image;
mod transport;

pub use multi_tile::{composite_multi_tile, MultiTileStrategy};
pub use single_image::{composite_single_image, SingleImageStrategy};
pub use transport::{exchange_sparse, recv_sparse, send_sparse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcetStrategiesError {
    /// A send/recv/exchange with a peer failed or returned malformed data.
    Transport,
    /// A group or composite order passed to a strategy was inconsistent
    /// (e.g. `image_dest` not a member of `group`).
    InvalidGroup,
    /// The compositing codec rejected an operation (format mismatch,
    /// corrupt run stream, etc).
    Codec,
}

impl std::fmt::Display for IcetStrategiesError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            IcetStrategiesError::Transport => "transport failed exchanging a compressed fragment",
            IcetStrategiesError::InvalidGroup => "invalid process group or destination for this strategy",
            IcetStrategiesError::Codec => "codec rejected a compress/decompress/composite operation",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for IcetStrategiesError {}

pub type IcetStrategiesResult<T> = Result<T, IcetStrategiesError>;

impl From<icet_codec::IcetCodecError> for IcetStrategiesError {
    fn from(_: icet_codec::IcetCodecError) -> Self {
        IcetStrategiesError::Codec
    }
}
