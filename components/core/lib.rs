/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

//! Frame driver, context, state dictionary, error types, and diagnostics:
//! component C6 plus the ambient stack tying every lower crate together.
//!
//! This is the facade crate: applications depend on `icet_core` alone and
//! reach the lower crates' types only through its re-exports, the way
//! `components/servo` sits atop `compositing`/`compositing_traits` and
//! friends rather than requiring callers to pull in each piece directly.

mod context;
mod diagnostics;
mod error;
mod frame;
mod state;
mod timing;

pub use context::{Context, DrawCallback};
pub use diagnostics::{Diagnostics, Verbosity};
pub use error::{IcetError, IcetResult};
pub use frame::draw_frame;
pub use state::{ContextState, StateKey, StateValue};
pub use timing::FrameTimer;

pub use icet_comm::{CommError, Communicator, Datatype, LocalGroup, Request};
pub use icet_image::{
    ColorFormat, CompositeMode, DenseImage, DepthFormat, ImageFormat, PackedBackground,
    SparseImage,
};
pub use icet_projection::Matrix4;
pub use icet_strategies::{MultiTileStrategy, SingleImageStrategy};
pub use icet_tiles::{Tile, TileSet};
