/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

//! Projects bounding geometry through the current view matrices into a
//! screen-space rectangle and clip-space depth range. Component C4
//! "Projection / bounds".

mod bounds;
mod matrix;

pub use bounds::{project_bounds, ContainedBounds};
pub use matrix::Matrix4;
