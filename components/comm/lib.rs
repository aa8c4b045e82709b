/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

//! Point-to-point and collective message passing abstraction used by the
//! compositing engine. The engine itself never depends on a concrete
//! transport (MPI, sockets, shared memory): it depends on the
//! [`Communicator`] trait defined here. [`local`] supplies a reference
//! implementation for tests and single-machine use, built the same way
//! `servo_channel` wraps `crossbeam_channel`: typed senders/receivers plus
//! an explicit "is this endpoint gone" flag instead of relying on a panic.

mod datatype;
mod request;
mod communicator;
pub mod local;

pub use datatype::Datatype;
pub use request::Request;
pub use communicator::{CommError, CommResult, Communicator};
pub use local::LocalGroup;
