/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

use std::fmt;

use crate::{Datatype, Request};

/// The core treats any transport failure as fatal: it does not retry and
/// does not attempt partial-failure recovery (spec.md §4.1, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommError {
    /// The peer endpoint is gone (its `Communicator` was dropped/destroyed).
    Disconnected,
    /// A collective or request-array call was made with no valid operands.
    InvalidOperation,
}

impl fmt::Display for CommError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommError::Disconnected => write!(f, "communicator peer is disconnected"),
            CommError::InvalidOperation => write!(f, "invalid communicator operation"),
        }
    }
}

impl std::error::Error for CommError {}

pub type CommResult<T> = Result<T, CommError>;

/// Typed point-to-point and collective message passing, non-blocking
/// requests. One instance represents this process's view of a single
/// communicator (a process group plus an isolated tag namespace).
///
/// This is the trait boundary spec.md §4.1 describes as a "polymorphic
/// handle"; `original_source/src/include/IceTDevCommunication.h` expresses
/// the same 14 operations as a struct of function pointers. Grounded on
/// `components/channel/lib.rs`'s `Sender`/`Receiver` wrapper for the
/// "typed handle over crossbeam_channel" shape, generalized here to a
/// trait so alternate transports (MPI, sockets) can implement it too.
///
/// All operations except `isend`/`irecv`/`wait`/`waitany` are blocking.
pub trait Communicator: Send {
    /// An isolated namespace for tags; the caller is responsible for
    /// eventually dropping the returned communicator.
    fn duplicate(&self) -> Box<dyn Communicator>;

    fn rank(&self) -> i32;
    fn size(&self) -> i32;

    fn send(&self, buf: &[u8], dtype: Datatype, dest: i32, tag: i32) -> CommResult<()>;
    fn recv(&self, count: usize, dtype: Datatype, src: i32, tag: i32) -> CommResult<Vec<u8>>;

    fn sendrecv(
        &self,
        sendbuf: &[u8],
        sdtype: Datatype,
        dest: i32,
        stag: i32,
        recv_count: usize,
        rdtype: Datatype,
        src: i32,
        rtag: i32,
    ) -> CommResult<Vec<u8>> {
        self.send(sendbuf, sdtype, dest, stag)?;
        self.recv(recv_count, rdtype, src, rtag)
    }

    /// Every process contributes `sendbuf`; only `root` receives the
    /// rank-ordered concatenation.
    fn gather(&self, sendbuf: &[u8], dtype: Datatype, root: i32) -> CommResult<Option<Vec<u8>>>;

    /// Every process contributes `sendbuf`; every process receives the
    /// rank-ordered concatenation.
    fn allgather(&self, sendbuf: &[u8], dtype: Datatype) -> CommResult<Vec<u8>>;

    fn isend(&self, buf: &[u8], dtype: Datatype, dest: i32, tag: i32) -> CommResult<Request>;
    fn irecv(&self, count: usize, dtype: Datatype, src: i32, tag: i32) -> CommResult<Request>;

    /// Blocks until `req` completes and invalidates it. Returns the
    /// received bytes for a receive request, `None` for a send request.
    fn wait(&self, req: Request) -> CommResult<Option<Vec<u8>>>;

    /// Blocks until exactly one of `reqs` completes, returning its index
    /// and payload. The completed slot is replaced with `Request::Null`.
    fn waitany(&self, reqs: &mut [Request]) -> CommResult<(usize, Option<Vec<u8>>)>;
}
