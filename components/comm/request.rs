/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

use crossbeam_channel::Receiver;

/// An opaque handle to a non-blocking operation started by `isend`/`irecv`.
///
/// `Request::Null` is the distinguished "no operation pending" value: it is
/// what a slot in a request array holds after `wait`/`waitany` consumes it,
/// matching `ICET_COMM_REQUEST_NULL` in `original_source/src/include/IceTDevCommunication.h`.
pub enum Request {
    Null,
    /// A pending send; completes once the message has been handed to the
    /// transport (for the in-process transport, immediately).
    Send(Receiver<()>),
    /// A pending receive; completion yields the received bytes.
    Recv(Receiver<Vec<u8>>),
}

impl Default for Request {
    fn default() -> Self {
        Request::Null
    }
}

impl Request {
    pub fn is_null(&self) -> bool {
        matches!(self, Request::Null)
    }
}
