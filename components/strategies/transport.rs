/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

use icet_comm::{Communicator, Datatype};
use icet_image::SparseImage;

use crate::{IcetStrategiesError, IcetStrategiesResult};

/// Exchanges a compressed fragment with a single peer: both sides send
/// their own and receive the peer's, same tag. Sparse images are
/// variable-length, so the payload exchange is preceded by a length
/// handshake; both legs use non-blocking requests so neither side can
/// deadlock waiting on the other's send.
///
/// Grounded on `icet_comm::Communicator`'s FIFO-per-(pair,tag) contract
/// (spec.md §4.1): every round of every strategy below claims its own
/// tag so concurrent strategies (impossible within one frame, per
/// spec.md §5) or concurrent rounds never interleave.
pub fn exchange_sparse(
    comm: &dyn Communicator,
    peer: i32,
    tag: i32,
    outgoing: &SparseImage,
) -> IcetStrategiesResult<SparseImage> {
    let payload = outgoing.package();
    let my_len = (payload.len() as u32).to_ne_bytes();

    let send_len = comm
        .isend(&my_len, Datatype::Byte, peer, tag)
        .map_err(|_| IcetStrategiesError::Transport)?;
    let recv_len = comm
        .irecv(4, Datatype::Byte, peer, tag)
        .map_err(|_| IcetStrategiesError::Transport)?;
    comm.wait(send_len).map_err(|_| IcetStrategiesError::Transport)?;
    let len_bytes = comm
        .wait(recv_len)
        .map_err(|_| IcetStrategiesError::Transport)?
        .ok_or(IcetStrategiesError::Transport)?;
    let peer_len = u32::from_ne_bytes(len_bytes.try_into().unwrap()) as usize;

    let send_payload = comm
        .isend(payload, Datatype::Byte, peer, tag)
        .map_err(|_| IcetStrategiesError::Transport)?;
    let recv_payload = comm
        .irecv(peer_len, Datatype::Byte, peer, tag)
        .map_err(|_| IcetStrategiesError::Transport)?;
    comm.wait(send_payload).map_err(|_| IcetStrategiesError::Transport)?;
    let bytes = comm
        .wait(recv_payload)
        .map_err(|_| IcetStrategiesError::Transport)?
        .ok_or(IcetStrategiesError::Transport)?;

    SparseImage::unpackage(&bytes).map_err(|_| IcetStrategiesError::Transport)
}

/// One-directional send of a compressed fragment (length-prefixed so the
/// receiver, which may not know the sparse size in advance, can match it
/// with [`recv_sparse`]).
pub fn send_sparse(comm: &dyn Communicator, dest: i32, tag: i32, image: &SparseImage) -> IcetStrategiesResult<()> {
    let payload = image.package();
    let len = (payload.len() as u32).to_ne_bytes();
    comm.send(&len, Datatype::Byte, dest, tag)
        .map_err(|_| IcetStrategiesError::Transport)?;
    comm.send(payload, Datatype::Byte, dest, tag)
        .map_err(|_| IcetStrategiesError::Transport)
}

pub fn recv_sparse(comm: &dyn Communicator, src: i32, tag: i32) -> IcetStrategiesResult<SparseImage> {
    let len_bytes = comm
        .recv(4, Datatype::Byte, src, tag)
        .map_err(|_| IcetStrategiesError::Transport)?;
    let len = u32::from_ne_bytes(len_bytes.try_into().unwrap()) as usize;
    let bytes = comm
        .recv(len, Datatype::Byte, src, tag)
        .map_err(|_| IcetStrategiesError::Transport)?;
    SparseImage::unpackage(&bytes).map_err(|_| IcetStrategiesError::Transport)
}
