/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

//! An in-process reference [`Communicator`] used by tests and by
//! single-machine embeddings that simulate several ranks as threads.
//!
//! Grounded on `components/channel/lib.rs`: a typed wrapper over
//! `crossbeam_channel` with an explicit liveness flag rather than letting
//! a dropped peer panic the sender. `LocalGroup::new(n)` plays the role
//! `icetCreateMPICommunicator` plays for a real MPI communicator: it hands
//! back one endpoint per rank, all sharing the same process group.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{unbounded, Select, Sender};

use crate::{CommError, CommResult, Communicator, Datatype, Request};

struct Envelope {
    tag: i32,
    bytes: Vec<u8>,
}

type ChannelKey = (i64, i32, i32); // (context id, src rank, dst rank)
type ChannelPair = (Sender<Envelope>, crossbeam_channel::Receiver<Envelope>);

struct GroupState {
    size: i32,
    next_context: AtomicI64,
    channels: Mutex<HashMap<ChannelKey, ChannelPair>>,
}

impl GroupState {
    fn channel(&self, context: i64, src: i32, dst: i32) -> ChannelPair {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry((context, src, dst))
            .or_insert_with(unbounded)
            .clone()
    }
}

/// One rank's endpoint into a simulated process group. Cheap to clone;
/// clones share the same underlying mailboxes and context id.
#[derive(Clone)]
pub struct LocalGroup {
    state: Arc<GroupState>,
    context: i64,
    rank: i32,
    // Per-(peer, tag) messages read off the wire but not yet matched by a
    // `recv` call with that tag; recv for an unmatched tag keeps draining
    // the peer's channel, stashing mismatches here.
    pending: Arc<Mutex<HashMap<(i32, i32), VecDeque<Vec<u8>>>>>,
    // Local call counter used to derive a private tag namespace for
    // collectives; collectives must be called in the same relative order
    // by every rank, exactly as MPI requires.
    collective_seq: Arc<AtomicI64>,
}

const COLLECTIVE_TAG_BASE: i32 = i32::MIN / 2;

impl LocalGroup {
    /// Builds a fresh `size`-rank process group, one endpoint per rank.
    pub fn new(size: i32) -> Vec<LocalGroup> {
        let state = Arc::new(GroupState {
            size,
            next_context: AtomicI64::new(1),
            channels: Mutex::new(HashMap::new()),
        });
        (0..size)
            .map(|rank| LocalGroup {
                state: state.clone(),
                context: 0,
                rank,
                pending: Arc::new(Mutex::new(HashMap::new())),
                collective_seq: Arc::new(AtomicI64::new(0)),
            })
            .collect()
    }

    fn check_rank(&self, r: i32) -> CommResult<()> {
        if r < 0 || r >= self.state.size {
            Err(CommError::InvalidOperation)
        } else {
            Ok(())
        }
    }

    fn outgoing(&self, dst: i32) -> Sender<Envelope> {
        self.state.channel(self.context, self.rank, dst).0
    }

    fn incoming(&self, src: i32) -> crossbeam_channel::Receiver<Envelope> {
        self.state.channel(self.context, src, self.rank).1
    }

    /// Blocking receive that honors FIFO-per-(pair,tag) by buffering
    /// envelopes whose tag doesn't match yet.
    fn recv_matching(&self, src: i32, tag: i32) -> CommResult<Vec<u8>> {
        {
            let mut pending = self.pending.lock().unwrap();
            if let Some(queue) = pending.get_mut(&(src, tag)) {
                if let Some(bytes) = queue.pop_front() {
                    return Ok(bytes);
                }
            }
        }
        let rx = self.incoming(src);
        loop {
            let envelope = rx.recv().map_err(|_| CommError::Disconnected)?;
            if envelope.tag == tag {
                return Ok(envelope.bytes);
            }
            self.pending
                .lock()
                .unwrap()
                .entry((src, envelope.tag))
                .or_default()
                .push_back(envelope.bytes);
        }
    }

    fn next_collective_tag(&self) -> i32 {
        let seq = self.collective_seq.fetch_add(1, Ordering::Relaxed);
        COLLECTIVE_TAG_BASE.wrapping_add(seq as i32)
    }

    fn chunk_len(total: usize, dtype: Datatype) -> usize {
        let _ = dtype;
        total
    }
}

impl Communicator for LocalGroup {
    fn duplicate(&self) -> Box<dyn Communicator> {
        let context = self.state.next_context.fetch_add(1, Ordering::Relaxed);
        Box::new(LocalGroup {
            state: self.state.clone(),
            context,
            rank: self.rank,
            pending: Arc::new(Mutex::new(HashMap::new())),
            collective_seq: Arc::new(AtomicI64::new(0)),
        })
    }

    fn rank(&self) -> i32 {
        self.rank
    }

    fn size(&self) -> i32 {
        self.state.size
    }

    fn send(&self, buf: &[u8], _dtype: Datatype, dest: i32, tag: i32) -> CommResult<()> {
        self.check_rank(dest)?;
        self.outgoing(dest)
            .send(Envelope {
                tag,
                bytes: buf.to_vec(),
            })
            .map_err(|_| CommError::Disconnected)
    }

    fn recv(&self, count: usize, dtype: Datatype, src: i32, tag: i32) -> CommResult<Vec<u8>> {
        self.check_rank(src)?;
        let bytes = self.recv_matching(src, tag)?;
        debug_assert_eq!(bytes.len(), Self::chunk_len(count * dtype.element_size(), dtype));
        Ok(bytes)
    }

    fn gather(&self, sendbuf: &[u8], dtype: Datatype, root: i32) -> CommResult<Option<Vec<u8>>> {
        self.check_rank(root)?;
        let tag = self.next_collective_tag();
        if self.rank == root {
            let mut out = vec![0u8; sendbuf.len() * self.state.size as usize];
            for r in 0..self.state.size {
                let chunk = if r == root {
                    sendbuf.to_vec()
                } else {
                    self.recv_matching(r, tag)?
                };
                let start = r as usize * sendbuf.len();
                out[start..start + sendbuf.len()].copy_from_slice(&chunk);
            }
            let _ = dtype;
            Ok(Some(out))
        } else {
            self.send(sendbuf, dtype, root, tag)?;
            Ok(None)
        }
    }

    fn allgather(&self, sendbuf: &[u8], dtype: Datatype) -> CommResult<Vec<u8>> {
        let tag = self.next_collective_tag();
        for r in 0..self.state.size {
            if r != self.rank {
                self.send(sendbuf, dtype, r, tag)?;
            }
        }
        let mut out = vec![0u8; sendbuf.len() * self.state.size as usize];
        for r in 0..self.state.size {
            let chunk = if r == self.rank {
                sendbuf.to_vec()
            } else {
                self.recv_matching(r, tag)?
            };
            let start = r as usize * sendbuf.len();
            out[start..start + sendbuf.len()].copy_from_slice(&chunk);
        }
        Ok(out)
    }

    fn isend(&self, buf: &[u8], dtype: Datatype, dest: i32, tag: i32) -> CommResult<Request> {
        self.send(buf, dtype, dest, tag)?;
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let _ = done_tx.send(());
        Ok(Request::Send(done_rx))
    }

    fn irecv(&self, count: usize, dtype: Datatype, src: i32, tag: i32) -> CommResult<Request> {
        self.check_rank(src)?;
        let me = self.clone();
        let (result_tx, result_rx) = crossbeam_channel::bounded(1);
        std::thread::spawn(move || {
            if let Ok(bytes) = me.recv_matching(src, tag) {
                let _ = result_tx.send(bytes);
            }
        });
        let _ = (count, dtype);
        Ok(Request::Recv(result_rx))
    }

    fn wait(&self, req: Request) -> CommResult<Option<Vec<u8>>> {
        match req {
            Request::Null => Ok(None),
            Request::Send(rx) => {
                rx.recv().map_err(|_| CommError::Disconnected)?;
                Ok(None)
            }
            Request::Recv(rx) => Ok(Some(rx.recv().map_err(|_| CommError::Disconnected)?)),
        }
    }

    fn waitany(&self, reqs: &mut [Request]) -> CommResult<(usize, Option<Vec<u8>>)> {
        let mut sel = Select::new();
        let mut live = Vec::new();
        for (i, req) in reqs.iter().enumerate() {
            match req {
                Request::Null => {}
                Request::Send(rx) => {
                    sel.recv(rx);
                    live.push(i);
                }
                Request::Recv(rx) => {
                    sel.recv(rx);
                    live.push(i);
                }
            }
        }
        if live.is_empty() {
            return Err(CommError::InvalidOperation);
        }
        let oper = sel.select();
        let picked = live[oper.index()];
        let payload = match &reqs[picked] {
            Request::Send(rx) => {
                oper.recv(rx).map_err(|_| CommError::Disconnected)?;
                None
            }
            Request::Recv(rx) => Some(oper.recv(rx).map_err(|_| CommError::Disconnected)?),
            Request::Null => unreachable!(),
        };
        reqs[picked] = Request::Null;
        Ok((picked, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_recv_roundtrip() {
        let group = LocalGroup::new(2);
        let (p0, p1) = (group[0].clone(), group[1].clone());
        let t = std::thread::spawn(move || {
            p1.send(&[1, 2, 3, 4], Datatype::Byte, 0, 7).unwrap();
        });
        let bytes = p0.recv(4, Datatype::Byte, 1, 7).unwrap();
        t.join().unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn out_of_order_tags_are_buffered() {
        let group = LocalGroup::new(2);
        let (p0, p1) = (group[0].clone(), group[1].clone());
        let t = std::thread::spawn(move || {
            p1.send(&[9], Datatype::Byte, 0, 2).unwrap();
            p1.send(&[1], Datatype::Byte, 0, 1).unwrap();
        });
        // Ask for tag 1 first even though tag 2 arrives first on the wire.
        let first = p0.recv(1, Datatype::Byte, 1, 1).unwrap();
        let second = p0.recv(1, Datatype::Byte, 1, 2).unwrap();
        t.join().unwrap();
        assert_eq!(first, vec![1]);
        assert_eq!(second, vec![9]);
    }

    #[test]
    fn allgather_orders_by_rank() {
        let group = LocalGroup::new(3);
        let handles: Vec<_> = group
            .into_iter()
            .enumerate()
            .map(|(i, g)| std::thread::spawn(move || g.allgather(&[i as u8], Datatype::Byte).unwrap()))
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), vec![0, 1, 2]);
        }
    }

    #[test]
    fn waitany_completes_the_ready_request() {
        let group = LocalGroup::new(2);
        let (p0, p1) = (group[0].clone(), group[1].clone());
        let t = std::thread::spawn(move || {
            p1.send(&[42], Datatype::Byte, 0, 5).unwrap();
        });
        let mut reqs = vec![
            p0.irecv(1, Datatype::Byte, 1, 5).unwrap(),
            Request::Null,
        ];
        let (idx, payload) = p0.waitany(&mut reqs).unwrap();
        t.join().unwrap();
        assert_eq!(idx, 0);
        assert_eq!(payload, Some(vec![42]));
        assert!(reqs[0].is_null());
    }
}
