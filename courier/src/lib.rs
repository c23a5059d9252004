#![warn(
    missing_docs,
    future_incompatible,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! Message-passing substrate for gasmat.
//!
//! A fixed set of ranks runs inside one process, one thread per rank.  Each
//! rank owns a mailbox fed by every peer; messages are addressed by a
//! `(source, tag)` pair and are delivered FIFO per pair.  On top of the
//! mailbox the substrate offers non-blocking receives (`irecv` + `wait` /
//! `wait_some` / `test_some`), probing for dynamically-sized payloads, and a
//! small set of collectives (barrier, gather, broadcast, and a logical-AND
//! all-reduce with an asynchronous flavor used for convergence detection).
//!
//! Sends are buffered: ownership of the byte blob moves into the channel and
//! the call completes immediately, so there is no send-side request object to
//! wait on.  A rank panic takes the whole job down when the launcher joins.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::time::{SystemTime, UNIX_EPOCH};

/// Tags below this value are free for the application; collectives use the
/// range above it.
pub const COLLECTIVE_BASE: u32 = 1 << 30;

const TAG_GATHER: u32 = COLLECTIVE_BASE;
const TAG_BCAST: u32 = COLLECTIVE_BASE + 1;
const TAG_CONV: u32 = COLLECTIVE_BASE + 2; // and + 3 (double-buffered)

/// Wall clock in seconds, for run banners and timers.
pub fn wall_seconds() -> f64 {
    let n = SystemTime::now().duration_since(UNIX_EPOCH).unwrap();
    (n.as_secs() as f64) + (n.as_micros() as f64) * 1.0e-6
}

struct Packet {
    src: usize,
    tag: u32,
    bytes: Vec<u8>,
}

struct Shared {
    nranks: usize,
    senders: Vec<Sender<Packet>>,
    barrier: Barrier,
    comm_nbytes: AtomicU64,
}

struct EnvInner {
    rank: usize,
    shared: Arc<Shared>,
    inbox: Receiver<Packet>,
    /// Messages pulled off the inbox but not yet claimed by a receive.
    stash: RefCell<HashMap<(usize, u32), VecDeque<Vec<u8>>>>,
    /// Sequence counter for the double-buffered convergence all-reduce.
    conv_seq: Cell<u32>,
}

/// Per-rank handle to the substrate.  Cheap to clone within a rank.
#[derive(Clone)]
pub struct Env {
    inner: Rc<EnvInner>,
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Env")
            .field("rank", &self.inner.rank)
            .field("nranks", &self.inner.shared.nranks)
            .finish()
    }
}

/// A posted non-blocking receive, completed by `Env::wait` or `Env::wait_some`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvReq {
    /// Rank the message must come from.
    pub src: usize,
    /// Tag the message must carry.
    pub tag: u32,
}

/// An in-flight logical-AND all-reduce.  The local contribution is pushed to
/// every peer when the operation is posted; `Env::wait_allreduce_and` only
/// drains the peers' contributions.
#[derive(Debug)]
pub struct AllreduceAnd {
    tag: u32,
    local: bool,
}

impl Env {
    /// This rank's id in `0..nranks`.
    pub fn rank(&self) -> usize {
        self.inner.rank
    }

    /// Total number of ranks.
    pub fn nranks(&self) -> usize {
        self.inner.shared.nranks
    }

    /// True on rank 0.
    pub fn is_master(&self) -> bool {
        self.inner.rank == 0
    }

    /// Global barrier across all ranks.
    pub fn barrier(&self) {
        self.inner.shared.barrier.wait();
    }

    /// Timestamp in seconds.
    pub fn now(&self) -> f64 {
        wall_seconds()
    }

    /// Bytes sent to non-self destinations, across all ranks of the job.
    pub fn get_global_comm_nbytes(&self) -> u64 {
        self.inner.shared.comm_nbytes.load(Ordering::Relaxed)
    }

    /// Send `bytes` to `dest` under `tag`.  Buffered; completes immediately.
    pub fn send(&self, bytes: Vec<u8>, dest: usize, tag: u32) {
        if dest != self.inner.rank {
            self.inner
                .shared
                .comm_nbytes
                .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        }
        self.inner.shared.senders[dest]
            .send(Packet {
                src: self.inner.rank,
                tag,
                bytes,
            })
            .expect("peer mailbox closed");
    }

    /// Post a non-blocking receive for a message from `src` under `tag`.
    pub fn irecv(&self, src: usize, tag: u32) -> RecvReq {
        RecvReq { src, tag }
    }

    /// Block until the posted receive completes and return its payload.
    pub fn wait(&self, req: RecvReq) -> Vec<u8> {
        loop {
            if let Some(bytes) = self.take_stashed(req.src, req.tag) {
                return bytes;
            }
            self.block_for_one();
        }
    }

    /// Blocking receive.
    pub fn recv(&self, src: usize, tag: u32) -> Vec<u8> {
        self.wait(RecvReq { src, tag })
    }

    /// Block until at least one of the pending requests completes.  Completed
    /// slots are taken (set to `None`) and returned as `(slot, payload)`.
    /// Returns empty immediately iff every slot is already `None`.
    pub fn wait_some(&self, reqs: &mut [Option<RecvReq>]) -> Vec<(usize, Vec<u8>)> {
        if reqs.iter().all(Option::is_none) {
            return Vec::new();
        }
        loop {
            let ready = self.test_some(reqs);
            if !ready.is_empty() {
                return ready;
            }
            self.block_for_one();
        }
    }

    /// Non-blocking variant of `wait_some`.
    pub fn test_some(&self, reqs: &mut [Option<RecvReq>]) -> Vec<(usize, Vec<u8>)> {
        self.drain_inbox();
        let mut ready = Vec::new();
        for (i, slot) in reqs.iter_mut().enumerate() {
            if let Some(req) = *slot {
                if let Some(bytes) = self.take_stashed(req.src, req.tag) {
                    ready.push((i, bytes));
                    *slot = None;
                }
            }
        }
        ready
    }

    /// Non-blocking probe: byte count of the next matching message, if any.
    pub fn iprobe(&self, src: usize, tag: u32) -> Option<usize> {
        self.drain_inbox();
        let stash = self.inner.stash.borrow();
        stash
            .get(&(src, tag))
            .and_then(|q| q.front())
            .map(|b| b.len())
    }

    /// Blocking probe: byte count of the next matching message.
    pub fn probe(&self, src: usize, tag: u32) -> usize {
        loop {
            if let Some(n) = self.iprobe(src, tag) {
                return n;
            }
            self.block_for_one();
        }
    }

    /// Gather one payload per rank at `root` (in rank order, self included).
    pub fn gather_bytes(&self, payload: Vec<u8>, root: usize) -> Option<Vec<Vec<u8>>> {
        if self.inner.rank == root {
            let mut out = vec![Vec::new(); self.nranks()];
            for src in 0..self.nranks() {
                if src == root {
                    out[src] = payload.clone();
                } else {
                    out[src] = self.recv(src, TAG_GATHER);
                }
            }
            Some(out)
        } else {
            self.send(payload, root, TAG_GATHER);
            None
        }
    }

    /// Broadcast `root`'s payload to every rank.  Non-root ranks pass `None`.
    pub fn bcast_bytes(&self, payload: Option<Vec<u8>>, root: usize) -> Vec<u8> {
        if self.inner.rank == root {
            let bytes = payload.expect("bcast root must supply a payload");
            for dest in 0..self.nranks() {
                if dest != root {
                    self.send(bytes.clone(), dest, TAG_BCAST);
                }
            }
            bytes
        } else {
            self.recv(root, TAG_BCAST)
        }
    }

    /// Blocking logical-AND all-reduce.
    pub fn allreduce_and(&self, local: bool) -> bool {
        let h = self.iallreduce_and(local);
        self.wait_allreduce_and(h)
    }

    /// Post an asynchronous logical-AND all-reduce.  The local bit is pushed
    /// to every peer now; the result is collected by `wait_allreduce_and`.
    /// Callers must wait on the previous operation before posting the next;
    /// two tag slots keep back-to-back operations from mixing.
    pub fn iallreduce_and(&self, local: bool) -> AllreduceAnd {
        let seq = self.inner.conv_seq.get();
        self.inner.conv_seq.set(seq.wrapping_add(1));
        let tag = TAG_CONV + (seq % 2);
        for dest in 0..self.nranks() {
            if dest != self.inner.rank {
                self.send(vec![local as u8], dest, tag);
            }
        }
        AllreduceAnd { tag, local }
    }

    /// Drain an asynchronous all-reduce and return the global AND.
    pub fn wait_allreduce_and(&self, op: AllreduceAnd) -> bool {
        let mut acc = op.local;
        for src in 0..self.nranks() {
            if src != self.inner.rank {
                let bytes = self.recv(src, op.tag);
                acc &= bytes[0] != 0;
            }
        }
        acc
    }

    fn take_stashed(&self, src: usize, tag: u32) -> Option<Vec<u8>> {
        self.drain_inbox();
        let mut stash = self.inner.stash.borrow_mut();
        let q = stash.get_mut(&(src, tag))?;
        let bytes = q.pop_front();
        if q.is_empty() {
            stash.remove(&(src, tag));
        }
        bytes
    }

    fn drain_inbox(&self) {
        let mut stash = self.inner.stash.borrow_mut();
        while let Ok(p) = self.inner.inbox.try_recv() {
            stash
                .entry((p.src, p.tag))
                .or_insert_with(VecDeque::new)
                .push_back(p.bytes);
        }
    }

    fn block_for_one(&self) {
        let p = self.inner.inbox.recv().expect("all peer mailboxes closed");
        self.inner
            .stash
            .borrow_mut()
            .entry((p.src, p.tag))
            .or_insert_with(VecDeque::new)
            .push_back(p.bytes);
    }
}

/// Launcher for a fixed set of ranks.
#[derive(Debug)]
pub struct Runtime;

impl Runtime {
    /// Run `f` on `nranks` rank threads and collect the per-rank results in
    /// rank order.  A panicking rank aborts the whole job.
    pub fn launch<F, R>(nranks: usize, f: F) -> Vec<R>
    where
        F: Fn(Env) -> R + Send + Sync + 'static,
        R: Send + 'static,
    {
        assert!(nranks > 0, "nranks must be positive");
        log::debug!("launching {} ranks", nranks);

        let mut senders = Vec::with_capacity(nranks);
        let mut inboxes = Vec::with_capacity(nranks);
        for _ in 0..nranks {
            let (tx, rx) = unbounded();
            senders.push(tx);
            inboxes.push(rx);
        }

        let shared = Arc::new(Shared {
            nranks,
            senders,
            barrier: Barrier::new(nranks),
            comm_nbytes: AtomicU64::new(0),
        });

        let f = Arc::new(f);
        let mut handles = Vec::with_capacity(nranks);
        for (rank, inbox) in inboxes.into_iter().enumerate() {
            let shared = Arc::clone(&shared);
            let f = Arc::clone(&f);
            handles.push(
                std::thread::Builder::new()
                    .name(format!("rank-{}", rank))
                    .spawn(move || {
                        let env = Env {
                            inner: Rc::new(EnvInner {
                                rank,
                                shared,
                                inbox,
                                stash: RefCell::new(HashMap::new()),
                                conv_seq: Cell::new(0),
                            }),
                        };
                        f(env)
                    })
                    .expect("failed to spawn rank thread"),
            );
        }

        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(r) => r,
                Err(e) => std::panic::resume_unwind(e),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_recv_roundtrip() {
        Runtime::launch(2, |env| {
            let peer = 1 - env.rank();
            env.send(vec![env.rank() as u8; 4], peer, 7);
            let got = env.recv(peer, 7);
            assert_eq!(got, vec![peer as u8; 4]);
        });
    }

    #[test]
    fn self_send() {
        Runtime::launch(1, |env| {
            env.send(b"hello".to_vec(), 0, 3);
            assert_eq!(env.probe(0, 3), 5);
            assert_eq!(env.recv(0, 3), b"hello");
        });
    }

    #[test]
    fn tag_fifo_per_pair() {
        Runtime::launch(2, |env| {
            if env.rank() == 0 {
                env.send(vec![1], 1, 9);
                env.send(vec![2], 1, 9);
                env.send(vec![3], 1, 8);
            } else {
                assert_eq!(env.recv(0, 8), vec![3]);
                assert_eq!(env.recv(0, 9), vec![1]);
                assert_eq!(env.recv(0, 9), vec![2]);
            }
        });
    }

    #[test]
    fn wait_some_completes_slots() {
        Runtime::launch(3, |env| {
            if env.rank() == 0 {
                let mut reqs: Vec<Option<RecvReq>> = (1..3)
                    .map(|src| Some(env.irecv(src, 11)))
                    .collect();
                let mut seen = 0;
                while reqs.iter().any(Option::is_some) {
                    for (slot, bytes) in env.wait_some(&mut reqs) {
                        assert_eq!(bytes, vec![(slot + 1) as u8]);
                        seen += 1;
                    }
                }
                assert_eq!(seen, 2);
                assert!(env.wait_some(&mut reqs).is_empty());
            } else {
                env.send(vec![env.rank() as u8], 0, 11);
            }
        });
    }

    #[test]
    fn gather_and_bcast() {
        Runtime::launch(4, |env| {
            let gathered = env.gather_bytes(vec![env.rank() as u8], 0);
            if env.is_master() {
                let gathered = gathered.unwrap();
                assert_eq!(gathered.len(), 4);
                for (r, b) in gathered.iter().enumerate() {
                    assert_eq!(b, &vec![r as u8]);
                }
            } else {
                assert!(gathered.is_none());
            }
            let payload = if env.is_master() {
                Some(vec![42])
            } else {
                None
            };
            assert_eq!(env.bcast_bytes(payload, 0), vec![42]);
        });
    }

    #[test]
    fn allreduce_and_waits_only_when_converged() {
        Runtime::launch(3, |env| {
            // First round: one rank dissents.
            let op = env.iallreduce_and(env.rank() != 2);
            assert!(!env.wait_allreduce_and(op));
            // Second round: unanimous.
            let op = env.iallreduce_and(true);
            assert!(env.wait_allreduce_and(op));
        });
    }

    #[test]
    fn comm_bytes_counts_remote_only() {
        let counts = Runtime::launch(2, |env| {
            env.send(vec![0; 10], env.rank(), 1); // self, not counted
            env.send(vec![0; 5], 1 - env.rank(), 2);
            env.recv(env.rank(), 1);
            env.recv(1 - env.rank(), 2);
            env.barrier();
            env.get_global_comm_nbytes()
        });
        assert!(counts.iter().all(|&c| c == 10));
    }
}
