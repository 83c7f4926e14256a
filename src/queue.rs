//! Arena-based ready-task queue (spec.md §4.3, redesigned per §9 from a
//! pointer-linked doubly-linked list into a fixed array of entries plus
//! `next`/`prev` indices, backed by a free-entry pool of the same size).

use crate::block::BlockId;
use crate::criticality::AcceleratorKind;
use std::sync::Mutex;

pub type EntryId = usize;

#[derive(Clone, Copy)]
struct Entry {
    block: BlockId,
    next: Option<EntryId>,
    prev: Option<EntryId>,
    /// Cached placement from the last Fastest-Finish-Time-First-Queued
    /// lookahead pass, so a re-scan after a holdoff doesn't recompute
    /// placements for entries whose position hasn't changed.
    cached_best: Option<(AcceleratorKind, usize)>,
}

struct QueueState {
    entries: Vec<Option<Entry>>,
    free: Vec<EntryId>,
    head: Option<EntryId>,
    tail: Option<EntryId>,
    len: usize,
}

pub struct ReadyQueue {
    inner: Mutex<QueueState>,
}

impl ReadyQueue {
    pub fn new(capacity: usize) -> Self {
        ReadyQueue {
            inner: Mutex::new(QueueState {
                entries: vec![None; capacity],
                free: (0..capacity).rev().collect(),
                head: None,
                tail: None,
                len: 0,
            }),
        }
    }

    pub fn push_back(&self, block: BlockId) {
        let mut state = self.inner.lock().unwrap();
        let id = state.free.pop().expect("ready queue free-entry pool exhausted");
        let prev = state.tail;
        state.entries[id] = Some(Entry { block, next: None, prev, cached_best: None });
        match prev {
            Some(p) => state.entries[p].as_mut().unwrap().next = Some(id),
            None => state.head = Some(id),
        }
        state.tail = Some(id);
        state.len += 1;
    }

    fn unlink(state: &mut QueueState, id: EntryId) -> BlockId {
        let entry = state.entries[id].take().expect("unlink of absent entry");
        match entry.prev {
            Some(p) => state.entries[p].as_mut().unwrap().next = entry.next,
            None => state.head = entry.next,
        }
        match entry.next {
            Some(n) => state.entries[n].as_mut().unwrap().prev = entry.prev,
            None => state.tail = entry.prev,
        }
        state.free.push(id);
        state.len -= 1;
        entry.block
    }

    pub fn remove(&self, id: EntryId) -> BlockId {
        let mut state = self.inner.lock().unwrap();
        Self::unlink(&mut state, id)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().len == 0
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len
    }

    pub fn head(&self) -> Option<(EntryId, BlockId)> {
        let state = self.inner.lock().unwrap();
        state.head.map(|id| (id, state.entries[id].unwrap().block))
    }

    /// Snapshot the current FIFO order as `(entry_id, block_id)` pairs, for
    /// policies that need to traverse from head (§4.5.4).
    pub fn snapshot(&self) -> Vec<(EntryId, BlockId)> {
        let state = self.inner.lock().unwrap();
        let mut out = Vec::with_capacity(state.len);
        let mut cursor = state.head;
        while let Some(id) = cursor {
            let entry = state.entries[id].unwrap();
            out.push((id, entry.block));
            cursor = entry.next;
        }
        out
    }

    pub fn cache_best(&self, id: EntryId, placement: (AcceleratorKind, usize)) {
        let mut state = self.inner.lock().unwrap();
        if let Some(entry) = state.entries[id].as_mut() {
            entry.cached_best = Some(placement);
        }
    }

    pub fn cached_best(&self, id: EntryId) -> Option<(AcceleratorKind, usize)> {
        let state = self.inner.lock().unwrap();
        state.entries[id].and_then(|e| e.cached_best)
    }
}
