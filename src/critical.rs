//! Arena-based critical-task list (spec.md §3, §4.7; redesigned per §9 from
//! the reference's intrusive singly-linked list into a fixed array of
//! `next` indices keyed by block id — since a block can appear on the list
//! at most once, no separate free-entry pool is needed here, unlike the
//! ready queue in `queue.rs`).

use crate::block::BlockId;

pub struct CriticalList {
    next: Vec<Option<BlockId>>,
    present: Vec<bool>,
    head: Option<BlockId>,
    len: usize,
}

impl CriticalList {
    pub fn new(capacity: usize) -> Self {
        CriticalList {
            next: vec![None; capacity],
            present: vec![false; capacity],
            head: None,
            len: 0,
        }
    }

    pub fn insert(&mut self, id: BlockId) {
        debug_assert!(!self.present[id], "block {id} already on critical list");
        self.next[id] = self.head;
        self.head = Some(id);
        self.present[id] = true;
        self.len += 1;
    }

    /// Unlink by id. Returns `false` if the block was not present (the
    /// caller treats that as a fatal invariant violation).
    pub fn remove(&mut self, id: BlockId) -> bool {
        if !self.present[id] {
            return false;
        }
        let mut cursor = self.head;
        let mut prev: Option<BlockId> = None;
        while let Some(cur) = cursor {
            if cur == id {
                match prev {
                    Some(p) => self.next[p] = self.next[cur],
                    None => self.head = self.next[cur],
                }
                self.next[cur] = None;
                self.present[id] = false;
                self.len -= 1;
                return true;
            }
            prev = Some(cur);
            cursor = self.next[cur];
        }
        false
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.present[id]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = BlockId> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let cur = cursor?;
            cursor = self.next[cur];
            Some(cur)
        })
    }
}
