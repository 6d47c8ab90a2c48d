//! Slab-backed intrusive doubly-linked lists.
//!
//! Bucket membership in the wheel is a node splice, so scheduling and
//! cancellation never walk a list. Links are slab indices instead of
//! pointers: an unlinked node links to itself, and a list head is a
//! sentinel node of the same shape. A list is empty iff its head links
//! back to itself.

const NO_FREE: usize = usize::MAX;

/// Link pair of one node. Self-referential while the node is unlinked.
#[derive(Debug, Clone, Copy)]
struct Node {
    prev: usize,
    next: usize,
}

#[derive(Debug)]
enum Slot<T> {
    /// Sentinel head of a list. Allocated up front, never freed.
    Head(Node),
    /// A timer node and its payload.
    Timer(Node, T),
    /// Reusable slot. Holds the index of the next free entry.
    Free(usize),
}

/// Slab arena for list nodes, with free-slot reuse.
///
/// The first `heads` slots are sentinel list heads; everything after them
/// is timer storage. Sentinels and timers share one index space so that a
/// node's links can point at either without caring which.
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    next_free: usize,
    timer_count: usize,
}

impl<T> Arena<T> {
    /// Creates an arena whose first `heads` slots are empty sentinel lists.
    pub(crate) fn with_heads(heads: usize) -> Self {
        let mut slots = Vec::with_capacity(heads + 1024); // Preallocate some timer space
        for i in 0..heads {
            slots.push(Slot::Head(Node { prev: i, next: i }));
        }
        Self {
            slots,
            next_free: NO_FREE,
            timer_count: 0,
        }
    }

    /// Allocates an unlinked timer node, reusing freed slots when available.
    pub(crate) fn alloc(&mut self, data: T) -> usize {
        self.timer_count += 1;

        // Case 1: a freed slot can be reused
        if self.next_free != NO_FREE {
            let idx = self.next_free;
            match self.slots[idx] {
                Slot::Free(next) => self.next_free = next,
                _ => panic!("corrupted free list"),
            }
            self.slots[idx] = Slot::Timer(Node { prev: idx, next: idx }, data);
            return idx;
        }

        // Case 2: no free slots, grow the vector
        let idx = self.slots.len();
        self.slots.push(Slot::Timer(Node { prev: idx, next: idx }, data));
        idx
    }

    /// Frees a timer slot and returns its payload. The node must already be
    /// unlinked. Freeing a head, an out-of-range index, or an already-free
    /// slot returns `None` and leaves the arena untouched.
    pub(crate) fn free(&mut self, idx: usize) -> Option<T> {
        match self.slots.get(idx) {
            Some(Slot::Timer(node, _)) => {
                debug_assert!(node.prev == idx && node.next == idx, "freed a linked node");
            }
            _ => return None,
        }
        let old = std::mem::replace(&mut self.slots[idx], Slot::Free(self.next_free));
        match old {
            Slot::Timer(_, data) => {
                self.next_free = idx; // This slot is now the head of the free list
                self.timer_count -= 1;
                Some(data)
            }
            _ => unreachable!(),
        }
    }

    pub(crate) fn get(&self, idx: usize) -> Option<&T> {
        match self.slots.get(idx) {
            Some(Slot::Timer(_, data)) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        match self.slots.get_mut(idx) {
            Some(Slot::Timer(_, data)) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn is_timer(&self, idx: usize) -> bool {
        matches!(self.slots.get(idx), Some(Slot::Timer(..)))
    }

    pub(crate) fn timers(&self) -> usize {
        self.timer_count
    }

    fn node(&self, idx: usize) -> Node {
        match &self.slots[idx] {
            Slot::Head(node) => *node,
            Slot::Timer(node, _) => *node,
            Slot::Free(_) => panic!("list links into a freed slot"),
        }
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node {
        match &mut self.slots[idx] {
            Slot::Head(node) => node,
            Slot::Timer(node, _) => node,
            Slot::Free(_) => panic!("list links into a freed slot"),
        }
    }

    /// Whether the node sits in some list (heads: whether the list is
    /// non-empty).
    pub(crate) fn is_linked(&self, idx: usize) -> bool {
        self.node(idx).next != idx
    }

    pub(crate) fn is_empty_list(&self, head: usize) -> bool {
        self.node(head).next == head
    }

    /// Inserts `idx` immediately before `at`. With a head as `at`, this
    /// appends at the back of the list.
    pub(crate) fn insert_before(&mut self, idx: usize, at: usize) {
        let prev = self.node(at).prev;
        self.insert_between(idx, prev, at);
    }

    /// Inserts `idx` immediately after `at`. With a head as `at`, this
    /// prepends at the front of the list.
    #[allow(dead_code)]
    pub(crate) fn insert_after(&mut self, idx: usize, at: usize) {
        let next = self.node(at).next;
        self.insert_between(idx, at, next);
    }

    fn insert_between(&mut self, idx: usize, prev: usize, next: usize) {
        debug_assert_eq!(self.node(prev).next, next, "neighbors are not adjacent");
        debug_assert_eq!(self.node(next).prev, prev, "neighbors are not adjacent");
        debug_assert!(idx != prev && idx != next, "node inserted next to itself");
        debug_assert!(!self.is_linked(idx), "node is already in a list");
        self.node_mut(prev).next = idx;
        self.node_mut(next).prev = idx;
        let node = self.node_mut(idx);
        node.prev = prev;
        node.next = next;
    }

    /// Splices `idx` out and resets it to a self-loop. Idempotent: already
    /// unlinked nodes are left alone.
    pub(crate) fn unlink(&mut self, idx: usize) {
        let Node { prev, next } = self.node(idx);
        if prev == idx {
            debug_assert_eq!(next, idx);
            return;
        }
        debug_assert_eq!(self.node(prev).next, idx, "neighbor does not point back");
        debug_assert_eq!(self.node(next).prev, idx, "neighbor does not point back");
        self.node_mut(prev).next = next;
        self.node_mut(next).prev = prev;
        let node = self.node_mut(idx);
        node.prev = idx;
        node.next = idx;
    }

    /// Unlinks and returns the first node of the list, if any.
    pub(crate) fn pop_front(&mut self, head: usize) -> Option<usize> {
        let first = self.node(head).next;
        if first == head {
            return None;
        }
        self.unlink(first);
        Some(first)
    }

    /// Detaches the entire chain of `src_head` and reinserts it immediately
    /// after `at`, leaving `src_head` empty. O(1) regardless of chain length.
    pub(crate) fn splice_after(&mut self, src_head: usize, at: usize) {
        let Node { prev: last, next: first } = self.node(src_head);
        if first == src_head {
            return;
        }
        debug_assert_ne!(at, src_head);
        let head = self.node_mut(src_head);
        head.prev = src_head;
        head.next = src_head;

        let after = self.node(at).next;
        self.node_mut(at).next = first;
        self.node_mut(first).prev = at;
        self.node_mut(last).next = after;
        self.node_mut(after).prev = last;
    }

    /// Symmetric to [`Arena::splice_after`]: the chain lands immediately
    /// before `at`.
    pub(crate) fn splice_before(&mut self, src_head: usize, at: usize) {
        let Node { prev: last, next: first } = self.node(src_head);
        if first == src_head {
            return;
        }
        debug_assert_ne!(at, src_head);
        let head = self.node_mut(src_head);
        head.prev = src_head;
        head.next = src_head;

        let before = self.node(at).prev;
        self.node_mut(before).next = first;
        self.node_mut(first).prev = before;
        self.node_mut(last).next = at;
        self.node_mut(at).prev = last;
    }

    /// Walks the ring at `head`, checking both link directions, and returns
    /// the number of nodes excluding the head.
    #[cfg(test)]
    pub(crate) fn assert_ring(&self, head: usize) -> usize {
        let mut count = 0;
        let mut idx = self.node(head).next;
        while idx != head {
            let node = self.node(idx);
            assert_eq!(self.node(node.prev).next, idx, "broken prev link at {idx}");
            assert_eq!(self.node(node.next).prev, idx, "broken next link at {idx}");
            idx = node.next;
            count += 1;
            assert!(count <= self.slots.len(), "ring does not close on its head");
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heads_come_first() {
        let mut arena: Arena<&str> = Arena::with_heads(3);
        let a = arena.alloc("a");
        assert_eq!(a, 3); // Timers land after the sentinels
        assert!(arena.get(0).is_none()); // Heads carry no payload
        assert!(arena.is_empty_list(0));
        assert!(!arena.is_linked(a));
    }

    #[test]
    fn test_reuse_slots() {
        // This is the CRITICAL test
        let mut arena: Arena<u32> = Arena::with_heads(1);
        let id_1 = arena.alloc(1);
        let id_2 = arena.alloc(2);
        let id_3 = arena.alloc(3);

        // Free the middle one
        assert_eq!(arena.free(id_2), Some(2));

        // A new allocation MUST reuse that slot
        let id_4 = arena.alloc(4);
        assert_eq!(id_4, id_2, "arena did not reuse the freed slot");

        // The next one grows the vector again
        let id_5 = arena.alloc(5);
        assert_eq!(id_5, id_3 + 1);
        assert_eq!(arena.get(id_1), Some(&1));
        assert_eq!(arena.timers(), 4);
    }

    #[test]
    fn test_double_free_protection() {
        let mut arena: Arena<&str> = Arena::with_heads(1);
        let id = arena.alloc("a");

        assert!(arena.free(id).is_some());
        assert!(arena.free(id).is_none());

        // Heads and out-of-range indices are rejected too
        assert!(arena.free(0).is_none());
        assert!(arena.free(999).is_none());
    }

    #[test]
    fn test_fifo_order() {
        let mut arena: Arena<u32> = Arena::with_heads(1);
        let a = arena.alloc(1);
        let b = arena.alloc(2);
        let c = arena.alloc(3);
        arena.insert_before(a, 0);
        arena.insert_before(b, 0);
        arena.insert_before(c, 0);
        assert_eq!(arena.assert_ring(0), 3);

        assert_eq!(arena.pop_front(0), Some(a));
        assert_eq!(arena.pop_front(0), Some(b));
        assert_eq!(arena.pop_front(0), Some(c));
        assert_eq!(arena.pop_front(0), None);
        assert!(arena.is_empty_list(0));
    }

    #[test]
    fn test_insert_after_prepends() {
        let mut arena: Arena<u32> = Arena::with_heads(1);
        let a = arena.alloc(1);
        let b = arena.alloc(2);
        arena.insert_after(a, 0);
        arena.insert_after(b, 0);
        assert_eq!(arena.pop_front(0), Some(b));
        assert_eq!(arena.pop_front(0), Some(a));
    }

    #[test]
    fn test_unlink_is_idempotent() {
        let mut arena: Arena<u32> = Arena::with_heads(1);
        let a = arena.alloc(1);
        let b = arena.alloc(2);
        let c = arena.alloc(3);
        for idx in [a, b, c] {
            arena.insert_before(idx, 0);
        }

        arena.unlink(b);
        assert!(!arena.is_linked(b));
        assert_eq!(arena.assert_ring(0), 2);

        // Second unlink is a no-op
        arena.unlink(b);
        assert_eq!(arena.assert_ring(0), 2);
        assert_eq!(arena.pop_front(0), Some(a));
        assert_eq!(arena.pop_front(0), Some(c));
    }

    #[test]
    fn test_splice_moves_whole_chain() {
        let mut arena: Arena<u32> = Arena::with_heads(2);
        let xs: Vec<usize> = (0..3u32).map(|i| arena.alloc(i)).collect();
        for &idx in &xs {
            arena.insert_before(idx, 0);
        }
        let y = arena.alloc(9);
        arena.insert_before(y, 1);

        // Chain lands behind the existing node, source ends up empty
        arena.splice_before(0, 1);
        assert!(arena.is_empty_list(0));
        assert_eq!(arena.assert_ring(1), 4);
        assert_eq!(arena.pop_front(1), Some(y));
        for &idx in &xs {
            assert_eq!(arena.pop_front(1), Some(idx));
        }
    }

    #[test]
    fn test_splice_after_lands_in_front() {
        let mut arena: Arena<u32> = Arena::with_heads(2);
        let a = arena.alloc(1);
        let b = arena.alloc(2);
        arena.insert_before(a, 0);
        arena.insert_before(b, 1);

        arena.splice_after(0, 1);
        assert!(arena.is_empty_list(0));
        assert_eq!(arena.pop_front(1), Some(a));
        assert_eq!(arena.pop_front(1), Some(b));
    }

    #[test]
    fn test_splice_of_empty_list_is_noop() {
        let mut arena: Arena<u32> = Arena::with_heads(2);
        let a = arena.alloc(1);
        arena.insert_before(a, 1);
        arena.splice_before(0, 1);
        arena.splice_after(0, 1);
        assert_eq!(arena.assert_ring(1), 1);
    }
}
