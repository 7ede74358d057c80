//! A growable Fenwick (binary indexed) tree of occupancy counts.
//!
//! Slot `i` holds 1 while a ticket lives there and 0 once it has been
//! dequeued or evicted. `prefix(i)` is then "how many live tickets sit in
//! front of slot `i`", which is exactly a ticket's queue position.
//! Removing a ticket anywhere is one `add(i, -1)`, and every ticket
//! behind it moves up by one without being touched.

/// Fenwick tree over `i64` counts, 0-indexed from the outside.
#[derive(Debug, Default, Clone)]
pub(crate) struct Fenwick {
    /// 1-indexed internally; `tree[0]` is unused padding.
    tree: Vec<i64>,
}

#[inline]
fn lowbit(i: usize) -> usize {
    i & i.wrapping_neg()
}

impl Fenwick {
    pub(crate) fn new() -> Self {
        Self { tree: vec![0] }
    }

    /// Builds a tree from raw slot values in O(n).
    pub(crate) fn from_values(values: impl IntoIterator<Item = i64>) -> Self {
        let mut tree = vec![0];
        tree.extend(values);
        let n = tree.len() - 1;
        for i in 1..=n {
            let parent = i + lowbit(i);
            if parent <= n {
                tree[parent] += tree[i];
            }
        }
        Self { tree }
    }

    /// Number of slots.
    pub(crate) fn len(&self) -> usize {
        self.tree.len() - 1
    }

    /// Appends a new slot holding `value`. O(log n).
    ///
    /// Node `j` covers `(j - lowbit(j), j]`; everything in that range
    /// except the new slot is already in the tree.
    pub(crate) fn push(&mut self, value: i64) {
        let j = self.tree.len();
        let covered = self.prefix(j - 1) - self.prefix(j - lowbit(j));
        self.tree.push(value + covered);
    }

    /// Adds `delta` to slot `index`. O(log n).
    pub(crate) fn add(&mut self, index: usize, delta: i64) {
        let mut i = index + 1;
        while i < self.tree.len() {
            self.tree[i] += delta;
            i += lowbit(i);
        }
    }

    /// Sum of slots `[0, end)`. O(log n).
    pub(crate) fn prefix(&self, end: usize) -> i64 {
        let mut i = end.min(self.len());
        let mut sum = 0;
        while i > 0 {
            sum += self.tree[i];
            i -= lowbit(i);
        }
        sum
    }
}
