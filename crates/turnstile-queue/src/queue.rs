//! The ticket queue: FIFO order, O(1) key lookup, out-of-order eviction.
//!
//! # Layout
//!
//! Tickets live in an append-only arena of slots. Each push takes the
//! next slot; dequeue and eviction leave a tombstone (`None`) behind.
//! A [`Fenwick`] tree mirrors slot occupancy, so a ticket's position is
//! the number of live slots in front of it: one O(log n) prefix sum.
//!
//! ```text
//!  slot:    0     1     2     3     4     5
//!          [ - ] [ - ] [ B ] [ - ] [ D ] [ E ]
//!                       ▲ head       │
//!                                    └── position(D) = live slots < 4 = 1
//! ```
//!
//! Evicting `B` writes one tombstone and decrements one Fenwick entry;
//! `D` and `E` move up implicitly and tickets in front are unaffected.
//!
//! The dead prefix in front of `head` is dropped once it makes up half
//! the arena, which keeps memory proportional to the live queue and makes
//! dequeue O(1) amortized.
//!
//! # Concurrency
//!
//! `TicketQueue` is a plain data structure with `&mut self` mutators. The
//! admission service keeps it behind one mutex together with everything
//! else that must change atomically with it.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

use crate::QueueError;
use crate::fenwick::Fenwick;

/// Below this many dead slots, compaction isn't worth the rebuild.
const COMPACT_MIN_DEAD: usize = 64;

/// A queued entry request.
///
/// Owned by the queue from push until dequeue or eviction. Its position
/// is not stored: ask the queue with [`TicketQueue::position`].
#[derive(Debug, Clone)]
pub struct Ticket<K, P> {
    /// The key the ticket is indexed by.
    pub key: K,
    /// Whatever the caller pushed alongside the key.
    pub payload: P,
    /// When the ticket joined the queue.
    pub enqueued_at: Instant,
    /// Last time the ticket's position was polled (or its push time).
    pub last_touched_at: Instant,
}

/// FIFO queue of tickets with position lookup and TTL eviction.
#[derive(Debug)]
pub struct TicketQueue<K, P> {
    /// Arena of tickets; `None` marks a dequeued or evicted slot.
    slots: Vec<Option<Ticket<K, P>>>,
    /// Occupancy of `slots`, 1 per live ticket.
    live: Fenwick,
    /// First slot that may still be occupied. Everything before is dead.
    head: usize,
    /// Sequence number of `slots[0]`.
    base: u64,
    /// Sequence number the next push will get.
    next_seq: u64,
    /// Key → sequence number of its slot.
    index: HashMap<K, u64>,
}

impl<K, P> TicketQueue<K, P>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            live: Fenwick::new(),
            head: 0,
            base: 0,
            next_seq: 0,
            index: HashMap::new(),
        }
    }

    /// Appends a ticket at the tail and returns its position.
    ///
    /// The returned position equals the queue length before the push.
    /// From here on it can only shrink, as tickets in front leave.
    ///
    /// # Errors
    /// Returns [`QueueError::DuplicateKey`] if `key` is already queued.
    /// The queue is left untouched in that case.
    pub fn push(&mut self, key: K, payload: P) -> Result<usize, QueueError> {
        if self.index.contains_key(&key) {
            return Err(QueueError::DuplicateKey);
        }

        let position = self.len();
        let now = Instant::now();
        let seq = self.next_seq;
        self.next_seq += 1;

        self.index.insert(key.clone(), seq);
        self.slots.push(Some(Ticket {
            key,
            payload,
            enqueued_at: now,
            last_touched_at: now,
        }));
        self.live.push(1);

        Ok(position)
    }

    /// Removes and returns the oldest ticket, or `None` if empty.
    pub fn dequeue(&mut self) -> Option<Ticket<K, P>> {
        self.skip_dead_head();
        let slot = self.head;
        let ticket = self.slots.get_mut(slot)?.take()?;

        self.live.add(slot, -1);
        self.index.remove(&ticket.key);
        self.head += 1;
        self.skip_dead_head();
        self.maybe_compact();

        Some(ticket)
    }

    /// Returns how many tickets are ahead of `key`, or `None` if it isn't
    /// queued (never pushed, already dequeued, or evicted).
    ///
    /// Polling is the ticket's heartbeat: this refreshes
    /// `last_touched_at`, postponing eviction.
    pub fn position(&mut self, key: &K) -> Option<usize> {
        let slot = self.slot_of(key)?;
        let ticket = self.slots[slot].as_mut()?;
        ticket.last_touched_at = Instant::now();
        Some(self.live.prefix(slot) as usize)
    }

    /// Removes every ticket not polled within `timeout`, wherever it sits,
    /// calling `on_evicted` once per removed key in queue order.
    ///
    /// Tickets behind an evicted one move up by one for each eviction in
    /// front of them; tickets in front keep their position. Returns the
    /// number of tickets evicted.
    pub fn evict_stale<F>(&mut self, timeout: Duration, mut on_evicted: F) -> usize
    where
        F: FnMut(K),
    {
        let now = Instant::now();
        let mut evicted = 0;

        for slot in self.head..self.slots.len() {
            let stale = match &self.slots[slot] {
                Some(t) => now.saturating_duration_since(t.last_touched_at) > timeout,
                None => false,
            };
            if !stale {
                continue;
            }
            if let Some(ticket) = self.slots[slot].take() {
                self.live.add(slot, -1);
                self.index.remove(&ticket.key);
                evicted += 1;
                on_evicted(ticket.key);
            }
        }

        if evicted > 0 {
            self.skip_dead_head();
            self.maybe_compact();
        }
        evicted
    }

    /// Returns `true` if `key` is queued. Does not count as a poll.
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Looks at a ticket without refreshing it.
    pub fn get(&self, key: &K) -> Option<&Ticket<K, P>> {
        let slot = self.slot_of(key)?;
        self.slots[slot].as_ref()
    }

    /// Number of queued tickets.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Queued keys, front first.
    pub fn keys(&self) -> Vec<K> {
        self.slots[self.head..]
            .iter()
            .flatten()
            .map(|t| t.key.clone())
            .collect()
    }

    fn slot_of(&self, key: &K) -> Option<usize> {
        let seq = *self.index.get(key)?;
        Some((seq - self.base) as usize)
    }

    fn skip_dead_head(&mut self) {
        while self.head < self.slots.len() && self.slots[self.head].is_none() {
            self.head += 1;
        }
    }

    /// Drops the dead prefix once it dominates the arena.
    fn maybe_compact(&mut self) {
        if self.index.is_empty() {
            // Cheapest possible rebuild: nothing is alive.
            self.base = self.next_seq;
            self.slots.clear();
            self.live = Fenwick::new();
            self.head = 0;
            return;
        }
        if self.head < COMPACT_MIN_DEAD || self.head * 2 < self.slots.len() {
            return;
        }

        self.slots.drain(..self.head);
        self.base += self.head as u64;
        self.head = 0;
        self.live = Fenwick::from_values(self.slots.iter().map(|s| i64::from(s.is_some())));
    }
}

impl<K, P> Default for TicketQueue<K, P>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
