//! Position-aware ticket queue for Turnstile.
//!
//! A [`TicketQueue`] holds pending entry requests in arrival order and
//! answers three questions fast:
//!
//! - *Who's next?* [`TicketQueue::dequeue`], O(1) amortized.
//! - *How many are ahead of me?* [`TicketQueue::position`], O(log n),
//!   which also counts as the ticket's liveness poll.
//! - *Who stopped polling?* [`TicketQueue::evict_stale`], one pass that
//!   can remove tickets from anywhere in the line.
//!
//! Positions follow ticket-number semantics: a ticket's position is the
//! count of tickets pushed before it that are still queued. It never
//! grows; it shrinks by one for every ticket ahead that is admitted or
//! evicted.

mod error;
mod fenwick;
mod queue;

pub use error::QueueError;
pub use queue::{Ticket, TicketQueue};
