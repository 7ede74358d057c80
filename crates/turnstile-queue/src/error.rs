//! Error types for the ticket queue.

/// Errors returned by [`TicketQueue`](crate::TicketQueue) mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The key already has a ticket in the queue. A key may appear at
    /// most once; the rejected push changes nothing.
    #[error("key is already queued")]
    DuplicateKey,
}
