//! Request numbering for the client side of a connection.
//!
//! The server never generates sequence numbers; it echoes the request's value
//! in the reply so the client can pair them up and discard anything stale.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically increasing request counter shared between callers.
///
/// Values start at 1 so that a zero sequence number on the wire always means
/// "not issued by this counter".  The counter wraps from `u64::MAX` back to 1.
///
/// # Examples
///
/// ```rust
/// use matrix_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.next(), 2);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    inner: AtomicU64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(1),
        }
    }

    /// Returns the next sequence number.
    ///
    /// `Relaxed` ordering is enough: the value only pairs a reply with its
    /// request and never guards other memory.
    pub fn next(&self) -> u64 {
        let value = self.inner.fetch_add(1, Ordering::Relaxed);
        if value == 0 {
            // Wrapped past u64::MAX; skip the reserved zero.
            return self.inner.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Value the next call to [`next`](Self::next) will usually return.
    pub fn peek(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_first_sequence_number_is_one() {
        let counter = SequenceCounter::new();
        assert_eq!(counter.next(), 1);
    }

    #[test]
    fn test_wrap_skips_zero() {
        // Arrange – one step before overflow
        let counter = SequenceCounter {
            inner: AtomicU64::new(u64::MAX),
        };

        // Act
        let last = counter.next();
        let wrapped = counter.next();

        // Assert
        assert_eq!(last, u64::MAX);
        assert_eq!(wrapped, 1, "zero is never handed out");
    }

    #[test]
    fn test_peek_does_not_advance() {
        let counter = SequenceCounter::new();
        counter.next();
        assert_eq!(counter.peek(), 2);
        assert_eq!(counter.next(), 2);
    }

    #[test]
    fn test_concurrent_callers_never_share_a_number() {
        // Arrange
        let counter = Arc::new(SequenceCounter::new());

        // Act
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = Arc::clone(&counter);
                thread::spawn(move || (0..500).map(|_| c.next()).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();

        // Assert
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 2000);
    }
}
