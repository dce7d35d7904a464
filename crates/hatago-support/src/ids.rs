//! Monotonic id generators shared by the router and transports.

use std::sync::atomic::{AtomicU64, Ordering};

/// Generates upstream progress tokens of the form `upstream-{n}`, distinct
/// from whatever progress token (if any) the downstream client supplied.
#[derive(Debug, Default)]
pub struct ProgressTokenGenerator {
    next: AtomicU64,
}

impl ProgressTokenGenerator {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> String {
        format!("upstream-{}", self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Generates JSON-RPC call ids for requests the hub originates towards an
/// upstream server (never exposed to downstream clients).
#[derive(Debug, Default)]
pub struct CallIdGenerator {
    next: AtomicU64,
}

impl CallIdGenerator {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_tokens_are_distinct_and_ordered() {
        let gen = ProgressTokenGenerator::new();
        assert_eq!(gen.next(), "upstream-1");
        assert_eq!(gen.next(), "upstream-2");
    }

    #[test]
    fn call_ids_start_at_one() {
        let gen = CallIdGenerator::new();
        assert_eq!(gen.next(), 1);
        assert_eq!(gen.next(), 2);
    }
}
