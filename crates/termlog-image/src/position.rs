use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// The externally visible "next byte not yet delivered" counter of an image.
///
/// Clones share the same cell, so other threads can observe progress while
/// the owning image is the only writer. Stores are release and loads are
/// acquire; a single writer needs nothing stronger.
#[derive(Debug, Clone)]
pub struct SubscriberPosition {
    id: i32,
    value: Arc<AtomicI64>,
}

impl SubscriberPosition {
    /// Create a counter with identifier `id` starting at `initial`.
    pub fn new(id: i32, initial: i64) -> Self {
        Self::from_shared(id, Arc::new(AtomicI64::new(initial)))
    }

    /// Wrap a cell owned by counter-tracking infrastructure elsewhere.
    pub fn from_shared(id: i32, value: Arc<AtomicI64>) -> Self {
        Self { id, value }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    pub fn set_ordered(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_cell() {
        let position = SubscriberPosition::new(49, 0);
        let observer = position.clone();

        position.set_ordered(160);

        assert_eq!(observer.get(), 160);
        assert_eq!(observer.id(), 49);
    }

    #[test]
    fn wraps_external_cell() {
        let cell = Arc::new(AtomicI64::new(4096));
        let position = SubscriberPosition::from_shared(7, Arc::clone(&cell));

        assert_eq!(position.get(), 4096);
        position.set_ordered(8192);
        assert_eq!(cell.load(Ordering::Acquire), 8192);
    }

    #[test]
    fn visible_across_threads() {
        let position = SubscriberPosition::new(1, 0);
        let writer = position.clone();

        std::thread::spawn(move || {
            for step in 1..=100 {
                writer.set_ordered(step * 32);
            }
        })
        .join()
        .unwrap();

        assert_eq!(position.get(), 3200);
    }
}
