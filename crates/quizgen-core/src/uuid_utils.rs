//! UUIDv7 helpers.
//!
//! Every orchestrator-owned entity (requests, topics, questions, answers,
//! events) gets a time-ordered v7 id, so ordering by id follows creation order.

use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

/// Whether an id is a version 7 UUID.
pub fn is_v7(id: &Uuid) -> bool {
    id.get_version_num() == 7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_v7_is_v7() {
        assert!(is_v7(&new_v7()));
        assert!(!is_v7(&Uuid::new_v4()));
    }

    #[test]
    fn test_v7_ids_are_time_ordered() {
        let first = new_v7();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = new_v7();
        assert!(first < second);
    }
}
