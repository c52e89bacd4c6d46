//! Time-ordered ids for rows created app-side.
//!
//! Chat sessions, chat messages and session-token records use UUIDv7 so their
//! primary keys sort by creation time. `users` keeps PostgreSQL's
//! `gen_random_uuid()` default.

use uuid::Uuid;

/// Generate a new UUIDv7.
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuidv7_has_version_7() {
        assert_eq!(uuidv7().get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn later_ids_sort_after_earlier_ones() {
        let ids: Vec<Uuid> = (0..16).map(|_| uuidv7()).collect();
        assert!(ids.windows(2).all(|w| w[0] <= w[1]));
    }
}
