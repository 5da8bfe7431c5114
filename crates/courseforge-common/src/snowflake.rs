//! Time-sortable ID generation.
//!
//! Every row gets a UUID v7: globally unique, generated without
//! coordination, and ordered by creation time.

use uuid::Uuid;

/// Generate a new time-sortable ID.
pub fn generate_id() -> Uuid {
    Uuid::now_v7()
}

/// Extract the approximate creation timestamp from a UUID v7.
pub fn extract_timestamp(id: Uuid) -> Option<chrono::DateTime<chrono::Utc>> {
    let bytes = id.as_bytes();
    // UUID v7: first 48 bits are millisecond timestamp
    let ms = bytes[..6]
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));

    chrono::DateTime::from_timestamp_millis(ms as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        let id1 = generate_id();
        let id2 = generate_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_ids_are_time_sortable() {
        let id1 = generate_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = generate_id();
        assert!(id1 < id2);
    }

    #[test]
    fn test_extract_timestamp() {
        let before = chrono::Utc::now();
        let id = generate_id();
        let after = chrono::Utc::now();

        let extracted = extract_timestamp(id).expect("should extract timestamp");
        assert!(extracted >= before - chrono::Duration::milliseconds(1));
        assert!(extracted <= after + chrono::Duration::milliseconds(1));
    }
}
