//! Audience sync — hashed identifiers for advertising custom audiences.
//!
//! Ad platforms match uploaded users on the SHA-256 of the normalized email
//! address, and cap the number of identifiers per upload request.

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Trim and lowercase an email address. Returns `None` for blank input.
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_lowercase();
    if normalized.is_empty() || !normalized.contains('@') {
        None
    } else {
        Some(normalized)
    }
}

/// Lowercase hex SHA-256 of the normalized email.
pub fn hash_email(email: &str) -> Option<String> {
    normalize_email(email).map(|e| hex::encode(Sha256::digest(e.as_bytes())))
}

/// Hash, dedupe, and chunk a list of emails into upload batches.
///
/// Output is sorted so repeated syncs of the same audience are identical.
pub fn hash_audience<'a, I>(emails: I, batch_size: usize) -> Vec<Vec<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let hashed: BTreeSet<String> = emails.into_iter().filter_map(hash_email).collect();
    let hashed: Vec<String> = hashed.into_iter().collect();
    hashed
        .chunks(batch_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_normalizes_first() {
        assert_eq!(hash_email("  Alice@Example.COM "), hash_email("alice@example.com"));
        // sha256("test@example.com")
        assert_eq!(
            hash_email("test@example.com").unwrap(),
            "973dfe463ec85785f5f95af5ba3906eedb2d931c24e69824a89ea65dba4e813b"
        );
    }

    #[test]
    fn blanks_and_garbage_are_skipped() {
        assert_eq!(hash_email("   "), None);
        assert_eq!(hash_email("not-an-email"), None);
    }

    #[test]
    fn audience_is_deduped_and_batched() {
        let emails = ["a@x.io", "A@x.io", "b@x.io", "c@x.io", "", "d@x.io", "e@x.io"];
        let batches = hash_audience(emails, 2);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), 5);
        assert!(batches.iter().all(|b| b.len() <= 2));
    }

    #[test]
    fn zero_batch_size_does_not_panic() {
        assert_eq!(hash_audience(["a@x.io"], 0).len(), 1);
    }
}
