//! Helpers for constructing point identifiers, hashes, and payload timestamps.

use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// Deterministic point id for chunk `chunk_index` of `job_id`.
///
/// Re-processing the same job index always yields the same UUIDv5, so an upsert overwrites the
/// previous point instead of duplicating it.
pub fn point_id_for(job_id: &str, chunk_index: usize) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_DNS,
        format!("{job_id}-{chunk_index}").as_bytes(),
    )
    .to_string()
}

/// Compute a hex SHA-256 digest of `bytes`.
pub fn compute_content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_reproducible_per_job_and_index() {
        assert_eq!(point_id_for("job-a", 0), point_id_for("job-a", 0));
        assert_ne!(point_id_for("job-a", 0), point_id_for("job-a", 1));
        assert_ne!(point_id_for("job-a", 0), point_id_for("job-b", 0));
    }

    #[test]
    fn point_id_is_a_version_five_uuid() {
        let id = Uuid::parse_str(&point_id_for("job-a", 3)).expect("uuid");
        assert_eq!(id.get_version_num(), 5);
    }

    #[test]
    fn content_hash_is_stable_hex() {
        let h1 = compute_content_hash(b"Hello world");
        let h2 = compute_content_hash(b"Hello world");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn timestamp_is_rfc3339_like() {
        let ts = current_timestamp_rfc3339();
        assert!(ts.contains('T') && ts.ends_with('Z'));
    }
}
