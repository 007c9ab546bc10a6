//! The commit-time validation shared by the upload coordinator's Complete
//! and the aggregate coordinator's Complete: both run the same
//! sampled-entry check against a freshly uploaded TAR and its index.

use std::sync::OnceLock;

use rand::seq::SliceRandom;
use regex::Regex;

use crate::error::AppError;
use crate::object_store::{ByteRange, ObjectStore};
use crate::tar_header;
use crate::tar_index::{TarIndex, HEADER_SIZE};

const NAME_RE: &str = r"^[A-Za-z0-9_-]+$";

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(NAME_RE).expect("valid regex"))
}

/// Validates a bucket or datas3t name against the allowed character
/// class (`[A-Za-z0-9_-]+`), surfacing violations as `AppError::Validation`
/// (400) instead of letting them fall through to the catalog's `CHECK`
/// constraint, which would otherwise surface as an opaque 500.
pub fn validate_name(kind: &str, name: &str) -> Result<(), AppError> {
    if name_regex().is_match(name) {
        Ok(())
    } else {
        Err(AppError::Validation(format!("{kind} name {name:?} must match ^[A-Za-z0-9_-]+$")))
    }
}

pub struct ValidatedArchive {
    pub index: TarIndex,
    pub archive_length: u64,
}

/// Runs all of §4.3 Complete step 2-4 against objects that have already
/// been PUT (and, if multipart, already had CompleteMultipartUpload
/// called on them by the caller). Any failure is reported as an
/// `AppError::IntegrityViolation`; the caller is responsible for running
/// the failure-cleanup transaction.
pub async fn validate_uploaded_archive(
    store: &dyn ObjectStore,
    data_key: &str,
    index_key: &str,
    expected_first_idx: i64,
    expected_num_points: i64,
    declared_data_size: i64,
) -> Result<ValidatedArchive, AppError> {
    // Step 2: HEAD the index; fail if absent.
    let index_meta = store
        .head(index_key)
        .await
        .map_err(|e| AppError::UpstreamTransient(e.to_string()))?
        .ok_or_else(|| AppError::IntegrityViolation(format!("index object {index_key} does not exist")))?;

    // Step 3: HEAD the data object; fail if its Content-Length != declared data_size.
    let data_meta = store
        .head(data_key)
        .await
        .map_err(|e| AppError::UpstreamTransient(e.to_string()))?
        .ok_or_else(|| AppError::IntegrityViolation(format!("data object {data_key} does not exist")))?;

    if data_meta.size != declared_data_size as u64 {
        return Err(AppError::IntegrityViolation(format!(
            "uploaded size mismatch expected {declared_data_size} got {}",
            data_meta.size
        )));
    }

    // Step 4: GET the index; assert length % 16 == 0 and entry count == num_points.
    let index_bytes = store.get(index_key).await.map_err(|e| AppError::UpstreamTransient(e.to_string()))?;
    if index_bytes.len() as u64 != index_meta.size {
        return Err(AppError::IntegrityViolation(format!(
            "index GET returned {} bytes but HEAD reported {}",
            index_bytes.len(),
            index_meta.size
        )));
    }
    let index = TarIndex::parse(&index_bytes).map_err(|e| AppError::IntegrityViolation(e.to_string()))?;

    if index.len() as i64 != expected_num_points {
        return Err(AppError::IntegrityViolation(format!(
            "index has {} entries, expected {expected_num_points}",
            index.len()
        )));
    }

    // Recompute the expected archive length from the last index entry;
    // fail on mismatch versus both the declared size and the S3 HEAD.
    let archive_length = index.archive_length().map_err(|e| AppError::IntegrityViolation(e.to_string()))?;
    if archive_length != declared_data_size as u64 {
        return Err(AppError::IntegrityViolation(format!(
            "index implies archive length {archive_length} but declared size is {declared_data_size}"
        )));
    }
    if archive_length != data_meta.size {
        return Err(AppError::IntegrityViolation(format!(
            "index implies archive length {archive_length} but data object HEAD reports {}",
            data_meta.size
        )));
    }

    // Sample index 0, N-1, and up to 3 uniformly random interior indices.
    let sample_indices = sample_indices(index.len());
    for i in sample_indices {
        validate_entry(store, data_key, &index, i, expected_first_idx).await?;
    }

    Ok(ValidatedArchive { index, archive_length })
}

fn sample_indices(len: usize) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    let mut indices = vec![0usize, len - 1];
    if len > 2 {
        let mut interior: Vec<usize> = (1..len - 1).collect();
        interior.shuffle(&mut rand::thread_rng());
        indices.extend(interior.into_iter().take(3));
    }
    indices.sort_unstable();
    indices.dedup();
    indices
}

async fn validate_entry(store: &dyn ObjectStore, data_key: &str, index: &TarIndex, i: usize, expected_first_idx: i64) -> Result<(), AppError> {
    let entry = index.get(i).expect("sample index is in range");
    let range = ByteRange::new(entry.start_offset, entry.start_offset + HEADER_SIZE - 1);
    let header_bytes = store
        .get_range(data_key, range)
        .await
        .map_err(|e| AppError::UpstreamTransient(e.to_string()))?;

    let block: [u8; 512] = header_bytes
        .as_ref()
        .try_into()
        .map_err(|_| AppError::IntegrityViolation(format!("header at entry {i} was not 512 bytes")))?;
    let parsed = tar_header::parse_header(&block).map_err(|e| AppError::IntegrityViolation(e.to_string()))?;

    if !parsed.is_regular {
        return Err(AppError::IntegrityViolation(format!("entry {i} is not a regular file")));
    }
    if parsed.size != entry.size {
        return Err(AppError::IntegrityViolation(format!(
            "entry {i} header size {} does not match index size {}",
            parsed.size, entry.size
        )));
    }

    let expected_key = expected_first_idx + i as i64;
    let decoded_key = crate::keys::parse_entry_key(&parsed.filename)
        .ok_or_else(|| AppError::IntegrityViolation(format!("entry {i} filename {:?} does not match ^\\d{{20}}\\.ext", parsed.filename)))?;
    if decoded_key != expected_key {
        return Err(AppError::IntegrityViolation(format!(
            "entry {i} filename decodes to key {decoded_key}, expected {expected_key}"
        )));
    }

    Ok(())
}
