//! Input validation for bucket names, object names and multipart requests.

use std::net::Ipv4Addr;

use crate::error::StoreError;
use crate::state::multipart::CompletePart;

/// Minimum bucket name length.
const MIN_BUCKET_NAME_LEN: usize = 3;

/// Maximum bucket name length.
const MAX_BUCKET_NAME_LEN: usize = 63;

/// Maximum object name length in bytes.
const MAX_OBJECT_NAME_LEN: usize = 1024;

/// Highest valid part number.
pub const MAX_PART_NUMBER: u32 = 10_000;

fn invalid_bucket(name: &str, reason: &str) -> StoreError {
    StoreError::InvalidBucketName {
        bucket: name.to_owned(),
        reason: reason.to_owned(),
    }
}

/// Validate a bucket name against S3 naming rules.
///
/// # Examples
///
/// ```
/// use dagstore_s3_core::validation::validate_bucket_name;
///
/// assert!(validate_bucket_name("my-bucket").is_ok());
/// assert!(validate_bucket_name("My_Bucket").is_err());
/// ```
pub fn validate_bucket_name(name: &str) -> Result<(), StoreError> {
    let len = name.len();
    if !(MIN_BUCKET_NAME_LEN..=MAX_BUCKET_NAME_LEN).contains(&len) {
        return Err(invalid_bucket(name, "bucket name must be between 3 and 63 characters long"));
    }

    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
    {
        return Err(invalid_bucket(
            name,
            "bucket name must only contain lowercase letters, numbers, hyphens, and dots",
        ));
    }

    let bytes = name.as_bytes();
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !edge_ok(bytes[0]) || !edge_ok(bytes[len - 1]) {
        return Err(invalid_bucket(name, "bucket name must start and end with a letter or number"));
    }

    if name.contains("..") {
        return Err(invalid_bucket(name, "bucket name must not contain consecutive dots"));
    }

    if name.parse::<Ipv4Addr>().is_ok() {
        return Err(invalid_bucket(name, "bucket name must not be formatted as an IP address"));
    }

    Ok(())
}

/// Validate an object name.
pub fn validate_object_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::invalid_argument("object name must not be empty"));
    }
    if name.len() > MAX_OBJECT_NAME_LEN {
        return Err(StoreError::invalid_argument(format!(
            "object name must not exceed {MAX_OBJECT_NAME_LEN} bytes"
        )));
    }
    Ok(())
}

/// Validate a part number (1 through 10 000).
pub fn validate_part_number(part_number: u32) -> Result<(), StoreError> {
    if part_number == 0 || part_number > MAX_PART_NUMBER {
        return Err(StoreError::invalid_argument(format!(
            "part number must be an integer between 1 and {MAX_PART_NUMBER}, inclusive"
        )));
    }
    Ok(())
}

/// Reject a completion list whose part numbers are not strictly ascending.
///
/// The engine trusts the order it is given; request handlers run this
/// before calling `complete_multipart_upload`.
///
/// # Examples
///
/// ```
/// use dagstore_s3_core::state::multipart::CompletePart;
/// use dagstore_s3_core::validation::check_part_order;
///
/// let part = |n| CompletePart { part_number: n, etag: String::new() };
/// assert!(check_part_order(&[part(1), part(2)]).is_ok());
/// assert!(check_part_order(&[part(2), part(1)]).is_err());
/// ```
pub fn check_part_order(parts: &[CompletePart]) -> Result<(), StoreError> {
    if parts
        .windows(2)
        .any(|pair| pair[0].part_number >= pair[1].part_number)
    {
        return Err(StoreError::InvalidPartOrder);
    }
    Ok(())
}
