//! Cheap structural checks run before bytes reach the native decoder.
//!
//! The checks are ordered by cost: size, magic number, then a heuristic scan
//! of the header region for zero-byte runs. Passing validation says nothing
//! about whether the file decodes; it only filters out inputs that are
//! obviously not an EXR container.

use std::{fs, io::Read, path::Path};

use thiserror::Error;

/// Magic number opening every OpenEXR file.
pub const EXR_MAGIC: [u8; 4] = [0x76, 0x2f, 0x31, 0x01];

/// Smallest payload accepted as a candidate container.
pub const MIN_CONTAINER_LEN: usize = 100;

/// Length of the header region read for the heuristic checks.
pub const HEADER_REGION_LEN: usize = 1024;

/// Window inside the header region scanned for zero bytes.
const ZERO_SCAN_WINDOW: std::ops::Range<usize> = 8..100;

/// Zero bytes tolerated inside [`ZERO_SCAN_WINDOW`].
const MAX_ZERO_BYTES: usize = 80;

/// Reasons a candidate payload was rejected.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The caller supplied no bytes at all.
    #[error("no EXR data supplied")]
    Empty,
    /// The payload is shorter than [`MIN_CONTAINER_LEN`].
    #[error("too small to be a valid container ({len} bytes, need at least {MIN_CONTAINER_LEN})")]
    TooSmall {
        /// Number of bytes supplied.
        len: usize,
    },
    /// The first four bytes are not [`EXR_MAGIC`].
    #[error("bad magic: expected {expected}, got {found}")]
    BadMagic {
        /// Hex rendering of the expected magic.
        expected: String,
        /// Hex rendering of the bytes found.
        found: String,
    },
    /// The header region is implausibly sparse.
    #[error("header looks corrupted ({zeros} zero bytes in the first {window} header bytes)")]
    CorruptHeader {
        /// Zero bytes counted inside the scan window.
        zeros: usize,
        /// Size of the scan window.
        window: usize,
    },
    /// The path does not exist.
    #[error("file does not exist: {0}")]
    Missing(String),
    /// The path exists but is not a regular file.
    #[error("path is not a file: {0}")]
    NotAFile(String),
    /// The file could not be read.
    #[error("cannot read file {path}: {reason}")]
    Unreadable {
        /// Path that failed.
        path: String,
        /// Underlying I/O failure.
        reason: String,
    },
}

/// Validate an in-memory candidate payload.
///
/// # Errors
///
/// Returns the first [`ValidationError`] the payload trips, checking size,
/// then magic, then header density.
///
/// # Examples
///
/// ```
/// use exrframe::validate::{ValidationError, validate_bytes};
///
/// assert_eq!(validate_bytes(&[]), Err(ValidationError::Empty));
/// assert!(matches!(
///     validate_bytes(&[0_u8; 16]),
///     Err(ValidationError::TooSmall { len: 16 })
/// ));
/// ```
pub fn validate_bytes(bytes: &[u8]) -> Result<(), ValidationError> {
    if bytes.is_empty() {
        return Err(ValidationError::Empty);
    }
    if bytes.len() < MIN_CONTAINER_LEN {
        return Err(ValidationError::TooSmall { len: bytes.len() });
    }
    check_magic(bytes)?;
    let region = &bytes[..bytes.len().min(HEADER_REGION_LEN)];
    check_header_density(region)
}

/// Validate a file on disk without loading more than the header region.
///
/// # Errors
///
/// Returns [`ValidationError::Missing`], [`ValidationError::NotAFile`] or
/// [`ValidationError::Unreadable`] for filesystem problems, otherwise the same
/// rejections as [`validate_bytes`].
pub fn validate_path(path: &Path) -> Result<(), ValidationError> {
    let display = path.display().to_string();
    let metadata = fs::metadata(path).map_err(|_| ValidationError::Missing(display.clone()))?;
    if !metadata.is_file() {
        return Err(ValidationError::NotAFile(display));
    }
    let len = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
    if len == 0 {
        return Err(ValidationError::Empty);
    }
    if len < MIN_CONTAINER_LEN {
        return Err(ValidationError::TooSmall { len });
    }

    let unreadable = |e: std::io::Error| ValidationError::Unreadable {
        path: display.clone(),
        reason: e.to_string(),
    };
    let file = fs::File::open(path).map_err(unreadable)?;
    let mut region = Vec::with_capacity(HEADER_REGION_LEN);
    file.take(HEADER_REGION_LEN as u64)
        .read_to_end(&mut region)
        .map_err(unreadable)?;
    if region.len() < MIN_CONTAINER_LEN {
        return Err(ValidationError::TooSmall { len: region.len() });
    }
    check_magic(&region)?;
    check_header_density(&region)
}

fn check_magic(bytes: &[u8]) -> Result<(), ValidationError> {
    let found = &bytes[..EXR_MAGIC.len()];
    if found == EXR_MAGIC {
        Ok(())
    } else {
        Err(ValidationError::BadMagic {
            expected: hex(&EXR_MAGIC),
            found: hex(found),
        })
    }
}

fn check_header_density(region: &[u8]) -> Result<(), ValidationError> {
    let end = ZERO_SCAN_WINDOW.end.min(region.len());
    let window = region.get(ZERO_SCAN_WINDOW.start..end).unwrap_or_default();
    let zeros = window.iter().filter(|&&b| b == 0).count();
    if zeros > MAX_ZERO_BYTES {
        return Err(ValidationError::CorruptHeader {
            zeros,
            window: window.len(),
        });
    }
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

#[cfg(test)]
mod tests;
