//! Tests for the pre-decode validator.

use std::io::Write;

use proptest::prelude::*;
use rstest::rstest;

use super::*;
use crate::test_support::plausible_exr;

#[test]
fn accepts_plausible_payload_at_minimum_length() {
    assert_eq!(validate_bytes(&plausible_exr(MIN_CONTAINER_LEN)), Ok(()));
}

#[test]
fn rejects_empty_payload() {
    assert_eq!(validate_bytes(&[]), Err(ValidationError::Empty));
}

#[rstest]
#[case(1)]
#[case(4)]
#[case(MIN_CONTAINER_LEN - 1)]
fn rejects_short_payloads(#[case] len: usize) {
    let payload = plausible_exr(len);
    assert_eq!(
        validate_bytes(&payload),
        Err(ValidationError::TooSmall { len })
    );
}

#[test]
fn rejects_png_signature_as_bad_magic() {
    let mut payload = vec![0x89, b'P', b'N', b'G'];
    payload.resize(256, 0x41);
    let err = validate_bytes(&payload).expect_err("png is not exr");
    assert!(matches!(err, ValidationError::BadMagic { .. }));
    assert!(err.to_string().contains("bad magic"));
    assert!(err.to_string().contains("89504e47"));
}

#[test]
fn rejects_zero_filled_header() {
    let mut payload = EXR_MAGIC.to_vec();
    payload.resize(2048, 0);
    let err = validate_bytes(&payload).expect_err("zero header must be rejected");
    assert_eq!(
        err,
        ValidationError::CorruptHeader {
            zeros: 92,
            window: 92
        }
    );
    assert!(err.to_string().contains("header looks corrupted"));
}

#[test]
fn tolerates_zero_runs_below_threshold() {
    let mut payload = plausible_exr(512);
    payload[8..78].fill(0);
    assert_eq!(validate_bytes(&payload), Ok(()));
}

#[test]
fn validate_path_reports_missing_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("absent.exr");
    assert!(matches!(
        validate_path(&missing),
        Err(ValidationError::Missing(_))
    ));
}

#[test]
fn validate_path_rejects_directories() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(matches!(
        validate_path(dir.path()),
        Err(ValidationError::NotAFile(_))
    ));
}

#[test]
fn validate_path_matches_byte_validation() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(&plausible_exr(4096))
        .expect("write payload");
    assert_eq!(validate_path(file.path()), Ok(()));

    let mut small = tempfile::NamedTempFile::new().expect("temp file");
    small.write_all(&EXR_MAGIC).expect("write magic");
    assert_eq!(
        validate_path(small.path()),
        Err(ValidationError::TooSmall { len: 4 })
    );
}

proptest! {
    #[test]
    fn short_inputs_are_always_too_small(bytes in proptest::collection::vec(any::<u8>(), 1..MIN_CONTAINER_LEN)) {
        prop_assert_eq!(
            validate_bytes(&bytes),
            Err(ValidationError::TooSmall { len: bytes.len() })
        );
    }

    #[test]
    fn wrong_magic_is_always_rejected(
        head in any::<[u8; 4]>().prop_filter("must differ from magic", |h| *h != EXR_MAGIC),
        tail in proptest::collection::vec(any::<u8>(), MIN_CONTAINER_LEN..2048),
    ) {
        let mut bytes = head.to_vec();
        bytes.extend(tail);
        let is_bad_magic = matches!(validate_bytes(&bytes), Err(ValidationError::BadMagic { .. }));
        prop_assert!(is_bad_magic);
    }

    #[test]
    fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let _ = validate_bytes(&bytes);
    }
}
