use super::*;

use crate::error::DepotError;

#[test]
fn test_crc32_known_value() {
    let mut digest = ResumableDigest::new(Algorithm::Crc32);
    digest.update(b"hello world");
    assert_eq!("crc32:0d4a1185", digest.finalize());

    let empty = ResumableDigest::new(Algorithm::Crc32);
    assert_eq!("crc32:00000000", empty.finalize());
}

#[test]
fn test_sha256_known_value() {
    let mut digest = ResumableDigest::new(Algorithm::Sha256);
    digest.update(b"hello world");
    assert_eq!(
        "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9",
        digest.finalize()
    );

    let empty = ResumableDigest::new(Algorithm::Sha256);
    assert_eq!(
        "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        empty.finalize()
    );
}

#[test]
fn test_resume_mid_stream() {
    for algorithm in [Algorithm::Crc32, Algorithm::Sha256] {
        let mut whole = ResumableDigest::new(algorithm);
        whole.update(b"hello world");

        let mut first = ResumableDigest::new(algorithm);
        first.update(b"hello ");
        assert_eq!(6, first.bytes_seen());

        let state = first.serialize_state();
        let mut resumed = ResumableDigest::from_state(&state).unwrap();
        assert_eq!(6, resumed.bytes_seen());
        resumed.update(b"world");

        assert_eq!(whole.finalize(), resumed.finalize());
    }
}

#[test]
fn test_resume_at_every_split() {
    // Exercise splits that land before, on and after block boundaries.
    let data: Vec<u8> = (0u32..200).map(|i| (i * 7 % 251) as u8).collect();

    for algorithm in [Algorithm::Crc32, Algorithm::Sha256] {
        let mut whole = ResumableDigest::new(algorithm);
        whole.update(&data);
        let expected = whole.finalize();

        for split in [0, 1, 63, 64, 65, 127, 128, 199, 200] {
            let mut first = ResumableDigest::new(algorithm);
            first.update(&data[..split]);

            let mut resumed = ResumableDigest::from_state(&first.serialize_state()).unwrap();
            resumed.update(&data[split..]);

            assert_eq!(expected, resumed.finalize(), "split at {}", split);
        }
    }
}

#[test]
fn test_state_roundtrip_is_stable() {
    let mut digest = ResumableDigest::new(Algorithm::Sha256);
    digest.update(b"some bytes that do not fill a block");

    let state = digest.serialize_state();
    let restored = ResumableDigest::from_state(&state).unwrap();
    assert_eq!(state, restored.serialize_state());
}

#[test]
fn test_invalid_states() {
    assert!(matches!(
        ResumableDigest::from_state("no-prefix"),
        Err(DepotError::InvalidDigest { .. })
    ));

    assert!(matches!(
        ResumableDigest::from_state("md5:00112233"),
        Err(DepotError::UnknownDigestAlgorithm { name }) if name == "md5"
    ));

    assert!(matches!(
        ResumableDigest::from_state("crc32:zzzz"),
        Err(DepotError::InvalidDigest { .. })
    ));

    // Truncated records.
    assert!(matches!(
        ResumableDigest::from_state("crc32:0011"),
        Err(DepotError::InvalidDigest { .. })
    ));
    assert!(matches!(
        ResumableDigest::from_state("sha256:00112233"),
        Err(DepotError::InvalidDigest { .. })
    ));

    // A record whose buffered-length field exceeds its representable range.
    let digest = ResumableDigest::new(Algorithm::Sha256);
    let state = digest.serialize_state();
    let (prefix, hex_record) = state.split_at("sha256:".len());
    let mut record = hex::decode(hex_record).unwrap();
    record[40] = 64;
    let forged = format!("{}{}", prefix, hex::encode(record));

    assert!(matches!(
        ResumableDigest::from_state(&forged),
        Err(DepotError::InvalidDigest { .. })
    ));
}

#[test]
fn test_algorithm_names() {
    assert_eq!("crc32", Algorithm::Crc32.as_str());
    assert_eq!("sha256", Algorithm::Sha256.as_str());
    assert_eq!(Algorithm::Crc32, "crc32".parse().unwrap());
    assert_eq!(Algorithm::Sha256, "sha256".parse().unwrap());
    "blake3".parse::<Algorithm>().unwrap_err();
}
