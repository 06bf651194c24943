use super::*;
use std::io::Cursor;

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

// -------------------- crc64 --------------------

#[test]
fn table_matches_polynomial() {
    assert_eq!(TABLE[0], 0);
    assert_eq!(TABLE[1], 0x7ad8_70c8_3035_8979);
    assert_eq!(TABLE[2], 0xf5b0_e190_606b_12f2);
}

#[test]
fn crc64_check_values() {
    assert_eq!(crc64(b"123456789", HEADER_SEED), 0xcaa7_1716_8609_f281);
    assert_eq!(crc64(b"123456789", PAYLOAD_SEED), 0xe9c6_d914_c4b8_d9ca);
}

#[test]
fn crc64_empty_returns_seed() {
    assert_eq!(crc64(&[], 0), 0);
    assert_eq!(crc64(&[], 0xdead_beef), 0xdead_beef);
}

#[test]
fn crc64_folds_incrementally() {
    let data = pattern(700);
    let whole = crc64(&data, 0);
    let split = crc64(&data[300..], crc64(&data[..300], 0));
    assert_eq!(whole, split);
}

#[test]
fn header_checksum_uses_all_ones_seed() {
    let header = pattern(40);
    assert_eq!(header_checksum(&header), crc64(&header, u64::MAX));
    assert_ne!(header_checksum(&header), crc64(&header, 0));
}

// -------------------- Payload rule --------------------

#[test]
fn small_payload_is_hashed_in_full() {
    for len in [0usize, 1, 4, 399, 1023, 1024] {
        let data = pattern(len);
        assert_eq!(payload_checksum(&data), crc64(&data, 0), "len {}", len);
    }
}

#[test]
fn payload_of_2024_bytes_matches_hand_computation() {
    let data = pattern(2024);

    // tail is 1000 bytes: full chunks at 1024 and 1424, partial at 1824
    let a = crc64(&data[..1024], 0);
    let mut samples = Vec::new();
    samples.extend_from_slice(&data[1024..1028]);
    samples.extend_from_slice(&data[1424..1428]);
    samples.extend_from_slice(&data[1824..1828]);
    let b = crc64(&samples, 0);

    assert_eq!(a, 0xc0da_f274_bb9a_b5d0);
    assert_eq!(b, 0x6c8c_c78a_9e50_2382);
    assert_eq!(payload_checksum(&data), a ^ b);
    assert_eq!(payload_checksum(&data), 0xac56_35fe_25ca_9652);
}

#[test]
fn partial_chunk_contributes_at_most_four_bytes() {
    // tail of 402 bytes: one full chunk plus a 2-byte remainder
    let data = pattern(1024 + 402);
    let a = crc64(&data[..1024], 0);
    let mut samples = data[1024..1028].to_vec();
    samples.extend_from_slice(&data[1424..1426]);
    assert_eq!(payload_checksum(&data), a ^ crc64(&samples, 0));
}

#[test]
fn bytes_between_samples_are_ignored() {
    let mut data = pattern(3000);
    let before = payload_checksum(&data);
    data[1100] ^= 0xFF;
    data[2999] ^= 0xFF;
    assert_eq!(payload_checksum(&data), before);

    data[1024] ^= 0xFF;
    assert_ne!(payload_checksum(&data), before);
}

// -------------------- Streaming variant --------------------

#[test]
fn streaming_matches_in_memory() {
    for len in [0usize, 17, 1024, 1025, 1428, 2024, 10_000] {
        let payload = pattern(len);
        let mut file = vec![0xAAu8; 64];
        file.extend_from_slice(&payload);
        file.extend_from_slice(&[0x55; 16]);

        let mut cur = Cursor::new(file);
        let got = payload_checksum_from(&mut cur, 64, len as u64).unwrap();
        assert_eq!(got, payload_checksum(&payload), "len {}", len);
    }
}

#[test]
fn streaming_reports_truncation() {
    let mut cur = Cursor::new(pattern(100));
    let err = payload_checksum_from(&mut cur, 50, 200).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
}
