pub(crate) fn xor_checksum(bytes: &[u8]) -> u8 {
    let mut sum = 0u8;
    for b in bytes {
        sum ^= b;
    }
    sum
}

/// A packet is valid when every byte XORed together, checksum included,
/// comes out zero.
pub(crate) fn checksum_ok(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && xor_checksum(bytes) == 0
}
