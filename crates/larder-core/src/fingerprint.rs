//! 32-bit path fingerprints.
//!
//! Asset paths and package names are keyed by their CRC-32 (IEEE 802.3,
//! reflected polynomial `0xEDB88320`). The manifest builder computes the same
//! value offline, so the two sides must agree bit-for-bit.

/// A 32-bit fingerprint of a logical asset path or package name.
pub type Fingerprint = u32;

const POLYNOMIAL: u32 = 0xEDB8_8320;

const TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLYNOMIAL
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Compute the CRC-32 of raw bytes.
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &byte in bytes {
        crc = TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8);
    }
    !crc
}

/// Fingerprint a logical path or package name.
///
/// Paths are hashed verbatim: `"UI/Icon.png"` and `"ui/icon.png"` are
/// different keys.
#[inline]
pub fn fingerprint(path: &str) -> Fingerprint {
    crc32(path.as_bytes())
}
