//! Adler-32, the checksum a zlib stream carries over its uncompressed data.

/// Seed value for a fresh Adler-32 run.
pub(crate) const ADLER32_INIT: u32 = 1;

/// Largest block size for which the `s2` accumulator can't overflow `u32`.
const NMAX: usize = 5552;

/// Rolls `adler` forward over `bytes`.
///
/// The accumulators only need reducing mod 65521 once per [`NMAX`] bytes, so
/// the hot loop is add-only.
pub(crate) fn adler32(adler: u32, bytes: &[u8]) -> u32 {
  let mut s1 = adler & 0xFFFF;
  let mut s2 = adler >> 16;
  for block in bytes.chunks(NMAX) {
    for &b in block {
      s1 += u32::from(b);
      s2 += s1;
    }
    s1 %= 65521;
    s2 %= 65521;
  }
  (s2 << 16) + s1
}

#[test]
fn test_adler32_known_values() {
  assert_eq!(adler32(ADLER32_INIT, b""), 1);
  assert_eq!(adler32(ADLER32_INIT, b"Wikipedia"), 0x11E60398);
  // a buffer longer than one reduction block.
  let big: alloc::vec::Vec<u8> = (0..10_000_u32).map(|i| i as u8).collect();
  let mut s1: u32 = 1;
  let mut s2: u32 = 0;
  for &b in big.iter() {
    s1 = (s1 + u32::from(b)) % 65521;
    s2 = (s2 + s1) % 65521;
  }
  assert_eq!(adler32(ADLER32_INIT, &big), (s2 << 16) + s1);
}
