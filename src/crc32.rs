//! CRC-32 (the IEEE polynomial), as used by PNG chunks.

/// One table entry per byte value: the CRC of that byte fed through eight
/// shift-and-conditional-XOR rounds of the reflected polynomial.
const CRC_TABLE: [u32; 256] = {
  let mut table = [0_u32; 256];
  let mut n = 0_usize;
  while n < 256 {
    let mut entry = n as u32;
    let mut round = 0;
    while round < 8 {
      entry = if entry & 1 != 0 { 0xEDB8_8320 ^ (entry >> 1) } else { entry >> 1 };
      round += 1;
    }
    table[n] = entry;
    n += 1;
  }
  table
};

/// CRC-32 of a full byte sequence, the way PNG stores it in each chunk.
#[inline]
pub(crate) fn png_crc(bytes: impl Iterator<Item = u8>) -> u32 {
  let crc = bytes.fold(u32::MAX, |crc, byte| {
    CRC_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8)
  });
  crc ^ u32::MAX
}

#[test]
fn test_png_crc_check_value() {
  // the standard CRC-32/ISO-HDLC check input.
  assert_eq!(png_crc(b"123456789".iter().copied()), 0xCBF43926);
  // the IEND chunk's fixed CRC, which covers only its type field.
  assert_eq!(png_crc(b"IEND".iter().copied()), 0xAE426082);
}
