//! The lookahead half of the DEFLATE reader.

/// Reads a DEFLATE bit stream with at least 32 bits of lookahead.
///
/// Whenever the buffered count drops below 32 the source refills by reading
/// four more bytes little-endian, so the decoder can peek 12 bits for a table
/// probe without checking anything. Refill failure means the stream ran past
/// its input, which the decoder reports as "not ours".
#[derive(Debug, Clone, Copy)]
pub(crate) struct BitSource<'b> {
  bytes: &'b [u8],
  ofs: usize,
  spare_bits: u64,
  spare_bit_count: u32,
}

impl<'b> BitSource<'b> {
  /// Starts reading at `ofs`, which must leave at least four bytes of input.
  #[inline]
  #[must_use]
  pub fn new(bytes: &'b [u8], ofs: usize) -> Option<Self> {
    let first = read_le32(bytes, ofs)?;
    Some(Self { bytes, ofs: ofs + 4, spare_bits: u64::from(first), spare_bit_count: 32 })
  }

  /// Byte offset of the next unread input byte (lookahead not counted).
  #[inline]
  #[must_use]
  pub const fn byte_ofs(&self) -> usize {
    self.ofs
  }

  #[inline]
  #[must_use]
  pub const fn bit_count(&self) -> u32 {
    self.spare_bit_count
  }

  #[inline]
  fn refill(&mut self) -> Option<()> {
    if self.spare_bit_count < 32 {
      let word = read_le32(self.bytes, self.ofs)?;
      self.spare_bits |= u64::from(word) << self.spare_bit_count;
      self.ofs += 4;
      self.spare_bit_count += 32;
    }
    Some(())
  }

  /// The low `count` bits, without consuming them. `count` may be 0 (some
  /// length symbols carry zero extra bits).
  #[inline]
  #[must_use]
  pub fn peek_bits(&self, count: u32) -> u32 {
    debug_assert!(count <= 16);
    debug_assert!(self.spare_bit_count >= count);
    (self.spare_bits as u32) & ((1_u32 << count) - 1)
  }

  /// Consumes and returns `count` bits, then refills the lookahead.
  #[inline]
  pub fn get_bits(&mut self, count: u32) -> Option<u32> {
    debug_assert!(count <= 16);
    let value = self.peek_bits(count);
    self.spare_bits >>= count;
    self.spare_bit_count -= count;
    self.refill()?;
    Some(value)
  }

  /// Consumes `count` bits, then refills the lookahead.
  #[inline]
  pub fn skip_bits(&mut self, count: u32) -> Option<()> {
    debug_assert!(self.spare_bit_count >= count);
    self.spare_bits >>= count;
    self.spare_bit_count -= count;
    self.refill()
  }

  /// Like [`get_bits`](Self::get_bits) but trusts the existing lookahead.
  #[inline]
  #[must_use]
  pub fn get_bits_no_refill(&mut self, count: u32) -> u32 {
    debug_assert!(self.spare_bit_count >= count);
    let value = self.peek_bits(count);
    self.spare_bits >>= count;
    self.spare_bit_count -= count;
    value
  }

  /// Like [`skip_bits`](Self::skip_bits) but trusts the existing lookahead.
  #[inline]
  pub fn skip_bits_no_refill(&mut self, count: u32) {
    debug_assert!(self.spare_bit_count >= count);
    self.spare_bits >>= count;
    self.spare_bit_count -= count;
  }
}

#[inline]
#[must_use]
fn read_le32(bytes: &[u8], ofs: usize) -> Option<u32> {
  let chunk = bytes.get(ofs..ofs + 4)?;
  Some(u32::from_le_bytes(chunk.try_into().unwrap()))
}
