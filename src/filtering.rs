//! From the PNG spec:
//!
//! > Filters are applied to **bytes**, not to pixels, regardless of the bit
//! > depth or color type of the image.
//!
//! This encoder only ever picks two of the five filters: "None" (0) for the
//! first scanline and "Up" (2) for every scanline after it. "Up" turns a row
//! that repeats the row above into a run of zero bytes, which is exactly what
//! the pixel-RLE compressor wants to see.

use alloc::vec::Vec;

/// The filtered scanline stream: per row, one filter byte then the row data.
///
/// `bytes` is over-allocated past `len` so that the compressor's four-byte
/// little-endian pixel peeks stay in bounds at the very end of the stream.
/// Only `bytes[..len]` is meaningful; the tail is zero.
#[derive(Debug, Clone)]
pub(crate) struct FilteredStream {
  pub bytes: Vec<u8>,
  pub len: usize,
}

impl FilteredStream {
  fn with_stream_len(len: usize) -> Self {
    let padded = (len + 8) & !7;
    FilteredStream { bytes: alloc::vec![0; padded], len }
  }
}

/// Filter "None" on row 0, "Up" on every other row.
pub(crate) fn filter_up(image: &[u8], width: u32, height: u32, channels: u32) -> FilteredStream {
  let bpl = (width * channels) as usize;
  let mut out = FilteredStream::with_stream_len((bpl + 1) * height as usize);
  let mut ofs = 0;
  let mut prev_row: Option<&[u8]> = None;
  for row in image.chunks_exact(bpl) {
    match prev_row {
      None => {
        out.bytes[ofs] = 0;
        out.bytes[ofs + 1..ofs + 1 + bpl].copy_from_slice(row);
      }
      Some(prev) => {
        out.bytes[ofs] = 2;
        let dst = &mut out.bytes[ofs + 1..ofs + 1 + bpl];
        for ((d, &x), &b) in dst.iter_mut().zip(row).zip(prev) {
          *d = x.wrapping_sub(b);
        }
      }
    }
    prev_row = Some(row);
    ofs += 1 + bpl;
  }
  debug_assert_eq!(ofs, out.len);
  out
}

/// Filter "None" on every row. The stored-block fallback uses this, since
/// nothing downstream is going to compress the difference rows anyway.
pub(crate) fn filter_none(image: &[u8], width: u32, height: u32, channels: u32) -> FilteredStream {
  let bpl = (width * channels) as usize;
  let mut out = FilteredStream::with_stream_len((bpl + 1) * height as usize);
  let mut ofs = 0;
  for row in image.chunks_exact(bpl) {
    out.bytes[ofs] = 0;
    out.bytes[ofs + 1..ofs + 1 + bpl].copy_from_slice(row);
    ofs += 1 + bpl;
  }
  debug_assert_eq!(ofs, out.len);
  out
}
