//! The pixel-RLE parse and both code emitters.
//!
//! The parse only ever produces three token shapes: a whole pixel of
//! literals, the lone filter byte that starts a scanline, and an RLE match
//! whose distance is the pixel stride. Tokens pack into one machine word
//! each: the low byte is the tag (0 = pixel literals, 1 = filter literal,
//! anything else = match length minus one) and the pixel bytes ride above
//! it. Three-channel streams fit a token in a `u32`; four-channel needs a
//! `u64`.

use super::*;
use crate::adler32::{adler32, ADLER32_INIT};
use crate::bit_sink::{BitSink, Overflow};
use crate::filtering::FilteredStream;
use alloc::vec::Vec;

#[inline]
#[must_use]
fn read_le32(bytes: &[u8], ofs: usize) -> u32 {
  u32::from_le_bytes(bytes[ofs..ofs + 4].try_into().unwrap())
}

#[inline]
fn put_code(sink: &mut BitSink, table: &HuffmanTable<MAX_LIT_SYMS>, sym: usize) {
  debug_assert!(table.sizes[sym] >= 1);
  sink.put(u32::from(table.codes[sym]), u32::from(table.sizes[sym]));
}

#[inline]
fn put_catalog_code(sink: &mut BitSink, codes: &[HuffCode; MAX_LIT_SYMS], sym: usize) {
  debug_assert!(codes[sym].size >= 1);
  sink.put(u32::from(codes[sym].code), u32::from(codes[sym].size));
}

fn append_adler(dst: &mut [u8], dst_ofs: &mut usize, adler: u32) -> Result<(), Overflow> {
  for byte in adler.to_be_bytes() {
    if *dst_ofs + 1 > dst.len() {
      return Err(Overflow);
    }
    dst[*dst_ofs] = byte;
    *dst_ofs += 1;
  }
  Ok(())
}

#[inline]
fn bump_pixel_freqs_3(freq: &mut [u32; MAX_LIT_SYMS], lits: u32) {
  freq[(lits & 0xFF) as usize] += 1;
  freq[((lits >> 8) & 0xFF) as usize] += 1;
  freq[(lits >> 16) as usize] += 1;
}

#[inline]
fn bump_pixel_freqs_4(freq: &mut [u32; MAX_LIT_SYMS], lits: u32) {
  freq[(lits & 0xFF) as usize] += 1;
  freq[((lits >> 8) & 0xFF) as usize] += 1;
  freq[((lits >> 16) & 0xFF) as usize] += 1;
  freq[(lits >> 24) as usize] += 1;
}

/// Two-pass compression of a 3-channel filtered stream: parse tokens while
/// gathering frequencies, build the tables, then emit.
pub(crate) fn dynamic_deflate_3(
  filtered: &FilteredStream, width: u32, height: u32, dst: &mut [u8],
) -> Result<usize, Overflow> {
  let bpl = 1 + width as usize * 3;
  let mut sink = BitSink::new();
  let mut dst_ofs = 0_usize;

  // zlib header, then BFINAL.
  sink.put(0x78, 8);
  sink.put(0x01, 8);
  sink.put(1, 1);

  let mut codes: Vec<u32> = Vec::with_capacity((width as usize + 1) * height as usize);
  let mut lit_freq = [0_u32; MAX_LIT_SYMS];

  let src = filtered.bytes.as_slice();
  let src_adler32 = adler32(ADLER32_INIT, &src[..filtered.len]);

  let mut src_ofs = 0_usize;
  for _ in 0..height {
    let end_src_ofs = src_ofs + bpl;

    let filter_lit = src[src_ofs];
    src_ofs += 1;
    codes.push(1 | (u32::from(filter_lit) << 8));
    lit_freq[filter_lit as usize] += 1;

    let mut prev_lits = read_le32(src, src_ofs) & 0xFF_FFFF;
    codes.push(prev_lits << 8);
    bump_pixel_freqs_3(&mut lit_freq, prev_lits);
    src_ofs += 3;

    while src_ofs < end_src_ofs {
      let lits = read_le32(src, src_ofs) & 0xFF_FFFF;
      if lits == prev_lits {
        let max_match_len = 255.min(end_src_ofs - src_ofs);
        let mut match_len = 3;
        while match_len < max_match_len && read_le32(src, src_ofs + match_len) & 0xFF_FFFF == lits
        {
          match_len += 3;
        }
        codes.push(match_len as u32 - 1);
        lit_freq[LEN_SYM[match_len - 3] as usize] += 1;
        src_ofs += match_len;
      } else {
        codes.push(lits << 8);
        bump_pixel_freqs_3(&mut lit_freq, lits);
        prev_lits = lits;
        src_ofs += 3;
      }
    }
  }
  debug_assert_eq!(src_ofs, bpl * height as usize);

  lit_freq[256] = 1;
  let mut lit_freq16 = scale_freqs(&lit_freq);
  let mut dist_freq = [0_u16; MAX_DIST_SYMS];
  dist_freq[2] = 1; // distance 3

  let lit = start_dynamic_block(&mut lit_freq16, &dist_freq, dst, &mut dst_ofs, &mut sink)?;

  for &c in codes.iter() {
    match c & 0xFF {
      0 => {
        let lits = c >> 8;
        put_code(&mut sink, &lit, (lits & 0xFF) as usize);
        put_code(&mut sink, &lit, ((lits >> 8) & 0xFF) as usize);
        put_code(&mut sink, &lit, (lits >> 16) as usize);
      }
      1 => {
        put_code(&mut sink, &lit, (c >> 8) as usize);
      }
      tag => {
        let adj_match_len = (tag + 1) as usize - 3;
        put_code(&mut sink, &lit, LEN_SYM[adj_match_len] as usize);
        // The +1 tacks on the distance code, which is a single 0 bit.
        let extra = u32::from(LEN_EXTRA[adj_match_len]);
        sink.put(adj_match_len as u32 & BITMASKS[extra as usize], extra + 1);
      }
    }
    sink.flush(dst, &mut dst_ofs)?;
  }

  put_code(&mut sink, &lit, 256);
  sink.force_flush(dst, &mut dst_ofs)?;
  append_adler(dst, &mut dst_ofs, src_adler32)?;
  Ok(dst_ofs)
}

/// Two-pass compression of a 4-channel filtered stream.
pub(crate) fn dynamic_deflate_4(
  filtered: &FilteredStream, width: u32, height: u32, dst: &mut [u8],
) -> Result<usize, Overflow> {
  let bpl = 1 + width as usize * 4;
  let mut sink = BitSink::new();
  let mut dst_ofs = 0_usize;

  sink.put(0x78, 8);
  sink.put(0x01, 8);
  sink.put(1, 1);

  let mut codes: Vec<u64> = Vec::with_capacity((width as usize + 1) * height as usize);
  let mut lit_freq = [0_u32; MAX_LIT_SYMS];

  let src = filtered.bytes.as_slice();
  let src_adler32 = adler32(ADLER32_INIT, &src[..filtered.len]);

  let mut src_ofs = 0_usize;
  for _ in 0..height {
    let end_src_ofs = src_ofs + bpl;

    let filter_lit = src[src_ofs];
    src_ofs += 1;
    codes.push(1 | (u64::from(filter_lit) << 8));
    lit_freq[filter_lit as usize] += 1;

    let mut prev_lits = read_le32(src, src_ofs);
    codes.push(u64::from(prev_lits) << 8);
    bump_pixel_freqs_4(&mut lit_freq, prev_lits);
    src_ofs += 4;

    while src_ofs < end_src_ofs {
      let lits = read_le32(src, src_ofs);
      if lits == prev_lits {
        let max_match_len = 252.min(end_src_ofs - src_ofs);
        let mut match_len = 4;
        while match_len < max_match_len && read_le32(src, src_ofs + match_len) == lits {
          match_len += 4;
        }
        codes.push(match_len as u64 - 1);
        lit_freq[LEN_SYM[match_len - 3] as usize] += 1;
        src_ofs += match_len;
      } else {
        codes.push(u64::from(lits) << 8);
        bump_pixel_freqs_4(&mut lit_freq, lits);
        prev_lits = lits;
        src_ofs += 4;
      }
    }
  }
  debug_assert_eq!(src_ofs, bpl * height as usize);

  lit_freq[256] = 1;
  let mut lit_freq16 = scale_freqs(&lit_freq);
  let mut dist_freq = [0_u16; MAX_DIST_SYMS];
  dist_freq[3] = 1; // distance 4

  let lit = start_dynamic_block(&mut lit_freq16, &dist_freq, dst, &mut dst_ofs, &mut sink)?;

  for &c in codes.iter() {
    match (c & 0xFF) as u32 {
      0 => {
        let lits = (c >> 8) as u32;
        put_code(&mut sink, &lit, (lits & 0xFF) as usize);
        put_code(&mut sink, &lit, ((lits >> 8) & 0xFF) as usize);
        put_code(&mut sink, &lit, ((lits >> 16) & 0xFF) as usize);
        // Four 12-bit codes could burst the accumulator; drain early.
        if sink.bit_count() >= 49 {
          sink.flush(dst, &mut dst_ofs)?;
        }
        put_code(&mut sink, &lit, (lits >> 24) as usize);
      }
      1 => {
        put_code(&mut sink, &lit, (c >> 8) as usize);
      }
      tag => {
        let adj_match_len = (tag + 1) as usize - 3;
        put_code(&mut sink, &lit, LEN_SYM[adj_match_len] as usize);
        let extra = u32::from(LEN_EXTRA[adj_match_len]);
        sink.put(adj_match_len as u32 & BITMASKS[extra as usize], extra + 1);
      }
    }
    sink.flush(dst, &mut dst_ofs)?;
  }

  put_code(&mut sink, &lit, 256);
  sink.force_flush(dst, &mut dst_ofs)?;
  append_adler(dst, &mut dst_ofs, src_adler32)?;
  Ok(dst_ofs)
}

#[inline]
fn put_pixel_lits<const CHANS: usize>(
  sink: &mut BitSink, codes: &[HuffCode; MAX_LIT_SYMS], lits: u32, dst: &mut [u8],
  dst_ofs: &mut usize,
) -> Result<(), Overflow> {
  put_catalog_code(sink, codes, (lits & 0xFF) as usize);
  put_catalog_code(sink, codes, ((lits >> 8) & 0xFF) as usize);
  if CHANS == 3 {
    put_catalog_code(sink, codes, (lits >> 16) as usize);
  } else {
    put_catalog_code(sink, codes, ((lits >> 16) & 0xFF) as usize);
    if sink.bit_count() >= 49 {
      sink.flush(dst, dst_ofs)?;
    }
    put_catalog_code(sink, codes, (lits >> 24) as usize);
  }
  Ok(())
}

/// One-pass compression: the frozen catalog header goes out verbatim, the
/// bit sink is seeded with the catalog's spare bits, and tokens are coded
/// straight from the frozen table with no frequency pass.
pub(crate) fn one_pass_deflate<const CHANS: usize>(
  filtered: &FilteredStream, width: u32, height: u32, dst: &mut [u8],
) -> Result<usize, Overflow> {
  let catalog = if CHANS == 3 { &CATALOG_3 } else { &CATALOG_4 };
  if dst.len() < catalog.header.len() {
    return Err(Overflow);
  }
  dst[..catalog.header.len()].copy_from_slice(catalog.header);
  let mut dst_ofs = catalog.header.len();
  let mut sink = BitSink::seeded(catalog.spare_bits, catalog.spare_bit_count);
  let codes = catalog.codes;

  let bpl = 1 + width as usize * CHANS;
  let pixel_mask: u32 = if CHANS == 3 { 0xFF_FFFF } else { 0xFFFF_FFFF };
  let match_cap = if CHANS == 3 { 255 } else { 252 };

  let src = filtered.bytes.as_slice();
  let src_adler32 = adler32(ADLER32_INIT, &src[..filtered.len]);

  let mut src_ofs = 0_usize;
  for _ in 0..height {
    let end_src_ofs = src_ofs + bpl;

    let filter_lit = src[src_ofs];
    src_ofs += 1;
    put_catalog_code(&mut sink, codes, filter_lit as usize);
    if CHANS == 4 {
      sink.flush(dst, &mut dst_ofs)?;
    }

    let mut prev_lits = read_le32(src, src_ofs) & pixel_mask;
    put_pixel_lits::<CHANS>(&mut sink, codes, prev_lits, dst, &mut dst_ofs)?;
    src_ofs += CHANS;
    sink.flush(dst, &mut dst_ofs)?;

    while src_ofs < end_src_ofs {
      let lits = read_le32(src, src_ofs) & pixel_mask;
      let mut took_match = false;
      if lits == prev_lits {
        let max_match_len = match_cap.min(end_src_ofs - src_ofs);
        let mut match_len = CHANS;
        while match_len < max_match_len && read_le32(src, src_ofs + match_len) & pixel_mask == lits
        {
          match_len += CHANS;
        }
        let adj_match_len = match_len - 3;
        let match_sym = LEN_SYM[adj_match_len] as usize;
        let match_code_bits = u32::from(codes[match_sym].size);
        let len_extra_bits = u32::from(LEN_EXTRA[adj_match_len]);
        took_match = if CHANS == 4 && match_len == 4 {
          // A stride-length match isn't always cheaper than four literals.
          let lit_bits = u32::from(codes[(lits & 0xFF) as usize].size)
            + u32::from(codes[((lits >> 8) & 0xFF) as usize].size)
            + u32::from(codes[((lits >> 16) & 0xFF) as usize].size)
            + u32::from(codes[(lits >> 24) as usize].size);
          match_code_bits + len_extra_bits + 1 <= lit_bits
        } else {
          true
        };
        if took_match {
          sink.put(u32::from(codes[match_sym].code), match_code_bits);
          sink.put(adj_match_len as u32 & BITMASKS[len_extra_bits as usize], len_extra_bits + 1);
          src_ofs += match_len;
        }
      }
      if !took_match {
        put_pixel_lits::<CHANS>(&mut sink, codes, lits, dst, &mut dst_ofs)?;
        prev_lits = lits;
        src_ofs += CHANS;
      }
      sink.flush(dst, &mut dst_ofs)?;
    }
  }
  debug_assert_eq!(src_ofs, bpl * height as usize);
  debug_assert!(sink.bit_count() <= 7);

  put_catalog_code(&mut sink, codes, 256);
  sink.force_flush(dst, &mut dst_ofs)?;
  append_adler(dst, &mut dst_ofs, src_adler32)?;
  Ok(dst_ofs)
}

/// The can't-fail fallback: a zlib stream of stored (BTYPE 0) blocks.
pub(crate) fn stored_deflate(filtered: &FilteredStream, dst: &mut [u8]) -> Result<usize, Overflow> {
  if dst.len() < 2 {
    return Err(Overflow);
  }
  dst[0] = 0x78;
  dst[1] = 0x01;
  let mut dst_ofs = 2_usize;

  let src = &filtered.bytes[..filtered.len];
  let mut src_ofs = 0_usize;
  while src_ofs < src.len() {
    let block_len = (src.len() - src_ofs).min(usize::from(u16::MAX));
    let final_block = src_ofs + block_len == src.len();
    if dst_ofs + 5 + block_len > dst.len() {
      return Err(Overflow);
    }
    dst[dst_ofs] = u8::from(final_block);
    dst[dst_ofs + 1..dst_ofs + 3].copy_from_slice(&(block_len as u16).to_le_bytes());
    dst[dst_ofs + 3..dst_ofs + 5].copy_from_slice(&(!(block_len as u16)).to_le_bytes());
    dst[dst_ofs + 5..dst_ofs + 5 + block_len].copy_from_slice(&src[src_ofs..src_ofs + block_len]);
    src_ofs += block_len;
    dst_ofs += 5 + block_len;
  }

  append_adler(dst, &mut dst_ofs, adler32(ADLER32_INIT, src))?;
  Ok(dst_ofs)
}
