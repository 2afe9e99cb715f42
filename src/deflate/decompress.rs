//! Decompresses the restricted DEFLATE stream straight into pixels.
//!
//! The decoder leans on every restriction the encoder imposed: one dynamic
//! block, 12-bit literal codes, one distance symbol, matches that never
//! cross a scanline. That lets it run a single-level 12-bit table (with a
//! second symbol chained into the upper entry half when it fits) and fuse
//! the inverse "Up" filter into token emission, so there is no intermediate
//! scanline buffer at all. Anything that doesn't fit the mold is an error;
//! the caller maps every error here to "not our PNG".

use super::*;
use crate::bit_source::BitSource;

pub(crate) const TABLE_BITS: u32 = 12;
pub(crate) const TABLE_SIZE: usize = 1 << TABLE_BITS;

/// Table entries: low 9 bits symbol, 4 bits code length, then 9 + 4 more for
/// the optional chained second symbol. Chained length 0 means "no chain".
const SYM_MASK: u32 = 511;

#[inline]
#[must_use]
fn read_entry(bs: &BitSource<'_>, table: &[u32; TABLE_SIZE]) -> u32 {
  debug_assert!(bs.bit_count() >= TABLE_BITS);
  table[bs.peek_bits(TABLE_BITS) as usize]
}

/// Builds the single-level lookup table for one alphabet. Code lengths must
/// already be 12 or less; short codes fill every table slot they prefix.
fn build_decoder_table(code_sizes: &[u8], table: &mut [u32; TABLE_SIZE]) -> Option<()> {
  let mut num_codes = [0_u32; 16];
  for &s in code_sizes {
    num_codes[s as usize] += 1;
  }

  let mut next_code = [0_u32; 17];
  let mut total = 0_u32;
  for i in 1..=15 {
    total = (total + num_codes[i]) << 1;
    next_code[i + 1] = total;
  }
  if total != 0x10000 {
    // An incomplete code is only legal when exactly one symbol is coded.
    let mut coded = 0_u32;
    for i in (1..=15).rev() {
      coded += num_codes[i];
      if coded > 1 {
        return None;
      }
    }
    if coded != 1 {
      return None;
    }
  }

  let mut codes = [0_u32; MAX_LIT_SYMS];
  for (code, &size) in codes.iter_mut().zip(code_sizes) {
    *code = next_code[size as usize];
    next_code[size as usize] += 1;
  }

  table.fill(0);
  for (i, &size) in code_sizes.iter().enumerate() {
    if size == 0 {
      continue;
    }
    let mut msb_code = codes[i];
    let mut lsb_code = 0_usize;
    for _ in 0..size {
      lsb_code = (lsb_code << 1) | (msb_code & 1) as usize;
      msb_code >>= 1;
    }
    let step = 1_usize << size;
    let mut slot = lsb_code;
    while slot < TABLE_SIZE {
      table[slot] = (i as u32) | (u32::from(size) << 9);
      slot += step;
    }
  }
  Some(())
}

/// Parses the dynamic-block header and fills in the literal/length table,
/// chained entries included. Rejects anything our encoder can't have made:
/// HDIST other than `channels`, any code longer than 12 bits, a distance
/// alphabet that isn't exactly one length-1 code at the stride's symbol.
fn prepare_dynamic_block(
  bs: &mut BitSource<'_>, lit_table: &mut [u32; TABLE_SIZE], channels: usize,
) -> Option<()> {
  let num_lit_codes = bs.get_bits(5)? as usize + 257;
  let num_dist_codes = bs.get_bits(5)? as usize + 1;
  if num_dist_codes != channels {
    return None;
  }
  let total_codes = num_lit_codes + num_dist_codes;
  let mut code_sizes = [0_u8; MAX_LIT_SYMS + MAX_DIST_SYMS];

  let num_clen_codes = bs.get_bits(4)? as usize + 4;
  let mut clen_sizes = [0_u8; MAX_CLEN_SYMS];
  for i in 0..num_clen_codes {
    clen_sizes[CLEN_SWIZZLE[i]] = bs.get_bits(3)? as u8;
  }
  let mut clen_table = [0_u32; TABLE_SIZE];
  build_decoder_table(&clen_sizes, &mut clen_table)?;

  let mut min_code_size = 15_u32;
  let mut cur_code = 0_usize;
  while cur_code < total_codes {
    let entry = read_entry(bs, &clen_table);
    let entry_len = (entry >> 9) & 15;
    if entry_len == 0 {
      return None;
    }
    bs.skip_bits(entry_len)?;
    let sym = (entry & SYM_MASK) as usize;

    if sym <= 15 {
      // Longer than the table is indexed by: whatever this is, we didn't
      // write it.
      if sym > TABLE_BITS as usize {
        return None;
      }
      if sym != 0 {
        min_code_size = min_code_size.min(sym as u32);
      }
      code_sizes[cur_code] = sym as u8;
      cur_code += 1;
      continue;
    }

    let (rep_len, rep_code_size) = match sym {
      16 => {
        let rep = bs.get_bits(2)? as usize + 3;
        if cur_code == 0 {
          return None;
        }
        (rep, code_sizes[cur_code - 1])
      }
      17 => (bs.get_bits(3)? as usize + 3, 0),
      _ => (bs.get_bits(7)? as usize + 11, 0),
    };
    if cur_code + rep_len > total_codes {
      return None;
    }
    for _ in 0..rep_len {
      code_sizes[cur_code] = rep_code_size;
      cur_code += 1;
    }
  }

  let total_valid_distcodes: u32 =
    code_sizes[num_lit_codes..num_lit_codes + num_dist_codes].iter().map(|&s| u32::from(s)).sum();
  if total_valid_distcodes != 1 {
    return None;
  }
  if code_sizes[num_lit_codes + (channels - 1)] != 1 {
    return None;
  }

  build_decoder_table(&code_sizes[..num_lit_codes], lit_table)?;

  // Chain a second symbol into each entry whose code leaves enough spare
  // bits for the shortest code to follow. The hot loop then shifts two
  // literals out of one probe.
  for i in 0..TABLE_SIZE {
    let entry = lit_table[i];
    if entry & 256 != 0 {
      continue;
    }
    let sym_bits = (entry >> 9) & 15;
    if sym_bits == 0 {
      continue;
    }
    debug_assert!(sym_bits <= TABLE_BITS);
    let bits_left = TABLE_BITS - sym_bits;
    if bits_left < min_code_size {
      continue;
    }
    let next_entry = lit_table[i >> sym_bits];
    let next_sym = next_entry & SYM_MASK;
    let next_sym_bits = (next_entry >> 9) & 15;
    if next_sym_bits == 0 || bits_left < next_sym_bits {
      continue;
    }
    lit_table[i] |= (next_sym << 16) | (next_sym_bits << (16 + 9));
  }
  Some(())
}

#[inline]
fn write_pixel<const SRC: usize, const DST: usize>(
  dst: &mut [u8], cur: usize, prev: Option<usize>, lits: [u32; 4],
) {
  match prev {
    Some(p) => {
      dst[cur] = dst[p].wrapping_add(lits[0] as u8);
      dst[cur + 1] = dst[p + 1].wrapping_add(lits[1] as u8);
      dst[cur + 2] = dst[p + 2].wrapping_add(lits[2] as u8);
      if DST == 4 {
        dst[cur + 3] = if SRC == 4 { dst[p + 3].wrapping_add(lits[3] as u8) } else { 0xFF };
      }
    }
    None => {
      dst[cur] = lits[0] as u8;
      dst[cur + 1] = lits[1] as u8;
      dst[cur + 2] = lits[2] as u8;
      if DST == 4 {
        dst[cur + 3] = if SRC == 4 { lits[3] as u8 } else { 0xFF };
      }
    }
  }
}

/// Decompresses one whole zlib stream (dynamic-block or stored) into the
/// pixel buffer, converting between 3 and 4 channels on the fly.
///
/// `zlib` runs from the start of the IDAT payload to the end of the file, so
/// the bit reader's 32-bit refills can run past the payload; `zlib_len` is
/// the payload length proper and anchors the end-position check.
pub(crate) fn inflate_pixels<const SRC: usize, const DST: usize>(
  zlib: &[u8], zlib_len: usize, dst: &mut [u8], width: u32, height: u32,
) -> Option<()> {
  let dst_bpl = width as usize * DST;

  if zlib_len < 7 || zlib.len() < zlib_len + 4 {
    return None;
  }
  if zlib[0] != 0x78 || zlib[1] != 0x01 {
    return None;
  }
  if zlib[2] & 6 == 0 {
    return inflate_stored::<SRC, DST>(zlib, zlib_len, dst, width, height);
  }

  let mut bs = BitSource::new(zlib, 2)?;
  let bfinal = bs.get_bits(1)?;
  let btype = bs.get_bits(2)?;
  if bfinal != 1 || btype != 2 {
    return None;
  }

  let mut lit_table = [0_u32; TABLE_SIZE];
  prepare_dynamic_block(&mut bs, &mut lit_table, SRC)?;

  let mut row_start = 0_usize;
  for y in 0..height {
    // Every scanline opens with its filter byte as a plain literal.
    let filter_entry = read_entry(&bs, &lit_table);
    let filter_len = (filter_entry >> 9) & 15;
    if filter_len == 0 {
      return None;
    }
    bs.skip_bits(filter_len)?;
    let expected_filter = if y > 0 { 2 } else { 0 };
    if filter_entry & SYM_MASK != expected_filter {
      return None;
    }

    let prev_start = if y > 0 { Some(row_start - dst_bpl) } else { None };
    let mut x_ofs = 0_usize;
    let mut prev_delta = [0_u8; 4];
    while x_ofs < dst_bpl {
      let entry0 = read_entry(&bs, &lit_table);
      let lit0_len = (entry0 >> 9) & 15;
      if lit0_len == 0 {
        return None;
      }
      bs.skip_bits(lit0_len)?;

      if entry0 & 256 != 0 {
        let sym = entry0 & SYM_MASK;
        // EOB with pixels still owed is malformed.
        if sym == 256 {
          return None;
        }
        let mut run_len = usize::from(LENGTH_BASE[(sym - 257) as usize]);
        if sym >= 265 {
          let extra = bs.get_bits_no_refill(u32::from(LENGTH_EXTRA[(sym - 257) as usize]));
          run_len += extra as usize;
        }
        // The lone distance code is a single 0 bit.
        bs.skip_bits_no_refill(1);

        // Matches replicate whole pixels of the stride, nothing else.
        if run_len % SRC != 0 || run_len == 0 {
          return None;
        }
        let x_ofs_end = x_ofs + run_len / SRC * DST;
        // Matches cannot cross scanlines.
        if x_ofs_end > dst_bpl {
          return None;
        }

        match prev_start {
          Some(p) => {
            if prev_delta[..SRC].iter().all(|&d| d == 0) {
              // The run repeats the previous scanline exactly, and that row
              // is already in output format.
              dst.copy_within(p + x_ofs..p + x_ofs_end, row_start + x_ofs);
              x_ofs = x_ofs_end;
            } else {
              while x_ofs < x_ofs_end {
                write_pixel::<SRC, DST>(
                  dst,
                  row_start + x_ofs,
                  Some(p + x_ofs),
                  [
                    u32::from(prev_delta[0]),
                    u32::from(prev_delta[1]),
                    u32::from(prev_delta[2]),
                    u32::from(prev_delta[3]),
                  ],
                );
                x_ofs += DST;
              }
            }
          }
          None => {
            while x_ofs < x_ofs_end {
              write_pixel::<SRC, DST>(
                dst,
                row_start + x_ofs,
                None,
                [
                  u32::from(prev_delta[0]),
                  u32::from(prev_delta[1]),
                  u32::from(prev_delta[2]),
                  u32::from(prev_delta[3]),
                ],
              );
              x_ofs += DST;
            }
          }
        }
        continue;
      }

      // Literal path: assemble one pixel, using chained entries when the
      // table probe already knows the following symbol.
      let lit0 = entry0 & 255;
      let lit1: u32;
      let mut lit2: u32;
      let lit2_len: u32;

      let lit1_chained_len = entry0 >> (16 + 9);
      if lit1_chained_len != 0 {
        lit1 = (entry0 >> 16) & SYM_MASK;
        bs.skip_bits_no_refill(lit1_chained_len);
        lit2 = read_entry(&bs, &lit_table);
        lit2_len = (lit2 >> 9) & 15;
        if lit2_len == 0 {
          return None;
        }
      } else {
        let entry1 = read_entry(&bs, &lit_table);
        let lit1_len = (entry1 >> 9) & 15;
        if lit1_len == 0 {
          return None;
        }
        bs.skip_bits_no_refill(lit1_len);
        lit1 = entry1 & SYM_MASK;
        let chained = entry1 >> (16 + 9);
        if chained != 0 {
          lit2 = entry1 >> 16;
          lit2_len = chained;
        } else {
          lit2 = read_entry(&bs, &lit_table);
          lit2_len = (lit2 >> 9) & 15;
          if lit2_len == 0 {
            return None;
          }
        }
      }

      if SRC == 3 {
        bs.skip_bits(lit2_len)?;
        if (lit1 | lit2) & 256 != 0 {
          return None;
        }
        write_pixel::<SRC, DST>(dst, row_start + x_ofs, prev_start.map(|p| p + x_ofs), [
          lit0, lit1, lit2, 0,
        ]);
        x_ofs += DST;
        prev_delta = [lit0 as u8, lit1 as u8, lit2 as u8, 0];

        // When the probe for lit2 chained another literal we can often put
        // down a whole second pixel without touching the table again.
        let spec_len = lit2 >> (16 + 9);
        if spec_len != 0 && x_ofs < dst_bpl {
          let next0 = (lit2 >> 16) & SYM_MASK;
          if next0 < 256 {
            bs.skip_bits_no_refill(spec_len);
            let entry1 = read_entry(&bs, &lit_table);
            let next1_len = (entry1 >> 9) & 15;
            if next1_len == 0 {
              return None;
            }
            bs.skip_bits(next1_len)?;
            let next1 = entry1 & SYM_MASK;
            let mut next2: u32;
            let next2_len: u32;
            let chained = entry1 >> (16 + 9);
            if chained != 0 {
              next2 = entry1 >> 16;
              next2_len = chained;
            } else {
              next2 = read_entry(&bs, &lit_table);
              next2_len = (next2 >> 9) & 15;
              if next2_len == 0 {
                return None;
              }
            }
            bs.skip_bits_no_refill(next2_len);
            if (next1 | next2) & 256 != 0 {
              return None;
            }
            next2 &= 255;
            write_pixel::<SRC, DST>(dst, row_start + x_ofs, prev_start.map(|p| p + x_ofs), [
              next0, next1, next2, 0,
            ]);
            x_ofs += DST;
            prev_delta = [next0 as u8, next1 as u8, next2 as u8, 0];
          }
        }
      } else {
        // Four channels: one more literal, then the same checks.
        let lit3: u32;
        let lit3_len = lit2 >> (16 + 9);
        if lit3_len != 0 {
          lit3 = lit2 >> 16;
          bs.skip_bits(lit2_len + lit3_len)?;
        } else {
          bs.skip_bits(lit2_len)?;
          let entry3 = read_entry(&bs, &lit_table);
          let entry3_len = (entry3 >> 9) & 15;
          if entry3_len == 0 {
            return None;
          }
          bs.skip_bits_no_refill(entry3_len);
          lit3 = entry3 & SYM_MASK;
        }
        if (lit1 | lit2 | lit3) & 256 != 0 {
          return None;
        }
        lit2 &= 255;
        let lit3 = lit3 & 255;
        write_pixel::<SRC, DST>(dst, row_start + x_ofs, prev_start.map(|p| p + x_ofs), [
          lit0, lit1, lit2, lit3,
        ]);
        x_ofs += DST;
        prev_delta = [lit0 as u8, lit1 as u8, lit2 as u8, lit3 as u8];
      }
    }

    row_start += dst_bpl;
  }

  // The stream must end with end-of-block, then pad bits to the next byte
  // boundary, then exactly the four Adler-32 bytes.
  let entry = read_entry(&bs, &lit_table);
  let entry_len = (entry >> 9) & 15;
  if entry_len == 0 {
    return None;
  }
  if entry & SYM_MASK != 256 {
    return None;
  }
  bs.skip_bits_no_refill(entry_len);
  let align_bits = bs.bit_count() & 7;
  bs.skip_bits_no_refill(align_bits);

  let lookahead_bytes = (bs.bit_count() >> 3) as usize;
  if bs.byte_ofs() < lookahead_bytes {
    return None;
  }
  let end_ofs = bs.byte_ofs() - lookahead_bytes;
  if end_ofs + 4 != zlib_len {
    return None;
  }
  Some(())
}

/// Decodes the stored-block fallback stream. Every filter byte must be 0;
/// channel conversion happens in the same pass.
fn inflate_stored<const SRC: usize, const DST: usize>(
  zlib: &[u8], zlib_len: usize, dst: &mut [u8], width: u32, height: u32,
) -> Option<()> {
  let src_bpl = width as usize * SRC;
  let dst_bpl = width as usize * DST;
  let dst_len = dst_bpl * height as usize;

  let mut src_ofs = 2_usize;
  let mut dst_ofs = 0_usize;
  let mut raster_ofs = 0_usize;
  let mut comp_ofs = 0_usize;

  loop {
    if src_ofs + 1 > zlib.len() {
      return None;
    }
    let bfinal = zlib[src_ofs] & 1 != 0;
    let btype = (zlib[src_ofs] >> 1) & 3;
    if btype != 0 {
      return None;
    }
    src_ofs += 1;

    if src_ofs + 4 > zlib.len() {
      return None;
    }
    let len = u16::from_le_bytes(zlib[src_ofs..src_ofs + 2].try_into().unwrap());
    let nlen = u16::from_le_bytes(zlib[src_ofs + 2..src_ofs + 4].try_into().unwrap());
    src_ofs += 4;
    if len != !nlen {
      return None;
    }
    let len = usize::from(len);
    if src_ofs + len > zlib.len() {
      return None;
    }

    for &c in zlib[src_ofs..src_ofs + len].iter() {
      if raster_ofs == 0 {
        // The fallback encoder never picks any filter but "None".
        if c != 0 {
          return None;
        }
        debug_assert_eq!(comp_ofs, 0);
      } else {
        if comp_ofs < DST {
          if dst_ofs == dst_len {
            return None;
          }
          dst[dst_ofs] = c;
          dst_ofs += 1;
        }
        comp_ofs += 1;
        if comp_ofs == SRC {
          if DST > SRC {
            if dst_ofs == dst_len {
              return None;
            }
            dst[dst_ofs] = 0xFF;
            dst_ofs += 1;
          }
          comp_ofs = 0;
        }
      }
      raster_ofs += 1;
      if raster_ofs == src_bpl + 1 {
        debug_assert_eq!(comp_ofs, 0);
        raster_ofs = 0;
      }
    }
    src_ofs += len;

    if bfinal {
      break;
    }
  }

  if comp_ofs != 0 {
    return None;
  }
  // The Adler-32 trailer is all that may remain.
  if src_ofs + 4 != zlib_len {
    return None;
  }
  if dst_ofs == dst_len {
    Some(())
  } else {
    None
  }
}
