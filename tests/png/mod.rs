use fleetpng::png::{PngChunkIter, PngChunkTy};
use fleetpng::{decode, encode, get_info, DecodeError, EncodeFlags};

fn slower() -> EncodeFlags {
  EncodeFlags { slower: true, ..Default::default() }
}
fn uncompressed() -> EncodeFlags {
  EncodeFlags { force_uncompressed: true, ..Default::default() }
}

// Deterministic pixel generators shared by the golden-file tests. The files
// under tests/data/ are known-good encodings of exactly these images and pin
// the output format bit for bit, one-pass catalogs included. Regenerate them
// only on a deliberate format change.

fn rgb_grad(w: usize, h: usize) -> Vec<u8> {
  (0..w * h * 3).map(|i| (i * 7) as u8).collect()
}

fn rgb_runs(w: usize, h: usize) -> Vec<u8> {
  let mut v = vec![0; w * h * 3];
  for y in 0..h {
    for x in 0..w {
      let p = &mut v[(y * w + x) * 3..][..3];
      if ((x / 8) + y) % 2 == 0 {
        p.copy_from_slice(&[(y * 9) as u8, 100, 200]);
      } else {
        p.copy_from_slice(&[(x * 3) as u8, (x * 3 + 1) as u8, y as u8]);
      }
    }
  }
  v
}

fn rgba_runs(w: usize, h: usize) -> Vec<u8> {
  let mut v = vec![0; w * h * 4];
  for y in 0..h {
    for x in 0..w {
      let p = &mut v[(y * w + x) * 4..][..4];
      if y % 3 == 0 {
        p.copy_from_slice(&[10, 20, 30, 255]);
      } else {
        p.copy_from_slice(&[(x * 5) as u8, (y * 11) as u8, (x + y) as u8, (255 - (x & 7)) as u8]);
      }
    }
  }
  v
}

fn rgb_const(w: usize, h: usize) -> Vec<u8> {
  core::iter::repeat([77, 88, 99]).take(w * h).flatten().collect()
}

fn expand_alpha(rgb: &[u8]) -> Vec<u8> {
  rgb.chunks_exact(3).flat_map(|p| [p[0], p[1], p[2], 0xFF]).collect()
}

fn drop_alpha(rgba: &[u8]) -> Vec<u8> {
  rgba.chunks_exact(4).flat_map(|p| [p[0], p[1], p[2]]).collect()
}

/// The filter the encoder applies, reimplemented independently: "None" on
/// row 0 (or all rows when `up` is off), byte-wise "Up" below.
fn reference_filter(px: &[u8], w: usize, h: usize, c: usize, up: bool) -> Vec<u8> {
  let bpl = w * c;
  let mut out = Vec::with_capacity((bpl + 1) * h);
  for y in 0..h {
    if y == 0 || !up {
      out.push(0);
      out.extend_from_slice(&px[y * bpl..(y + 1) * bpl]);
    } else {
      out.push(2);
      for i in 0..bpl {
        out.push(px[y * bpl + i].wrapping_sub(px[(y - 1) * bpl + i]));
      }
    }
  }
  out
}

fn adler32(bytes: &[u8]) -> u32 {
  let mut s1: u32 = 1;
  let mut s2: u32 = 0;
  for &b in bytes {
    s1 = (s1 + u32::from(b)) % 65521;
    s2 = (s2 + s1) % 65521;
  }
  (s2 << 16) + s1
}

fn crc32(bytes: impl Iterator<Item = u8>) -> u32 {
  let mut crc = u32::MAX;
  for b in bytes {
    crc ^= u32::from(b);
    for _ in 0..8 {
      crc = if crc & 1 != 0 { 0xEDB88320 ^ (crc >> 1) } else { crc >> 1 };
    }
  }
  crc ^ u32::MAX
}

fn find_chunk(png: &[u8], ty: [u8; 4]) -> Option<usize> {
  let mut ofs = 8;
  while ofs + 12 <= png.len() {
    let len = u32::from_be_bytes(png[ofs..ofs + 4].try_into().unwrap()) as usize;
    if png[ofs + 4..ofs + 8] == ty {
      return Some(ofs);
    }
    ofs += 12 + len;
  }
  None
}

fn chunk_len(png: &[u8], ofs: usize) -> usize {
  u32::from_be_bytes(png[ofs..ofs + 4].try_into().unwrap()) as usize
}

/// Recomputes and stores a chunk's CRC after test surgery on its payload.
fn fix_chunk_crc(png: &mut [u8], ofs: usize) {
  let len = chunk_len(png, ofs);
  let crc = crc32(png[ofs + 4..ofs + 8 + len].iter().copied());
  png[ofs + 8 + len..ofs + 12 + len].copy_from_slice(&crc.to_be_bytes());
}

fn idat_payload(png: &[u8]) -> &[u8] {
  let ofs = find_chunk(png, *b"IDAT").unwrap();
  &png[ofs + 8..ofs + 8 + chunk_len(png, ofs)]
}

// ===== golden files: the output format is pinned byte for byte =====

#[test]
fn test_golden_rgb_gradient() {
  let px = rgb_grad(16, 16);
  let fast = encode(&px, 16, 16, 3, EncodeFlags::default()).unwrap();
  assert_eq!(fast.as_slice(), include_bytes!("../data/rgb_grad_16x16_fast.png").as_slice());
  let slow = encode(&px, 16, 16, 3, slower()).unwrap();
  assert_eq!(slow.as_slice(), include_bytes!("../data/rgb_grad_16x16_slow.png").as_slice());
}

#[test]
fn test_golden_rgb_runs() {
  let px = rgb_runs(32, 16);
  let fast = encode(&px, 32, 16, 3, EncodeFlags::default()).unwrap();
  assert_eq!(fast.as_slice(), include_bytes!("../data/rgb_runs_32x16_fast.png").as_slice());
  let slow = encode(&px, 32, 16, 3, slower()).unwrap();
  assert_eq!(slow.as_slice(), include_bytes!("../data/rgb_runs_32x16_slow.png").as_slice());
}

#[test]
fn test_golden_rgba_runs() {
  let px = rgba_runs(21, 9);
  let fast = encode(&px, 21, 9, 4, EncodeFlags::default()).unwrap();
  assert_eq!(fast.as_slice(), include_bytes!("../data/rgba_runs_21x9_fast.png").as_slice());
  let slow = encode(&px, 21, 9, 4, slower()).unwrap();
  assert_eq!(slow.as_slice(), include_bytes!("../data/rgba_runs_21x9_slow.png").as_slice());
}

#[test]
fn test_golden_rgb_long_runs_hit_the_match_cap() {
  // 200 identical pixels per row is far past the 255-byte match cap.
  let px = rgb_const(200, 3);
  let fast = encode(&px, 200, 3, 3, EncodeFlags::default()).unwrap();
  assert_eq!(fast.as_slice(), include_bytes!("../data/rgb_const_200x3_fast.png").as_slice());
  let slow = encode(&px, 200, 3, 3, slower()).unwrap();
  assert_eq!(slow.as_slice(), include_bytes!("../data/rgb_const_200x3_slow.png").as_slice());
}

#[test]
fn test_golden_uncompressed() {
  let px = rgb_grad(5, 4);
  let raw = encode(&px, 5, 4, 3, uncompressed()).unwrap();
  assert_eq!(raw.as_slice(), include_bytes!("../data/rgb_grad_5x4_uncompressed.png").as_slice());
}

#[test]
fn test_golden_tiny_images_fall_back_to_stored() {
  // The dynamic header alone is bigger than these images' whole filtered
  // streams, so the encoder silently stores them.
  let one = encode(&[0, 0, 0], 1, 1, 3, EncodeFlags::default()).unwrap();
  assert_eq!(one.as_slice(), include_bytes!("../data/rgb_black_1x1.png").as_slice());
  let px = [10, 20, 30, 40, 10, 20, 30, 40];
  let two = encode(&px, 2, 1, 4, EncodeFlags::default()).unwrap();
  assert_eq!(two.as_slice(), include_bytes!("../data/rgba_pair_2x1.png").as_slice());
}

#[test]
fn test_golden_files_decode_back_to_their_pixels() {
  let cases: [(&[u8], Vec<u8>, u32, u32, u32); 5] = [
    (include_bytes!("../data/rgb_grad_16x16_fast.png"), rgb_grad(16, 16), 16, 16, 3),
    (include_bytes!("../data/rgb_runs_32x16_slow.png"), rgb_runs(32, 16), 32, 16, 3),
    (include_bytes!("../data/rgba_runs_21x9_fast.png"), rgba_runs(21, 9), 21, 9, 4),
    (include_bytes!("../data/rgb_const_200x3_slow.png"), rgb_const(200, 3), 200, 3, 3),
    (include_bytes!("../data/rgb_grad_5x4_uncompressed.png"), rgb_grad(5, 4), 5, 4, 3),
  ];
  for (bytes, px, w, h, c) in cases {
    let info = get_info(bytes).unwrap();
    assert_eq!((info.width, info.height, info.channels_in_file), (w, h, c));
    let same = decode(bytes, c).unwrap();
    assert_eq!(same.pixels, px, "{w}x{h}x{c} same-channel decode");
    // and through the channel converter both ways
    if c == 3 {
      assert_eq!(decode(bytes, 4).unwrap().pixels, expand_alpha(&px));
    } else {
      assert_eq!(decode(bytes, 3).unwrap().pixels, drop_alpha(&px));
    }
  }
}

// ===== round trips =====

#[test]
fn test_round_trip_random_images() {
  let flag_sets =
    [EncodeFlags::default(), slower(), uncompressed()];
  for &(w, h) in &[(1_u32, 1_u32), (2, 1), (1, 2), (3, 3), (16, 16), (37, 11), (1, 257)] {
    for channels in [3_u32, 4] {
      let px = super::rand_bytes((w * h * channels) as usize);
      for flags in flag_sets {
        let png = encode(&px, w, h, channels, flags).unwrap();
        let back = decode(&png, channels).unwrap();
        assert_eq!(back.pixels, px, "{w}x{h}x{channels} {flags:?}");
        assert_eq!((back.width, back.height, back.channels_in_file), (w, h, channels));
      }
    }
  }
}

#[test]
fn test_round_trip_rle_heavy_images() {
  // Constant images maximize match tokens; also stresses the 4-channel
  // match cap (252 bytes) on a 100-pixel-wide row.
  let rgba: Vec<u8> = std::iter::repeat([1, 2, 3, 4]).take(100 * 7).flatten().collect();
  for flags in [EncodeFlags::default(), slower()] {
    let png = encode(&rgba, 100, 7, 4, flags).unwrap();
    assert_eq!(decode(&png, 4).unwrap().pixels, rgba);
  }
  let rgb = rgb_const(301, 5);
  for flags in [EncodeFlags::default(), slower()] {
    let png = encode(&rgb, 301, 5, 3, flags).unwrap();
    assert_eq!(decode(&png, 3).unwrap().pixels, rgb);
  }
}

#[test]
fn test_round_trip_cross_channel() {
  let rgb = rgb_runs(19, 8);
  let png = encode(&rgb, 19, 8, 3, EncodeFlags::default()).unwrap();
  let up = decode(&png, 4).unwrap();
  assert_eq!(up.channels_in_file, 3);
  assert_eq!(up.pixels, expand_alpha(&rgb));

  let rgba = rgba_runs(19, 8);
  let png = encode(&rgba, 19, 8, 4, slower()).unwrap();
  let down = decode(&png, 3).unwrap();
  assert_eq!(down.channels_in_file, 4);
  assert_eq!(down.pixels, drop_alpha(&rgba));
}

#[test]
fn test_round_trip_multi_block_stored_stream() {
  // A filtered stream over 65535 bytes forces more than one stored block.
  let px = super::rand_bytes(300 * 80 * 3);
  let png = encode(&px, 300, 80, 3, uncompressed()).unwrap();
  assert_eq!(decode(&png, 3).unwrap().pixels, px);
}

#[test]
fn test_typed_pixel_helpers() {
  use pixel_formats::r8g8b8a8_Srgb;
  let px: Vec<r8g8b8a8_Srgb> =
    (0..12_u8).map(|i| r8g8b8a8_Srgb { r: i, g: i + 1, b: i + 2, a: 255 }).collect();
  let png = fleetpng::encode_rgba8(&px, 4, 3, EncodeFlags::default()).unwrap();
  let (back, w, h) = fleetpng::decode_rgba8(&png).unwrap();
  assert_eq!((w, h), (4, 3));
  assert_eq!(back, px);
  let (rgb, ..) = fleetpng::decode_rgb8(&png).unwrap();
  assert_eq!(rgb[1].g, px[1].g);
}

// ===== conformance: an independent inflate agrees =====

#[test]
fn test_idat_is_valid_zlib_of_the_filtered_stream() {
  let cases: [(Vec<u8>, u32, u32, u32, EncodeFlags, bool); 5] = [
    (rgb_grad(16, 16), 16, 16, 3, EncodeFlags::default(), true),
    (rgb_runs(32, 16), 32, 16, 3, slower(), true),
    (rgba_runs(21, 9), 21, 9, 4, EncodeFlags::default(), true),
    (rgba_runs(21, 9), 21, 9, 4, slower(), true),
    (rgb_grad(5, 4), 5, 4, 3, uncompressed(), false),
  ];
  for (px, w, h, c, flags, up) in cases {
    let png = encode(&px, w, h, c, flags).unwrap();
    let z = idat_payload(&png);
    assert_eq!(&z[..2], &[0x78, 0x01], "zlib header");
    let inflated = miniz_oxide::inflate::decompress_to_vec_zlib(z)
      .expect("a third-party inflate must accept our stream");
    let expected = reference_filter(&px, w as usize, h as usize, c as usize, up);
    assert_eq!(inflated, expected, "{w}x{h}x{c} {flags:?}");
    // The stream's trailer is the Adler-32 of that filtered data.
    let tail = u32::from_be_bytes(z[z.len() - 4..].try_into().unwrap());
    assert_eq!(tail, adler32(&expected));
  }
}

// ===== envelope invariants =====

#[test]
fn test_envelope_chunk_layout_and_crcs() {
  let px = rgba_runs(9, 5);
  let png = encode(&px, 9, 5, 4, EncodeFlags::default()).unwrap();
  assert_eq!(&png[..8], &[137, 80, 78, 71, 13, 10, 26, 10]);

  let types: Vec<PngChunkTy> = PngChunkIter::from(&png[8..]).map(|c| c.ty()).collect();
  assert_eq!(
    types,
    [PngChunkTy::IHDR, PngChunkTy::fdEC, PngChunkTy::IDAT, PngChunkTy::IEND]
  );
  for chunk in PngChunkIter::from(&png[8..]) {
    assert_eq!(chunk.compute_actual_crc(), chunk.declared_crc(), "{:?}", chunk.ty());
  }
  let fdec = find_chunk(&png, *b"fdEC").unwrap();
  assert_eq!(&png[fdec..fdec + 12 + 5], &[
    0, 0, 0, 5, b'f', b'd', b'E', b'C', 82, 36, 147, 227, 0, 0xE5, 0xAB, 0x62, 0x99
  ]);
  // nothing after IEND
  let iend = find_chunk(&png, *b"IEND").unwrap();
  assert_eq!(iend + 12, png.len());
}

#[test]
fn test_spec_scenario_tiny_files() {
  // 1x1 RGB black round-trips and reports its shape without decoding.
  let png = encode(&[0, 0, 0], 1, 1, 3, EncodeFlags::default()).unwrap();
  let info = get_info(&png).unwrap();
  assert_eq!((info.width, info.height, info.channels_in_file), (1, 1, 3));
  assert_eq!(decode(&png, 3).unwrap().pixels, vec![0, 0, 0]);

  // 2x1 RGBA with two identical pixels: one literal pixel, one RLE match.
  let px = [10, 20, 30, 40, 10, 20, 30, 40];
  let png = encode(&px, 2, 1, 4, slower()).unwrap();
  assert_eq!(decode(&png, 4).unwrap().pixels, px);

  // 4x2 RGB, both rows four copies of (1,2,3).
  let row = [1_u8, 2, 3, 1, 2, 3, 1, 2, 3, 1, 2, 3];
  let mut px = Vec::new();
  px.extend_from_slice(&row);
  px.extend_from_slice(&row);
  for flags in [EncodeFlags::default(), slower()] {
    let png = encode(&px, 4, 2, 3, flags).unwrap();
    assert_eq!(decode(&png, 3).unwrap().pixels, px);
  }
}

// ===== argument and envelope rejection =====

#[test]
fn test_encode_argument_validation() {
  use fleetpng::EncodeError;
  let px = [0_u8; 12];
  assert_eq!(encode(&px, 0, 1, 3, EncodeFlags::default()), Err(EncodeError::BadDimensions));
  assert_eq!(encode(&px, 1, 0, 3, EncodeFlags::default()), Err(EncodeError::BadDimensions));
  assert_eq!(
    encode(&px, 1 << 25, 1, 3, EncodeFlags::default()),
    Err(EncodeError::BadDimensions)
  );
  assert_eq!(encode(&px, 2, 2, 2, EncodeFlags::default()), Err(EncodeError::BadChannelCount));
  assert_eq!(encode(&px, 2, 2, 4, EncodeFlags::default()), Err(EncodeError::WrongBufferLength));
}

#[test]
fn test_decode_argument_validation() {
  let png = encode(&[1, 2, 3], 1, 1, 3, EncodeFlags::default()).unwrap();
  assert_eq!(decode(&png, 2), Err(DecodeError::InvalidArg));
  assert_eq!(decode(&png, 5), Err(DecodeError::InvalidArg));
  assert_eq!(decode(&[], 3), Err(DecodeError::InvalidArg));
}

#[test]
fn test_not_png_rejections() {
  assert_eq!(get_info(b"not a png at all, sorry"), Err(DecodeError::NotPng));
  let mut png = encode(&rgb_grad(4, 4), 4, 4, 3, EncodeFlags::default()).unwrap();
  png[1] = b'Q';
  assert_eq!(get_info(&png), Err(DecodeError::NotPng));

  // Truncation anywhere inside the chunk stream is NotPng.
  let png = encode(&rgb_grad(4, 4), 4, 4, 3, EncodeFlags::default()).unwrap();
  assert_eq!(get_info(&png[..png.len() - 13]), Err(DecodeError::NotPng));

  // A corrupted IHDR payload fails its CRC check and is NotPng too.
  let mut png = encode(&rgb_grad(4, 4), 4, 4, 3, EncodeFlags::default()).unwrap();
  png[16] ^= 0x40;
  assert_eq!(get_info(&png), Err(DecodeError::NotPng));
}

#[test]
fn test_ancillary_crc_mismatch_is_its_own_error() {
  let mut png = encode(&rgb_grad(4, 4), 4, 4, 3, EncodeFlags::default()).unwrap();
  let fdec = find_chunk(&png, *b"fdEC").unwrap();
  png[fdec + 8 + 5] ^= 1; // fdEC's stored CRC
  assert_eq!(get_info(&png), Err(DecodeError::HeaderCrc32Mismatch));
}

#[test]
fn test_mutated_marker_is_not_ours() {
  let mut png = encode(&rgb_grad(4, 4), 4, 4, 3, EncodeFlags::default()).unwrap();
  let fdec = find_chunk(&png, *b"fdEC").unwrap();
  png[fdec + 8] ^= 0xFF; // first magic byte
  fix_chunk_crc(&mut png, fdec);
  assert_eq!(get_info(&png), Err(DecodeError::NotOurPng));

  // Wrong marker version: same verdict.
  let mut png = encode(&rgb_grad(4, 4), 4, 4, 3, EncodeFlags::default()).unwrap();
  png[fdec + 12] = 1;
  fix_chunk_crc(&mut png, fdec);
  assert_eq!(get_info(&png), Err(DecodeError::NotOurPng));
}

#[test]
fn test_second_idat_is_not_ours() {
  let png = encode(&rgb_grad(4, 4), 4, 4, 3, EncodeFlags::default()).unwrap();
  let idat = find_chunk(&png, *b"IDAT").unwrap();
  let idat_total = 12 + chunk_len(&png, idat);
  let mut doubled = Vec::new();
  doubled.extend_from_slice(&png[..idat + idat_total]);
  doubled.extend_from_slice(&png[idat..idat + idat_total]);
  doubled.extend_from_slice(&png[idat + idat_total..]);
  assert_eq!(get_info(&doubled), Err(DecodeError::NotOurPng));
}

#[test]
fn test_unknown_critical_chunk_is_not_ours() {
  let png = encode(&rgb_grad(4, 4), 4, 4, 3, EncodeFlags::default()).unwrap();
  let idat = find_chunk(&png, *b"IDAT").unwrap();
  let mut plte = vec![0, 0, 0, 3];
  plte.extend_from_slice(b"PLTE");
  plte.extend_from_slice(&[1, 2, 3]);
  plte.extend_from_slice(&crc32(b"PLTE".iter().copied().chain([1, 2, 3])).to_be_bytes());
  let mut patched = Vec::new();
  patched.extend_from_slice(&png[..idat]);
  patched.extend_from_slice(&plte);
  patched.extend_from_slice(&png[idat..]);
  assert_eq!(get_info(&patched), Err(DecodeError::NotOurPng));

  // An unknown *ancillary* chunk with a good CRC is fine by the envelope.
  let mut text = vec![0, 0, 0, 2];
  text.extend_from_slice(b"teXt");
  text.extend_from_slice(&[65, 66]);
  text.extend_from_slice(&crc32(b"teXt".iter().copied().chain([65, 66])).to_be_bytes());
  let mut patched = Vec::new();
  patched.extend_from_slice(&png[..idat]);
  patched.extend_from_slice(&text);
  patched.extend_from_slice(&png[idat..]);
  assert!(get_info(&patched).is_ok());
  assert!(decode(&patched, 3).is_ok());
}

#[test]
fn test_missing_marker_is_not_ours() {
  let png = encode(&rgb_grad(4, 4), 4, 4, 3, EncodeFlags::default()).unwrap();
  let fdec = find_chunk(&png, *b"fdEC").unwrap();
  let mut stripped = Vec::new();
  stripped.extend_from_slice(&png[..fdec]);
  stripped.extend_from_slice(&png[fdec + 17..]);
  assert_eq!(get_info(&stripped), Err(DecodeError::NotOurPng));
}

#[test]
fn test_foreign_stream_shapes_are_not_ours() {
  // Clearing BFINAL, or switching the block to fixed-Huffman, makes a
  // stream our encoder would never emit. The IDAT CRC is deliberately not
  // checked, so no CRC surgery is needed.
  let base = encode(&rgb_grad(8, 8), 8, 8, 3, EncodeFlags::default()).unwrap();
  let idat = find_chunk(&base, *b"IDAT").unwrap();
  let first_block_byte = idat + 8 + 2;

  let mut png = base.clone();
  png[first_block_byte] &= !1;
  assert_eq!(decode(&png, 3), Err(DecodeError::NotOurPng));

  let mut png = base.clone();
  png[first_block_byte] = (png[first_block_byte] & !0b110) | 0b010;
  assert_eq!(decode(&png, 3), Err(DecodeError::NotOurPng));
}

#[test]
fn test_stored_stream_with_wrong_filter_is_not_ours() {
  let base = encode(&rgb_grad(5, 4), 5, 4, 3, uncompressed()).unwrap();
  let idat = find_chunk(&base, *b"IDAT").unwrap();
  // zlib header (2) + stored block header (5), then the first filter byte.
  let mut png = base.clone();
  png[idat + 8 + 7] = 1;
  assert_eq!(decode(&png, 3), Err(DecodeError::NotOurPng));
}

// ===== stability =====

#[test]
fn test_bit_flips_never_panic() {
  let base = encode(&rgba_runs(13, 7), 13, 7, 4, EncodeFlags::default()).unwrap();
  let noise = super::rand_bytes(512 * 3);
  for chunk in noise.chunks_exact(3) {
    let mut png = base.clone();
    let at = (u32::from_le_bytes([chunk[0], chunk[1], 0, 0]) as usize) % png.len();
    png[at] ^= 1 << (chunk[2] & 7);
    // Any result is acceptable; panicking or hanging is not.
    let _ = get_info(&png);
    let _ = decode(&png, 3);
    let _ = decode(&png, 4);
  }
}

#[test]
fn test_random_garbage_never_panics() {
  for len in [0_usize, 1, 7, 8, 57, 58, 64, 333, 4096] {
    let bytes = super::rand_bytes(len);
    let _ = get_info(&bytes);
    let _ = decode(&bytes, 3);
  }
  // Garbage wearing a real signature and IHDR still has to fail cleanly.
  let good = encode(&rgb_grad(4, 4), 4, 4, 3, EncodeFlags::default()).unwrap();
  let mut franken = good[..33].to_vec();
  franken.extend_from_slice(&super::rand_bytes(200));
  let _ = get_info(&franken);
  let _ = decode(&franken, 4);
}
