//! Builds the complete PNG file around the compressed stream.

use crate::crc32::png_crc;
use crate::deflate::{
  dynamic_deflate_3, dynamic_deflate_4, one_pass_deflate, stored_deflate,
};
use crate::filtering::{filter_none, filter_up};
use crate::png::fdec::FDEC_PAYLOAD;
use crate::png::ihdr::{color_type_for_channels, MAX_DIMENSION};
use crate::{EncodeError, EncodeFlags};
use alloc::vec::Vec;

pub(crate) const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// Bytes reserved ahead of the zlib stream: signature (8), IHDR (25), the
/// marker chunk (17), and the IDAT length + type prefix (8).
const HEADER_SIZE: usize = 58;

/// IDAT CRC placeholder (4 bytes, back-patched) followed by the fixed,
/// empty IEND chunk.
const FILE_SUFFIX: [u8; 16] =
  [0, 0, 0, 0, 0, 0, 0, 0, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82];

/// Encodes an RGB (3-channel) or RGBA (4-channel) 8-bit image into a
/// freshly allocated PNG byte vector.
///
/// `image` is tightly packed rows, top to bottom, exactly
/// `width * height * channels` bytes. The one-pass coder runs by default;
/// [`EncodeFlags::slower`] trades speed for the two-pass coder's tighter
/// tables, and [`EncodeFlags::force_uncompressed`] skips entropy coding
/// entirely. If a dynamic block ever fails to fit the sized output buffer
/// the encoder quietly falls back to stored blocks, so valid input cannot
/// fail to encode.
pub fn encode(
  image: &[u8], width: u32, height: u32, channels: u32, flags: EncodeFlags,
) -> Result<Vec<u8>, EncodeError> {
  if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
    return Err(EncodeError::BadDimensions);
  }
  if channels != 3 && channels != 4 {
    return Err(EncodeError::BadChannelCount);
  }
  let expected_len = u64::from(width) * u64::from(height) * u64::from(channels);
  if image.len() as u64 != expected_len {
    return Err(EncodeError::WrongBufferLength);
  }

  let filtered = filter_up(image, width, height, channels);

  // The compressors get a budget of one filtered stream's worth of output;
  // anything that compresses worse than that goes out as stored blocks.
  let mut out = alloc::vec![0_u8; (HEADER_SIZE + filtered.len + 7) & !7];

  let mut zlib_size = None;
  if !flags.force_uncompressed {
    let dst = &mut out[HEADER_SIZE..];
    zlib_size = match (channels, flags.slower) {
      (3, false) => one_pass_deflate::<3>(&filtered, width, height, dst),
      (3, true) => dynamic_deflate_3(&filtered, width, height, dst),
      (4, false) => one_pass_deflate::<4>(&filtered, width, height, dst),
      _ => dynamic_deflate_4(&filtered, width, height, dst),
    }
    .ok();
  }

  let zlib_size = match zlib_size {
    Some(size) => size,
    None => {
      // Stored blocks want the all-"None" filter stream instead.
      let filtered = filter_none(image, width, height, channels);
      let block_count = (filtered.len + 65534) / 65535;
      out.resize(HEADER_SIZE + 6 + filtered.len + block_count * 5, 0);
      match stored_deflate(&filtered, &mut out[HEADER_SIZE..]) {
        Ok(size) => size,
        // The buffer was sized for the worst case two lines up.
        Err(_) => unreachable!(),
      }
    }
  };
  out.truncate(HEADER_SIZE + zlib_size);
  let idat_len = zlib_size as u32;

  out[0..8].copy_from_slice(&PNG_SIGNATURE);
  out[8..12].copy_from_slice(&13_u32.to_be_bytes());
  out[12..16].copy_from_slice(b"IHDR");
  out[16..20].copy_from_slice(&width.to_be_bytes());
  out[20..24].copy_from_slice(&height.to_be_bytes());
  out[24] = 8; // bit depth
  out[25] = color_type_for_channels(channels);
  out[26] = 0; // compression method
  out[27] = 0; // filter method
  out[28] = 0; // interlace method
  let ihdr_crc = png_crc(out[12..29].iter().copied());
  out[29..33].copy_from_slice(&ihdr_crc.to_be_bytes());

  out[33..37].copy_from_slice(&5_u32.to_be_bytes());
  out[37..41].copy_from_slice(b"fdEC");
  out[41..46].copy_from_slice(&FDEC_PAYLOAD);
  let fdec_crc = png_crc(out[37..46].iter().copied());
  out[46..50].copy_from_slice(&fdec_crc.to_be_bytes());

  out[50..54].copy_from_slice(&idat_len.to_be_bytes());
  out[54..58].copy_from_slice(b"IDAT");

  out.extend_from_slice(&FILE_SUFFIX);
  let idat_crc = png_crc(out[54..HEADER_SIZE + zlib_size].iter().copied());
  let crc_at = out.len() - FILE_SUFFIX.len();
  out[crc_at..crc_at + 4].copy_from_slice(&idat_crc.to_be_bytes());

  Ok(out)
}
