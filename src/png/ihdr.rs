//! IHDR payload parsing and the dimension rules.

use crate::DecodeError;

/// Widths and heights past this are rejected on both encode and decode.
pub(crate) const MAX_DIMENSION: u32 = 1 << 24;

/// Total pixel count is additionally capped, so a decoded image can't ask
/// for more than a few GB no matter how the two dimensions combine.
pub(crate) const MAX_TOTAL_PIXELS: u64 = 1 << 30;

/// The header fields this codec cares about, already narrowed to the two
/// color types it can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ihdr {
  pub width: u32,
  pub height: u32,
  pub channels: u32,
}

/// Parses and validates a 13-byte IHDR payload.
///
/// Dimension violations are their own error; any other field combination is
/// just a PNG this codec didn't write.
pub(crate) fn parse_ihdr(data: &[u8; 13]) -> Result<Ihdr, DecodeError> {
  let width = u32::from_be_bytes(data[0..4].try_into().unwrap());
  let height = u32::from_be_bytes(data[4..8].try_into().unwrap());
  let bit_depth = data[8];
  let color_type = data[9];
  let compression_method = data[10];
  let filter_method = data[11];
  let interlace_method = data[12];

  if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
    return Err(DecodeError::InvalidDimensions);
  }
  if u64::from(width) * u64::from(height) > MAX_TOTAL_PIXELS {
    return Err(DecodeError::InvalidDimensions);
  }
  if compression_method != 0 || filter_method != 0 || interlace_method != 0 || bit_depth != 8 {
    return Err(DecodeError::NotOurPng);
  }
  let channels = match color_type {
    2 => 3,
    6 => 4,
    _ => return Err(DecodeError::NotOurPng),
  };
  Ok(Ihdr { width, height, channels })
}

/// The color type byte the encoder writes for a channel count.
#[inline]
#[must_use]
pub(crate) const fn color_type_for_channels(channels: u32) -> u8 {
  match channels {
    3 => 2,
    _ => 6,
  }
}
