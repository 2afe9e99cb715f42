#![no_std]
#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

//! Fast encoding and decoding of a restricted slice of PNG.
//!
//! The encoder writes standards-conformant PNG files for 24-bit RGB and
//! 32-bit RGBA images, trading compression ratio for speed: one dynamic
//! DEFLATE block, "None"/"Up" filters only, and LZ77 matches restricted to
//! pixel-stride runs. Files it writes carry a private `fdEC` marker chunk.
//!
//! The decoder is the encoder's mirror: it reads **only** files written by
//! this encoder (the marker plus a pile of structural checks gate the fast
//! path) and decompresses straight into the output pixel buffer with the
//! inverse filter fused in. Anything else comes back as
//! [`DecodeError::NotOurPng`], which callers should treat as "hand this
//! file to a general-purpose PNG library".
//!
//! ```
//! use fleetpng::{decode, encode, EncodeFlags};
//!
//! let pixels = [10_u8, 20, 30, 10, 20, 30, 40, 50, 60, 40, 50, 60];
//! let png = encode(&pixels, 2, 2, 3, EncodeFlags::default()).unwrap();
//! let back = decode(&png, 3).unwrap();
//! assert_eq!(back.pixels, &pixels[..]);
//! assert_eq!((back.width, back.height, back.channels_in_file), (2, 2, 3));
//! ```

extern crate alloc;

use alloc::vec::Vec;
use pixel_formats::{r8g8b8_Srgb, r8g8b8a8_Srgb};

mod adler32;
mod bit_sink;
mod bit_source;
mod crc32;
mod deflate;
mod filtering;

pub mod png;

pub use png::{decode, encode, get_info};

/// Options for [`encode`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeFlags {
  /// Run the two-pass coder: gather real symbol frequencies and build
  /// per-image Huffman tables instead of using the precomputed ones.
  /// Slower to encode, usually a few percent smaller.
  pub slower: bool,
  /// Skip entropy coding entirely and emit stored DEFLATE blocks.
  pub force_uncompressed: bool,
}

/// Why [`encode`] rejected its arguments. Valid arguments cannot fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
  /// Width or height is zero or exceeds 2^24.
  BadDimensions,
  /// Channel count was not 3 or 4.
  BadChannelCount,
  /// The pixel slice isn't exactly `width * height * channels` bytes.
  WrongBufferLength,
}

/// Why [`decode`] or [`get_info`] gave up on a byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
  /// The caller's own arguments were bad (empty input, channels not 3/4).
  InvalidArg,
  /// Not a PNG at all: bad signature, unsplittable chunks, or a corrupt
  /// IHDR.
  NotPng,
  /// A non-IDAT chunk's stored CRC-32 doesn't match its bytes.
  HeaderCrc32Mismatch,
  /// Width or height is zero, exceeds 2^24, or the pixel count tops 2^30.
  InvalidDimensions,
  /// The decoded image wouldn't fit the host's address space.
  DimensionsTooLarge,
  /// The IDAT chunk is too short to hold even an empty zlib stream.
  InvalidIdat,
  /// A well-formed PNG that this encoder didn't write. Route it to a
  /// general-purpose decoder.
  NotOurPng,
}

/// Image facts pulled from the envelope without decompressing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
  /// Width in pixels.
  pub width: u32,
  /// Height in pixels.
  pub height: u32,
  /// 3 for RGB files, 4 for RGBA files.
  pub channels_in_file: u32,
}

/// A decoded image: tightly packed 8-bit channels, top-down rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
  /// Width in pixels.
  pub width: u32,
  /// Height in pixels.
  pub height: u32,
  /// The channel count of the *file*; `pixels` is laid out with whatever
  /// channel count the caller asked [`decode`] for.
  pub channels_in_file: u32,
  /// `width * height * desired_channels` bytes of pixel data.
  pub pixels: Vec<u8>,
}

/// [`encode`], but over typed RGB pixels.
pub fn encode_rgb8(
  pixels: &[r8g8b8_Srgb], width: u32, height: u32, flags: EncodeFlags,
) -> Result<Vec<u8>, EncodeError> {
  encode(bytemuck::cast_slice(pixels), width, height, 3, flags)
}

/// [`encode`], but over typed RGBA pixels.
pub fn encode_rgba8(
  pixels: &[r8g8b8a8_Srgb], width: u32, height: u32, flags: EncodeFlags,
) -> Result<Vec<u8>, EncodeError> {
  encode(bytemuck::cast_slice(pixels), width, height, 4, flags)
}

/// [`decode`] to typed RGBA pixels (alpha filled with 0xFF for RGB files).
pub fn decode_rgba8(png: &[u8]) -> Result<(Vec<r8g8b8a8_Srgb>, u32, u32), DecodeError> {
  let image = decode(png, 4)?;
  Ok((bytemuck::cast_slice(&image.pixels).to_vec(), image.width, image.height))
}

/// [`decode`] to typed RGB pixels (alpha dropped for RGBA files).
pub fn decode_rgb8(png: &[u8]) -> Result<(Vec<r8g8b8_Srgb>, u32, u32), DecodeError> {
  let image = decode(png, 3)?;
  Ok((bytemuck::cast_slice(&image.pixels).to_vec(), image.width, image.height))
}
