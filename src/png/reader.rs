//! Validates the PNG envelope and drives the fast decompressor.
//!
//! The reader is deliberately picky. It only has to accept files this
//! crate's encoder wrote. Everything else, standards-conformant or not,
//! gets [`DecodeError::NotOurPng`] so the caller can route it to a
//! general-purpose PNG decoder instead.

use crate::deflate::inflate_pixels;
use crate::png::chunk::{PngChunk, PngChunkTy};
use crate::png::writer::PNG_SIGNATURE;
use crate::png::fdec::is_fdec_payload;
use crate::png::ihdr::parse_ihdr;
use crate::{DecodeError, DecodedImage, ImageInfo};

/// Signature, IHDR, one minimal ancillary chunk, and IEND. Anything shorter
/// can't possibly be ours.
const MIN_FILE_SIZE: usize = 8 + 25 + (8 + 1 + 4) + 12;

#[derive(Debug, Clone, Copy)]
struct IdatLocation {
  /// Offset of the IDAT payload within the file.
  payload_ofs: usize,
  payload_len: usize,
}

fn get_info_internal(png: &[u8]) -> Result<(ImageInfo, IdatLocation), DecodeError> {
  if png.len() < MIN_FILE_SIZE || png[0..8] != PNG_SIGNATURE {
    return Err(DecodeError::NotPng);
  }

  // IHDR comes first, 13 bytes, CRC intact, or this isn't a PNG we read.
  let (ihdr_chunk, _) = PngChunk::try_split(&png[8..]).ok_or(DecodeError::NotPng)?;
  if ihdr_chunk.ty() != PngChunkTy::IHDR || ihdr_chunk.data().len() != 13 {
    return Err(DecodeError::NotPng);
  }
  if ihdr_chunk.compute_actual_crc() != ihdr_chunk.declared_crc() {
    return Err(DecodeError::NotPng);
  }
  let ihdr = parse_ihdr(ihdr_chunk.data().try_into().unwrap())?;

  // Walk the remaining chunks to IEND: exactly one IDAT, exactly one marker,
  // marker first, no critical strangers.
  let mut found_fdec = false;
  let mut idat: Option<IdatLocation> = None;
  let mut ofs = 8 + 25;
  loop {
    let (chunk, _) = PngChunk::try_split(&png[ofs..]).ok_or(DecodeError::NotPng)?;
    if !chunk.ty().is_ascii_letters() {
      return Err(DecodeError::NotPng);
    }
    let is_idat = chunk.ty() == PngChunkTy::IDAT;
    // IDAT's CRC would mean hashing the whole stream twice; the zlib layer's
    // own end-of-stream checks stand in for it.
    #[cfg(not(feature = "fuzzing"))]
    if !is_idat && chunk.compute_actual_crc() != chunk.declared_crc() {
      return Err(DecodeError::HeaderCrc32Mismatch);
    }

    if chunk.ty() == PngChunkTy::IEND {
      break;
    } else if is_idat {
      // A second IDAT, or one before the marker, is some other encoder's
      // work.
      if idat.is_some() || !found_fdec {
        return Err(DecodeError::NotOurPng);
      }
      if chunk.data().len() < 7 {
        return Err(DecodeError::InvalidIdat);
      }
      idat = Some(IdatLocation { payload_ofs: ofs + 8, payload_len: chunk.data().len() });
    } else if chunk.ty() == PngChunkTy::fdEC {
      if found_fdec || !is_fdec_payload(chunk.data()) {
        return Err(DecodeError::NotOurPng);
      }
      found_fdec = true;
    } else if chunk.ty().is_critical() {
      // PLTE and friends: fine PNG, not ours.
      return Err(DecodeError::NotOurPng);
    }
    ofs += 12 + chunk.data().len();
  }

  let idat = idat.ok_or(DecodeError::NotOurPng)?;
  let info = ImageInfo { width: ihdr.width, height: ihdr.height, channels_in_file: ihdr.channels };
  Ok((info, idat))
}

/// Reads the image dimensions and channel count without decompressing.
///
/// Success here means the whole envelope checks out: signature, IHDR, the
/// `fdEC` marker, a single IDAT, and every non-IDAT CRC.
pub fn get_info(png: &[u8]) -> Result<ImageInfo, DecodeError> {
  get_info_internal(png).map(|(info, _)| info)
}

/// Decodes a PNG produced by [`encode`](crate::encode) into a tightly
/// packed pixel buffer with `desired_channels` channels per pixel.
///
/// `desired_channels` may differ from the file's own channel count:
/// expanding 3 to 4 fills the alpha channel with 0xFF, shrinking 4 to 3
/// drops it.
pub fn decode(png: &[u8], desired_channels: u32) -> Result<DecodedImage, DecodeError> {
  if png.is_empty() || (desired_channels != 3 && desired_channels != 4) {
    return Err(DecodeError::InvalidArg);
  }
  let (info, idat) = get_info_internal(png)?;

  let mem_needed = u64::from(info.width) * u64::from(info.height) * u64::from(desired_channels);
  if mem_needed > u64::from(u32::MAX) {
    return Err(DecodeError::DimensionsTooLarge);
  }
  // On 32-bit hosts, refuse anything that would eat half the address space.
  if usize::BITS == 32 && mem_needed >= 0x8000_0000 {
    return Err(DecodeError::DimensionsTooLarge);
  }

  let mut pixels = alloc::vec![0_u8; mem_needed as usize];
  let zlib = &png[idat.payload_ofs..];
  let ok = match (info.channels_in_file, desired_channels) {
    (3, 3) => inflate_pixels::<3, 3>(zlib, idat.payload_len, &mut pixels, info.width, info.height),
    (3, _) => inflate_pixels::<3, 4>(zlib, idat.payload_len, &mut pixels, info.width, info.height),
    (_, 3) => inflate_pixels::<4, 3>(zlib, idat.payload_len, &mut pixels, info.width, info.height),
    _ => inflate_pixels::<4, 4>(zlib, idat.payload_len, &mut pixels, info.width, info.height),
  };
  if ok.is_none() {
    // Either corrupted, or it breaks one of the restrictions our encoder
    // always honors. Both route to the general decoder.
    return Err(DecodeError::NotOurPng);
  }

  Ok(DecodedImage {
    width: info.width,
    height: info.height,
    channels_in_file: info.channels_in_file,
    pixels,
  })
}
