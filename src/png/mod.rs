//! The PNG envelope around the restricted DEFLATE stream.
//!
//! * [Portable Network Graphics (PNG) Specification (Third Edition)][png-spec]
//!
//! [png-spec]: https://www.w3.org/TR/png/
//!
//! The writer emits exactly five pieces: signature, IHDR, the private `fdEC`
//! marker, one IDAT, and IEND. The reader insists on the same shape.

#![allow(missing_docs)]

mod chunk;
pub(crate) mod fdec;
pub(crate) mod ihdr;
mod reader;
mod writer;

pub use chunk::*;
pub use reader::*;
pub use writer::*;
