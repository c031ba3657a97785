//! **ctrkit** - random-access verified and decrypted streams for Nintendo
//! 3DS containers.
//!
//! 3DS titles stack block-structured transforms: CIA contents are
//! AES-128-CBC encrypted, and RomFS data sits under an IVFC SHA-256 hash
//! tree. Both need arbitrary `[offset, offset + len)` reads that touch only
//! the blocks covering the request. This crate provides those streams and the
//! glue to nest them.
//!
//! # Modules
//! | Module | Purpose |
//! |--------|---------|
//! | [`stream`]         | Windowed reader, read planning, shared base streams |
//! | [`crypto::cbc`]    | AES-128-CBC decrypting stream, title key unwrapping |
//! | [`formats::ivfc`]  | IVFC header, tree geometry and verifying stream |
//! | [`keys`]           | Common key / title key files |
//!
//! # Example
//! ```no_run
//! use std::fs::File;
//! use std::io::Read;
//!
//! use ctrkit::formats::ivfc::IvfcStream;
//! use ctrkit::stream::shared;
//!
//! # fn main() -> ctrkit::Result<()> {
//! let romfs = shared(File::open("romfs.bin")?);
//! let mut data = IvfcStream::open(romfs)?;
//! let mut head = [0u8; 0x28];
//! data.read_exact(&mut head)?;
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod error;
pub mod formats;
pub mod keys;
pub mod stream;
mod utils;

pub use error::{Error, ErrorKind, Result};
