//! Parsers and verified streams for Nintendo 3DS container formats.
//!
//! Conventions shared with the rest of the crate:
//!
//! * **Generic over** [`std::io::Read`] + [`std::io::Seek`] for header
//!   parsing - pass a [`std::fs::File`], a [`std::io::Cursor`], or a
//!   [`crate::stream::sub::SubStream`] carved out of a larger container.
//! * **Metadata eagerly, data lazily** - headers and bounded hash tables are
//!   read up front; bulk data is only touched by reads.
//! * **Crypto is separate** - wrap encrypted regions in a
//!   [`crate::crypto::cbc::CbcStream`] first and parse the plaintext view.
//!
//! ## Format overview
//!
//! | Module   | Format | Description |
//! |----------|--------|-------------|
//! | [`ivfc`] | IVFC   | Three-level SHA-256 hash tree protecting RomFS data |

pub mod ivfc;
