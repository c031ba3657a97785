//! Cryptographic operations for Nintendo 3DS content.
//!
//! The block cipher itself comes from the RustCrypto `aes` and `cbc` crates;
//! this module only binds it to the windowed stream machinery and to the
//! IV conventions of 3DS containers. Key loading lives in
//! [`crate::keys::KeySet`].
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`cbc`] | AES-128-CBC random-access decrypting stream, CIA content IVs, ticket title key unwrapping |
//!
//! ## Key hierarchy (brief)
//!
//! ```text
//! keys file
//!   └── common_key_N (16 bytes, N = ticket CommonKeyIndex)
//!         └── AES-CBC unwrap ticket title key (IV = title id || 0*8)
//!               └── title key → AES-CBC decrypt CIA content N (IV = index || 0*14)
//! ```

pub mod cbc;
