//! Key management for Nintendo 3DS title cryptography.
//!
//! CIA contents are AES-128-CBC encrypted with a per-title key. The title key
//! ships inside the ticket, itself CBC-wrapped with one of six **common keys**
//! selected by the ticket's `CommonKeyIndex`. Tools that already know the
//! plain title key (e.g. from a title key database) can skip the unwrap.
//!
//! This module is a plain data container; the unwrapping itself lives in
//! [`crate::crypto::cbc::decrypt_title_key`].
//!
//! ## Key file format
//! Simple `name = hex_value` text, one entry per line, comments prefixed with
//! `;` or `#`:
//!
//! ```text
//! common_key_0 = 00112233445566778899AABBCCDDEEFF
//! title_key_0004000000123400 = 0123456789ABCDEF0123456789ABCDEF
//! ```
//!
//! Unknown names and malformed values are skipped.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};

use tracing::debug;

use crate::Result;
use crate::crypto::cbc::decrypt_title_key;

/// Number of common key slots referenced by tickets.
pub const COMMON_KEY_COUNT: usize = 6;

/// All keys needed to decrypt 3DS title content.
#[derive(Debug, Default)]
pub struct KeySet {
    /// Common keys, indexed by ticket `CommonKeyIndex`.
    pub common_keys: [Option<[u8; 16]>; COMMON_KEY_COUNT],
    /// Already-unwrapped title keys, keyed by title id.
    pub title_keys: HashMap<u64, [u8; 16]>,
}

impl KeySet {
    /// Create an empty key set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load keys from a key file reader, adding to what is already present.
    pub fn load<R: Read>(&mut self, reader: R) -> Result<()> {
        let buf = BufReader::new(reader);
        let mut loaded = 0usize;
        for line in buf.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            let Some((name, value)) = line.split_once('=') else {
                continue;
            };
            let name = name.trim().to_ascii_lowercase();
            let Some(key) = decode_key(value) else {
                continue;
            };

            if let Some(idx) = name.strip_prefix("common_key_")
                && let Ok(idx) = idx.parse::<usize>()
                && idx < COMMON_KEY_COUNT
            {
                self.common_keys[idx] = Some(key);
                loaded += 1;
            } else if let Some(id) = name.strip_prefix("title_key_")
                && let Ok(title_id) = u64::from_str_radix(id, 16)
            {
                self.title_keys.insert(title_id, key);
                loaded += 1;
            }
        }
        debug!(loaded, "keys loaded");
        Ok(())
    }

    /// Look up the common key in slot `index`.
    pub fn common_key(&self, index: u8) -> Option<&[u8; 16]> {
        self.common_keys.get(index as usize)?.as_ref()
    }

    /// Resolve the plain title key for `title_id`.
    ///
    /// A known title key wins; otherwise `encrypted` (the ticket's wrapped
    /// key) is unwrapped with common key `common_key_index`.
    pub fn title_key(
        &self,
        title_id: u64,
        encrypted: &[u8; 16],
        common_key_index: u8,
    ) -> Option<[u8; 16]> {
        if let Some(key) = self.title_keys.get(&title_id) {
            return Some(*key);
        }
        let common = self.common_key(common_key_index)?;
        Some(decrypt_title_key(encrypted, common, title_id))
    }
}

fn decode_key(value: &str) -> Option<[u8; 16]> {
    let mut out = [0u8; 16];
    hex::decode_to_slice(value.trim(), &mut out).ok()?;
    Some(out)
}
