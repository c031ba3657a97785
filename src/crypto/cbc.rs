//! AES-128-CBC decrypting stream.
//!
//! In CBC the plaintext of block `N` depends on the ciphertext of block
//! `N - 1`, which is what makes random access awkward: jumping into the middle
//! of a stream needs the ciphertext block just before the jump target. The
//! [`CbcProcessor`] fetches that block from the base stream on every call
//! instead of remembering the last one it saw, so reads may arrive in any
//! order.
//!
//! ## Where CBC shows up
//! * CIA content chunks: title key, IV = content index (u16 BE) then 14 zero
//!   bytes. See [`CipherParams::for_cia_content`].
//! * Ticket title keys: common key, IV = title id (u64 BE) then 8 zero bytes.
//!   See [`decrypt_title_key`].
//!
//! No integrity check happens here. A wrong key produces garbage plaintext;
//! wrap the result in an [`crate::formats::ivfc::IvfcStream`] or check the
//! TMD content hash to notice.

use std::fmt;
use std::io::{Seek, SeekFrom};

use aes::Aes128;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use tracing::{debug, trace};

use crate::stream::window::{BlockProcessor, WindowedReader};
use crate::stream::{BlockSource, SharedStream};
use crate::{Error, Result};

/// AES block size; also the physical block size of a [`CbcStream`].
pub const AES_BLOCK_SIZE: usize = 0x10;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Key and initial vector of one CBC-encrypted region.
#[derive(Clone, PartialEq, Eq)]
pub struct CipherParams {
    /// AES-128 key.
    pub key: [u8; 16],
    /// Chaining input for block 0.
    pub iv: [u8; 16],
}

impl CipherParams {
    /// Parameters from a known key and IV.
    pub fn new(key: [u8; 16], iv: [u8; 16]) -> Self {
        Self { key, iv }
    }

    /// Build parameters from untrusted slices, checking both are 16 bytes.
    pub fn from_slices(key: &[u8], iv: &[u8]) -> Result<Self> {
        let key: [u8; 16] = key
            .try_into()
            .map_err(|_| Error::structural(format!("AES key must be 16 bytes, got {}", key.len())))?;
        let iv: [u8; 16] = iv
            .try_into()
            .map_err(|_| Error::structural(format!("AES IV must be 16 bytes, got {}", iv.len())))?;
        Ok(Self { key, iv })
    }

    /// Parameters for CIA content chunk `content_index`.
    pub fn for_cia_content(title_key: [u8; 16], content_index: u16) -> Self {
        let mut iv = [0u8; 16];
        iv[..2].copy_from_slice(&content_index.to_be_bytes());
        Self { key: title_key, iv }
    }
}

impl fmt::Debug for CipherParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherParams")
            .field("key", &"<redacted>")
            .field("iv", &hex::encode(self.iv))
            .finish()
    }
}

/// Block processor that CBC-decrypts whole 16-byte blocks in place.
pub struct CbcProcessor {
    key: [u8; 16],
    iv: [u8; 16],
}

impl CbcProcessor {
    /// Processor keyed with `params`.
    pub fn new(params: &CipherParams) -> Self {
        Self {
            key: params.key,
            iv: params.iv,
        }
    }
}

impl BlockProcessor for CbcProcessor {
    fn process(
        &mut self,
        source: &mut BlockSource<'_>,
        first: u64,
        blocks: &mut [u8],
    ) -> Result<()> {
        if blocks.is_empty() {
            return Ok(());
        }

        // Chaining input: the stored IV for block 0, otherwise the previous
        // block's ciphertext, re-read every time.
        let mut iv = self.iv;
        if first > 0 {
            source.read_blocks(first - 1, &mut iv)?;
        }
        trace!(first, count = blocks.len() / AES_BLOCK_SIZE, "cbc decrypt");

        Aes128CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_mut::<NoPadding>(blocks)
            .map_err(|_| Error::structural("CBC input is not block aligned"))?;
        Ok(())
    }

    fn release(&mut self) {
        self.key = [0; 16];
        self.iv = [0; 16];
    }
}

/// Random-access AES-128-CBC plaintext view of a base stream.
pub type CbcStream = WindowedReader<CbcProcessor>;

impl WindowedReader<CbcProcessor> {
    /// Decrypt the whole of `base`.
    ///
    /// The base stream's length must be a multiple of 16.
    pub fn open(base: SharedStream, params: &CipherParams) -> Result<Self> {
        let length = base
            .try_borrow_mut()
            .map_err(|_| Error::Busy)?
            .seek(SeekFrom::End(0))?;
        Self::with_region(base, 0, length, params)
    }

    /// Decrypt `length` bytes of `base` starting at `offset`.
    ///
    /// Block 0 of the region uses `params.iv`; `length` must be a multiple
    /// of 16 and the region must lie inside `base`.
    pub fn with_region(
        base: SharedStream,
        offset: u64,
        length: u64,
        params: &CipherParams,
    ) -> Result<Self> {
        if length % AES_BLOCK_SIZE as u64 != 0 {
            return Err(Error::structural(format!(
                "CBC region length {length:#x} is not a multiple of {AES_BLOCK_SIZE:#x}"
            )));
        }
        let end = offset
            .checked_add(length)
            .ok_or_else(|| Error::structural(format!("CBC region {offset:#x}+{length:#x} overflows")))?;
        let base_len = base
            .try_borrow_mut()
            .map_err(|_| Error::Busy)?
            .seek(SeekFrom::End(0))?;
        if end > base_len {
            return Err(Error::structural(format!(
                "CBC region ends at {end:#x}, past the end of the base ({base_len:#x})"
            )));
        }
        debug!(offset, length, ?params, "opening cbc stream");
        WindowedReader::new(
            base,
            offset,
            AES_BLOCK_SIZE,
            length,
            CbcProcessor::new(params),
        )
    }
}

/// Unwrap a ticket's encrypted title key with the selected common key.
pub fn decrypt_title_key(encrypted: &[u8; 16], common_key: &[u8; 16], title_id: u64) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..8].copy_from_slice(&title_id.to_be_bytes());
    let mut key = *encrypted;
    Aes128CbcDec::new(common_key.into(), (&iv).into()).decrypt_block_mut((&mut key).into());
    key
}

#[cfg(test)]
mod tests {
    use cbc::cipher::BlockEncryptMut;

    use super::*;

    #[test]
    fn cia_content_iv_is_big_endian_index() {
        let params = CipherParams::for_cia_content([7; 16], 0x0102);
        assert_eq!(params.iv[..2], [0x01, 0x02]);
        assert!(params.iv[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn short_key_is_structural() {
        let err = CipherParams::from_slices(&[0; 15], &[0; 16]).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Structural);
    }

    #[test]
    fn debug_hides_key() {
        let text = format!("{:?}", CipherParams::new([0xAB; 16], [0; 16]));
        assert!(!text.contains("ab"));
        assert!(text.contains("redacted"));
    }

    #[test]
    fn title_key_round_trip() {
        let common_key = [0x3Du8; 16];
        let title_id = 0x0004_0000_0012_3400u64;
        let title_key = *b"0123456789abcdef";

        let mut iv = [0u8; 16];
        iv[..8].copy_from_slice(&title_id.to_be_bytes());
        let mut wrapped = title_key;
        cbc::Encryptor::<Aes128>::new(&common_key.into(), &iv.into())
            .encrypt_block_mut((&mut wrapped).into());

        assert_ne!(wrapped, title_key);
        assert_eq!(decrypt_title_key(&wrapped, &common_key, title_id), title_key);
    }
}
