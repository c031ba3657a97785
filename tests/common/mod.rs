#![allow(dead_code)]

use aes::Aes128;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use sha2::{Digest, Sha256};

pub const KEY: [u8; 16] = *b"ctrkit-test-key!";
pub const IV: [u8; 16] = [0x5A; 16];

/// An in-memory IVFC image and where its levels ended up.
pub struct IvfcImage {
    pub image: Vec<u8>,
    pub data: Vec<u8>,
    pub block_size: usize,
    pub master_size: usize,
    pub level0_size: usize,
    pub level1_size: usize,
    pub data_offset: usize,
    pub level1_offset: usize,
    pub level0_offset: usize,
}

impl IvfcImage {
    /// Build a RomFS-style IVFC image around `data` with the same block size
    /// on every level.
    pub fn build(data: &[u8], block_size_log2: u32) -> Self {
        let bs = 1usize << block_size_log2;
        let level1 = hash_blocks(data, bs);
        let level0 = hash_blocks(&level1, bs);
        let master = hash_blocks(&level0, bs);

        let master_offset = 0x60;
        let data_offset = align(master_offset + master.len(), bs);
        let level1_offset = align(data_offset + data.len(), bs);
        let level0_offset = align(level1_offset + level1.len(), bs);
        let end = level0_offset + align(level0.len(), bs);

        let mut image = vec![0u8; end];
        image[..0x5C].copy_from_slice(&header(
            master.len() as u32,
            [level0.len(), level1.len(), data.len()],
            block_size_log2,
        ));
        image[master_offset..master_offset + master.len()].copy_from_slice(&master);
        image[data_offset..data_offset + data.len()].copy_from_slice(data);
        image[level1_offset..level1_offset + level1.len()].copy_from_slice(&level1);
        image[level0_offset..level0_offset + level0.len()].copy_from_slice(&level0);

        Self {
            image,
            data: data.to_vec(),
            block_size: bs,
            master_size: master.len(),
            level0_size: level0.len(),
            level1_size: level1.len(),
            data_offset,
            level1_offset,
            level0_offset,
        }
    }

    /// Recompute level 0 and the master hash from the level 1 bytes currently
    /// in the image.
    pub fn reseal(&mut self) {
        let bs = self.block_size;
        let level1 = self.image[self.level1_offset..self.level1_offset + self.level1_size].to_vec();
        let level0 = hash_blocks(&level1, bs);
        self.image[self.level0_offset..self.level0_offset + level0.len()].copy_from_slice(&level0);
        let master = hash_blocks(&level0, bs);
        self.image[0x60..0x60 + master.len()].copy_from_slice(&master);
    }
}

/// One SHA-256 per zero-padded `bs` slice.
pub fn hash_blocks(data: &[u8], bs: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in data.chunks(bs) {
        let mut block = chunk.to_vec();
        block.resize(bs, 0);
        out.extend_from_slice(&Sha256::digest(&block));
    }
    out
}

pub fn header(master_size: u32, sizes: [usize; 3], block_size_log2: u32) -> Vec<u8> {
    let mut raw = Vec::with_capacity(0x5C);
    raw.extend_from_slice(b"IVFC");
    raw.extend_from_slice(&0x10000u32.to_le_bytes());
    raw.extend_from_slice(&master_size.to_le_bytes());
    let mut logical = 0u64;
    for size in sizes {
        raw.extend_from_slice(&logical.to_le_bytes());
        raw.extend_from_slice(&(size as u64).to_le_bytes());
        raw.extend_from_slice(&block_size_log2.to_le_bytes());
        raw.extend_from_slice(&0u32.to_le_bytes());
        logical += size as u64;
    }
    raw.extend_from_slice(&0u32.to_le_bytes());
    raw.extend_from_slice(&0x5Cu32.to_le_bytes());
    raw
}

pub fn align(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

/// Deterministic, non-repeating test payload.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u32).wrapping_mul(2_654_435_761).to_le_bytes()[1])
        .collect()
}

/// Whole-buffer AES-128-CBC encryption, the reference for windowed reads.
pub fn cbc_encrypt(plain: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> Vec<u8> {
    assert_eq!(plain.len() % 16, 0);
    let mut buf = plain.to_vec();
    let len = buf.len();
    cbc::Encryptor::<Aes128>::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .unwrap();
    buf
}
