//! IVFC - hash-tree verified RomFS stream.
//!
//! RomFS data is protected by a three-level SHA-256 tree. The master hash
//! (stored right after the header, and itself covered by the NCCH header
//! hash) anchors level 0, level 0 hashes level 1, and level 1 hashes the data
//! level. Each level is hashed in `1 << block_size_log2` slices, one 0x20-byte
//! digest per slice.
//!
//! ## Header (0x5C bytes, little-endian)
//! ```text
//! [0x00] Magic "IVFC"                         (4 bytes)
//! [0x04] Type id (0x10000 for RomFS)          (u32 LE)
//! [0x08] Master hash size                     (u32 LE)
//! [0x0C] Level 0: offset (u64) size (u64) block_size_log2 (u32) reserved (u32)
//! [0x24] Level 1: same layout
//! [0x3C] Level 2 (data): same layout
//! [0x54] Reserved                             (u32)
//! [0x58] Optional info size                   (u32 LE)
//! ```
//!
//! ## Physical layout
//! ```text
//! [0x00]                     Header
//! [align(0x5C, 0x10)]        Master hash
//! [align(.., data bs)]       Data level
//! [align(.., level 1 bs)]    Level 1 hashes (one per data block)
//! [align(.., level 0 bs)]    Level 0 hashes (one per level 1 block)
//! ```
//! The per-level offsets stored in the header are logical and are not used
//! for placement.
//!
//! ## Verification
//! Master, level 0 and level 1 are loaded and checked against each other when
//! the stream is built, so a bad tree is rejected before any data is read.
//! Only level 1 is kept. Data blocks are hashed lazily, one digest per block,
//! whenever a read touches them.

use std::io::{Read, Seek, SeekFrom};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::stream::window::{BlockProcessor, WindowedReader};
use crate::stream::{BlockSource, ReadSeek, SharedStream};
use crate::utils::{align_up, bytesa, fill_padded, le_u32, le_u64, magic};
use crate::{Error, Result};

/// Type id of the RomFS flavour of IVFC.
pub const ROMFS_TYPE_ID: u32 = 0x10000;
/// Size of the on-disk header.
pub const IVFC_HEADER_SIZE: u64 = 0x5C;
/// Alignment of the master hash region that follows the header.
pub const MASTER_HASH_ALIGN: u64 = 0x10;
/// SHA-256 digest size.
pub const HASH_SIZE: usize = 0x20;
/// Number of levels below the master hash.
pub const LEVEL_COUNT: usize = 3;
/// Index of the data level in [`IvfcHeader::levels`].
pub const DATA_LEVEL: usize = LEVEL_COUNT - 1;
/// Largest accepted `block_size_log2`.
pub const MAX_BLOCK_SIZE_LOG2: u32 = 24;

/// One level descriptor as stored in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfcLevelHeader {
    /// Logical offset (informational only).
    pub offset: u64,
    /// Size of the level in bytes.
    pub size: u64,
    /// Block size of the level as a power of two.
    pub block_size_log2: u32,
}

/// Parsed IVFC header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IvfcHeader {
    /// Always [`ROMFS_TYPE_ID`] once parsed.
    pub type_id: u32,
    /// Byte count of the master hash region.
    pub master_hash_size: u32,
    /// Level 0, level 1, data level.
    pub levels: [IvfcLevelHeader; LEVEL_COUNT],
    /// Size of the optional info block that trails the header.
    pub optional_info_size: u32,
}

impl IvfcHeader {
    /// Parse an IVFC header from `r`, which must be positioned at the magic.
    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        magic(r, b"IVFC")?;
        let type_id = le_u32(r)?;
        if type_id != ROMFS_TYPE_ID {
            return Err(Error::UnsupportedVersion(type_id));
        }
        let master_hash_size = le_u32(r)?;

        let mut levels = [IvfcLevelHeader {
            offset: 0,
            size: 0,
            block_size_log2: 0,
        }; LEVEL_COUNT];
        for level in &mut levels {
            let offset = le_u64(r)?;
            let size = le_u64(r)?;
            let block_size_log2 = le_u32(r)?;
            let _reserved = le_u32(r)?;
            *level = IvfcLevelHeader {
                offset,
                size,
                block_size_log2,
            };
        }

        let _reserved = bytesa::<4>(r)?;
        let optional_info_size = le_u32(r)?;

        Ok(Self {
            type_id,
            master_hash_size,
            levels,
            optional_info_size,
        })
    }
}

/// Physical placement of one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfcLevel {
    /// Absolute offset within the IVFC region.
    pub offset: u64,
    /// Size in bytes, without block padding.
    pub size: u64,
    /// Hashing granularity in bytes.
    pub block_size: usize,
    /// `size` in blocks, rounded up.
    pub block_count: u64,
}

impl IvfcLevel {
    fn from_header(index: usize, header: &IvfcLevelHeader) -> Result<Self> {
        if header.block_size_log2 > MAX_BLOCK_SIZE_LOG2 {
            return Err(Error::structural(format!(
                "level {index} block size 2^{} is too large",
                header.block_size_log2
            )));
        }
        let block_size = 1usize << header.block_size_log2;
        Ok(Self {
            offset: 0,
            size: header.size,
            block_size,
            block_count: header.size.div_ceil(block_size as u64),
        })
    }

    /// Size rounded up to whole blocks.
    pub fn padded_size(&self) -> u64 {
        self.block_count * self.block_size as u64
    }

    fn end(&self) -> Result<u64> {
        self.offset
            .checked_add(self.size)
            .ok_or_else(|| Error::structural("level extends past the end of the address space"))
    }
}

/// Tree geometry derived from an [`IvfcHeader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IvfcGeometry {
    /// Offset of the master hash, right after the header.
    pub master_offset: u64,
    /// Byte count of the master hash region.
    pub master_size: u64,
    /// Level 0, level 1, data level.
    pub levels: [IvfcLevel; LEVEL_COUNT],
}

impl IvfcGeometry {
    /// Compute level placement and check the size invariant between every
    /// pair of adjacent levels.
    pub fn new(header: &IvfcHeader) -> Result<Self> {
        let mut levels = [
            IvfcLevel::from_header(0, &header.levels[0])?,
            IvfcLevel::from_header(1, &header.levels[1])?,
            IvfcLevel::from_header(2, &header.levels[2])?,
        ];

        let master_offset = align_up(IVFC_HEADER_SIZE, MASTER_HASH_ALIGN);
        let master_size = u64::from(header.master_hash_size);

        // Data first, then each hash level after the one it covers.
        let mut cursor = master_offset + master_size;
        for level in levels.iter_mut().rev() {
            level.offset = checked_align(cursor, level.block_size as u64)?;
            cursor = level.end()?;
        }

        let geometry = Self {
            master_offset,
            master_size,
            levels,
        };
        geometry.check_sizes()?;

        debug!(
            master_size,
            data_offset = geometry.data().offset,
            data_size = geometry.data().size,
            data_blocks = geometry.data().block_count,
            "ivfc geometry"
        );
        Ok(geometry)
    }

    fn check_sizes(&self) -> Result<()> {
        let mut parent_size = self.master_size;
        for (index, level) in self.levels.iter().enumerate() {
            let hashes = level
                .block_count
                .checked_mul(HASH_SIZE as u64)
                .ok_or_else(|| Error::structural(format!("level {index} hash table size overflows")))?;
            if hashes != parent_size {
                return Err(Error::structural(format!(
                    "level {index} has {} blocks needing {hashes:#x} hash bytes, parent holds {parent_size:#x}",
                    level.block_count
                )));
            }
            parent_size = level.size;
        }
        Ok(())
    }

    /// The data level.
    pub fn data(&self) -> &IvfcLevel {
        &self.levels[DATA_LEVEL]
    }
}

fn checked_align(value: u64, align: u64) -> Result<u64> {
    value
        .checked_add(align - 1)
        .map(|v| v & !(align - 1))
        .ok_or_else(|| Error::structural("level offset overflows"))
}

/// Block processor that checks every data block against the level 1 hashes.
#[derive(Debug)]
pub struct IvfcProcessor {
    geometry: IvfcGeometry,
    cache: Vec<u8>,
    blocks_verified: u64,
}

impl IvfcProcessor {
    /// Load and cross-check the upper levels, keeping level 1 as the cache.
    pub fn build(base: &mut dyn ReadSeek, geometry: IvfcGeometry) -> Result<Self> {
        let [level0, level1, data] = geometry.levels;

        let stream_len = base.seek(SeekFrom::End(0))?;
        let master_end = geometry.master_offset + geometry.master_size;
        for (name, end) in [
            ("master hash", master_end),
            ("level 0", level0.end()?),
            ("level 1", level1.end()?),
            ("data level", data.end()?),
        ] {
            if end > stream_len {
                return Err(Error::structural(format!(
                    "{name} ends at {end:#x}, past the end of the stream ({stream_len:#x})"
                )));
            }
        }

        let master = read_region(base, geometry.master_offset, geometry.master_size)?;
        let level0_bytes = read_region(base, level0.offset, level0.padded_size())?;
        verify_level(0, &level0, &level0_bytes, &master)?;

        let mut cache = read_region(base, level1.offset, level1.padded_size())?;
        verify_level(1, &level1, &cache, &level0_bytes)?;
        cache.truncate(level1.size as usize);

        debug!(cached = cache.len(), "ivfc hash tree validated");
        Ok(Self {
            geometry,
            cache,
            blocks_verified: 0,
        })
    }

    /// Placement of every level of the tree.
    pub fn geometry(&self) -> &IvfcGeometry {
        &self.geometry
    }

    /// Number of data-block hash comparisons performed so far.
    pub fn blocks_verified(&self) -> u64 {
        self.blocks_verified
    }

    /// Bytes of hash table held in memory.
    pub fn cached_bytes(&self) -> usize {
        self.cache.len()
    }
}

impl BlockProcessor for IvfcProcessor {
    fn process(
        &mut self,
        source: &mut BlockSource<'_>,
        first: u64,
        blocks: &mut [u8],
    ) -> Result<()> {
        for (i, block) in blocks.chunks(source.block_size()).enumerate() {
            let index = first + i as u64;
            let slot = index as usize * HASH_SIZE;
            let expected = self
                .cache
                .get(slot..slot + HASH_SIZE)
                .ok_or_else(|| Error::structural(format!("no hash slot for data block {index}")))?;

            self.blocks_verified += 1;
            if Sha256::digest(block).as_slice() != expected {
                warn!(block = index, "ivfc data block hash mismatch");
                return Err(Error::Integrity {
                    level: DATA_LEVEL,
                    block: index,
                });
            }
        }
        Ok(())
    }

    fn release(&mut self) {
        self.cache = Vec::new();
    }
}

fn read_region(base: &mut dyn ReadSeek, offset: u64, size: u64) -> Result<Vec<u8>> {
    let size = usize::try_from(size)
        .map_err(|_| Error::structural(format!("hash level of {size:#x} bytes cannot be buffered")))?;
    let mut buf = vec![0u8; size];
    base.seek(SeekFrom::Start(offset))?;
    fill_padded(base, &mut buf)?;
    Ok(buf)
}

/// Check each block of a child level against its digest in the parent.
fn verify_level(index: usize, level: &IvfcLevel, child: &[u8], parent: &[u8]) -> Result<()> {
    let slices = child.chunks(level.block_size).zip(parent.chunks(HASH_SIZE));
    for (block, (data, expected)) in slices.enumerate() {
        if Sha256::digest(data).as_slice() != expected {
            return Err(Error::structural(format!(
                "level {index} block {block} does not match its parent hash"
            )));
        }
    }
    Ok(())
}

/// Hash-tree verified view of an IVFC region's data level.
pub type IvfcStream = WindowedReader<IvfcProcessor>;

impl WindowedReader<IvfcProcessor> {
    /// Parse the header at the start of `base` and build the stream.
    pub fn open(base: SharedStream) -> Result<Self> {
        let header = {
            let mut guard = base.try_borrow_mut().map_err(|_| Error::Busy)?;
            let mut reader: &mut dyn ReadSeek = &mut *guard;
            reader.seek(SeekFrom::Start(0))?;
            IvfcHeader::parse(&mut reader)?
        };
        Self::with_header(base, &header)
    }

    /// Build the stream from an already parsed header.
    ///
    /// Fails with a structural error if the tree geometry is inconsistent or
    /// the upper levels do not hash up to the master hash.
    pub fn with_header(base: SharedStream, header: &IvfcHeader) -> Result<Self> {
        let geometry = IvfcGeometry::new(header)?;
        let data = *geometry.data();
        let processor = {
            let mut guard = base.try_borrow_mut().map_err(|_| Error::Busy)?;
            IvfcProcessor::build(&mut *guard, geometry)?
        };
        WindowedReader::new(base, data.offset, data.block_size, data.size, processor)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn level(size: u64, log2: u32) -> IvfcLevelHeader {
        IvfcLevelHeader {
            offset: 0,
            size,
            block_size_log2: log2,
        }
    }

    fn header(master: u32, sizes: [u64; 3]) -> IvfcHeader {
        IvfcHeader {
            type_id: ROMFS_TYPE_ID,
            master_hash_size: master,
            levels: [level(sizes[0], 9), level(sizes[1], 9), level(sizes[2], 9)],
            optional_info_size: 0,
        }
    }

    #[test]
    fn geometry_of_small_tree() {
        let geometry = IvfcGeometry::new(&header(0x20, [0x20, 0x100, 0x1000])).unwrap();

        assert_eq!(geometry.master_offset, 0x60);
        let [l0, l1, data] = geometry.levels;
        assert_eq!((data.offset, data.block_count), (0x200, 8));
        assert_eq!((l1.offset, l1.size, l1.block_count), (0x1200, 0x100, 1));
        assert_eq!((l0.offset, l0.size, l0.block_count), (0x1400, 0x20, 1));
    }

    #[test]
    fn mismatched_level_sizes_are_structural() {
        // Data has 8 blocks but level 1 only holds 7 hashes.
        let err = IvfcGeometry::new(&header(0x20, [0x20, 0xE0, 0x1000])).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Structural);

        // Master hash sized for two level 0 blocks.
        let err = IvfcGeometry::new(&header(0x40, [0x20, 0x100, 0x1000])).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Structural);
    }

    #[test]
    fn oversized_block_is_rejected() {
        let mut h = header(0x20, [0x20, 0x100, 0x1000]);
        h.levels[2].block_size_log2 = 40;
        assert!(matches!(IvfcGeometry::new(&h), Err(Error::Structural(_))));
    }

    #[test]
    fn huge_level_size_is_structural() {
        let mut h = header(0x20, [0x20, 0x100, 0x1000]);
        h.levels[2].size = u64::MAX - 4;
        let err = IvfcGeometry::new(&h).unwrap_err();
        assert!(matches!(err, Error::Structural(_)));

        // Hash table byte count overflows before placement does.
        let mut h = header(0x20, [0x20, 0x100, 0x1000]);
        h.levels[1].size = u64::MAX / 2;
        h.levels[1].block_size_log2 = 0;
        assert_eq!(IvfcGeometry::new(&h).unwrap_err().kind(), crate::ErrorKind::Structural);
    }

    #[test]
    fn header_parse_reads_all_fields() {
        let mut raw = Vec::new();
        raw.extend_from_slice(b"IVFC");
        raw.extend_from_slice(&ROMFS_TYPE_ID.to_le_bytes());
        raw.extend_from_slice(&0x20u32.to_le_bytes());
        for (offset, size, log2) in [(0u64, 0x20u64, 12u32), (0x1000, 0x100, 12), (0x2000, 0x1000, 12)] {
            raw.extend_from_slice(&offset.to_le_bytes());
            raw.extend_from_slice(&size.to_le_bytes());
            raw.extend_from_slice(&log2.to_le_bytes());
            raw.extend_from_slice(&0u32.to_le_bytes());
        }
        raw.extend_from_slice(&0u32.to_le_bytes());
        raw.extend_from_slice(&0x5Cu32.to_le_bytes());
        assert_eq!(raw.len() as u64, IVFC_HEADER_SIZE);

        let h = IvfcHeader::parse(&mut Cursor::new(raw)).unwrap();
        assert_eq!(h.master_hash_size, 0x20);
        assert_eq!(h.levels[1].offset, 0x1000);
        assert_eq!(h.levels[2].size, 0x1000);
        assert_eq!(h.levels[2].block_size_log2, 12);
        assert_eq!(h.optional_info_size, 0x5C);
    }

    #[test]
    fn wrong_type_id_is_unsupported() {
        let mut raw = b"IVFC".to_vec();
        raw.extend_from_slice(&0x20000u32.to_le_bytes());
        raw.resize(IVFC_HEADER_SIZE as usize, 0);
        assert!(matches!(
            IvfcHeader::parse(&mut Cursor::new(raw)),
            Err(Error::UnsupportedVersion(0x20000))
        ));
    }
}
