//! Random-access logical streams over block-structured physical media.
//!
//! Everything here shares one shape: a [`SharedStream`] holds the physical
//! bytes, and a [`window::WindowedReader`] exposes a logical byte range of it
//! while a [`window::BlockProcessor`] transforms each physical block on the
//! way out (hash verification, chained decryption).
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`plan`]   | Pure decomposition of a read into partial and whole blocks |
//! | [`window`] | The windowed reader and the block processor trait |
//! | [`sub`]    | Untransformed byte window over a shared stream |
//!
//! Streams are single-threaded: the base stream is shared through
//! `Rc<RefCell<_>>` and callers that need concurrency must serialize
//! externally.

use std::cell::RefCell;
use std::io::{Read, Seek, SeekFrom};
use std::rc::Rc;

use crate::{Error, Result};
use crate::utils::fill_padded;

pub mod plan;
pub mod sub;
pub mod window;

/// Object-safe combination of [`Read`] and [`Seek`].
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// A physical stream shared between every reader built on top of it.
pub type SharedStream = Rc<RefCell<dyn ReadSeek>>;

/// Wrap any reader so it can back one or more logical streams.
pub fn shared<R: Read + Seek + 'static>(reader: R) -> SharedStream {
    Rc::new(RefCell::new(reader))
}

/// Block-indexed access to the physical bytes behind a window.
///
/// Block `n` starts at `offset + n * block_size` in the base stream. Handed to
/// [`window::BlockProcessor`]s so they can fetch neighbouring blocks (the CBC
/// chaining input) through the same positioning rules as the reader.
pub struct BlockSource<'a> {
    base: &'a mut dyn ReadSeek,
    offset: u64,
    block_size: usize,
}

impl<'a> BlockSource<'a> {
    pub(crate) fn new(base: &'a mut dyn ReadSeek, offset: u64, block_size: usize) -> Self {
        Self {
            base,
            offset,
            block_size,
        }
    }

    /// Size in bytes of one physical block.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Read whole blocks starting at block index `first` into `buf`.
    ///
    /// `buf.len()` must be a multiple of the block size. Bytes past the end of
    /// the base stream read as zero.
    pub fn read_blocks(&mut self, first: u64, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(buf.len() % self.block_size, 0);
        let start = first
            .checked_mul(self.block_size as u64)
            .and_then(|rel| rel.checked_add(self.offset))
            .ok_or(Error::InvalidRange)?;
        self.base.seek(SeekFrom::Start(start))?;
        fill_padded(&mut *self.base, buf)
    }
}
