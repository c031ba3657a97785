//! Windowed random-access reader.
//!
//! [`WindowedReader`] owns a reference to a [`SharedStream`] and exposes
//! `length` logical bytes starting at physical `offset`. Every read is split
//! by [`ReadPlan`] into at most one partial begin block, one batch of whole
//! blocks and one partial end block. Partial blocks go through a one-block
//! scratch buffer; the whole-block batch is read and transformed directly in
//! the caller's buffer.
//!
//! The per-block transform is supplied by a [`BlockProcessor`]:
//! [`crate::crypto::cbc::CbcProcessor`] decrypts, and
//! [`crate::formats::ivfc::IvfcProcessor`] verifies hashes.
//!
//! A reader also implements [`std::io::Read`] and [`std::io::Seek`], so it can
//! itself be wrapped with [`crate::stream::shared`] and serve as the base of
//! another reader.

use std::io::{self, Read, Seek, SeekFrom};

use tracing::trace;

use super::plan::{Partial, ReadPlan};
use super::{BlockSource, SharedStream};
use crate::{Error, Result};

/// A transform applied to whole physical blocks as they are read.
pub trait BlockProcessor {
    /// Transform `blocks` in place.
    ///
    /// `blocks` holds one or more whole blocks, the first of which is block
    /// `first` of the window. Batching is an I/O optimisation only: the
    /// processor must treat each constituent block on its own terms.
    fn process(&mut self, source: &mut BlockSource<'_>, first: u64, blocks: &mut [u8])
    -> Result<()>;

    /// Drop cached state when the owning reader is disposed.
    fn release(&mut self) {}
}

/// Read-only logical window over a block-structured base stream.
pub struct WindowedReader<P> {
    base: Option<SharedStream>,
    offset: u64,
    block_size: usize,
    length: u64,
    position: u64,
    scratch: Vec<u8>,
    processor: P,
}

impl<P: BlockProcessor> WindowedReader<P> {
    /// Build a window of `length` bytes starting at physical `offset`.
    ///
    /// Fails with a structural error if the block size is zero or the window
    /// does not fit in a `u64` address space.
    pub fn new(
        base: SharedStream,
        offset: u64,
        block_size: usize,
        length: u64,
        processor: P,
    ) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::structural("block size must be non-zero"));
        }
        // Room for the padded final block.
        offset
            .checked_add(length)
            .and_then(|end| end.checked_add(block_size as u64))
            .ok_or_else(|| Error::structural(format!("window {offset:#x}+{length:#x} overflows")))?;
        Ok(Self {
            base: Some(base),
            offset,
            block_size,
            length,
            position: 0,
            scratch: vec![0u8; block_size],
            processor,
        })
    }

    /// Logical length in bytes.
    pub fn length(&self) -> Result<u64> {
        self.live()?;
        Ok(self.length)
    }

    /// Current logical position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Physical block size.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// The block processor driving this window.
    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.base.is_none()
    }

    fn live(&self) -> Result<&SharedStream> {
        self.base.as_ref().ok_or(Error::Disposed)
    }

    /// Read up to `buf.len()` bytes from the current position.
    ///
    /// Returns the number of bytes read, which is only short at the end of
    /// the window. On error nothing is returned and the position is left
    /// unchanged.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let base = self.base.as_ref().ok_or(Error::Disposed)?;
        let count = (self.length - self.position).min(buf.len() as u64) as usize;
        if count == 0 {
            return Ok(0);
        }

        let plan = ReadPlan::new(self.position, count, self.block_size);
        if plan.block_count() == 0 {
            return Err(Error::structural("non-empty read planned over zero blocks"));
        }
        trace!(position = self.position, count, ?plan, "windowed read");

        let mut guard = base.try_borrow_mut().map_err(|_| Error::Busy)?;
        let mut source = BlockSource::new(&mut *guard, self.offset, self.block_size);
        let out = &mut buf[..count];

        match plan {
            ReadPlan::Empty => {}
            ReadPlan::Single(part) => {
                carve(&mut self.processor, &mut self.scratch, &mut source, part, out)?;
            }
            ReadPlan::Span { begin, middle, end } => {
                if let Some(part) = begin {
                    carve(&mut self.processor, &mut self.scratch, &mut source, part, out)?;
                }
                if let Some(range) = middle {
                    let len = range.count as usize * self.block_size;
                    let dest = &mut out[range.dest..range.dest + len];
                    source.read_blocks(range.first, dest)?;
                    self.processor.process(&mut source, range.first, dest)?;
                }
                if let Some(part) = end {
                    carve(&mut self.processor, &mut self.scratch, &mut source, part, out)?;
                }
            }
        }

        self.position += count as u64;
        Ok(count)
    }

    /// Move the logical position. Positions past the end are rejected.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let base = self.live()?;
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => self.length.checked_add_signed(delta),
        }
        .filter(|&t| t <= self.length)
        .ok_or(Error::InvalidRange)?;

        base.try_borrow_mut()
            .map_err(|_| Error::Busy)?
            .seek(SeekFrom::Start(self.offset + target))?;
        self.position = target;
        Ok(target)
    }

    /// Always fails: windows are read-only.
    pub fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(Error::Unsupported("write"))
    }

    /// Always fails: windows are read-only.
    pub fn set_length(&mut self, _length: u64) -> Result<()> {
        Err(Error::Unsupported("set_length"))
    }

    /// Release the base stream and any cached tables.
    ///
    /// Every later call fails with [`Error::Disposed`].
    pub fn dispose(&mut self) {
        self.base = None;
        self.scratch = Vec::new();
        self.processor.release();
    }
}

/// Service one partially covered block through the scratch buffer.
fn carve<P: BlockProcessor>(
    processor: &mut P,
    scratch: &mut [u8],
    source: &mut BlockSource<'_>,
    part: Partial,
    out: &mut [u8],
) -> Result<()> {
    source.read_blocks(part.block, scratch)?;
    processor.process(source, part.block, scratch)?;
    out[part.dest..part.dest + part.len].copy_from_slice(&scratch[part.skip..part.skip + part.len]);
    Ok(())
}

impl<P: BlockProcessor> Read for WindowedReader<P> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(WindowedReader::read(self, buf)?)
    }
}

impl<P: BlockProcessor> Seek for WindowedReader<P> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(WindowedReader::seek(self, pos)?)
    }
}
