//! Untransformed byte window over a shared stream.
//!
//! Containers nest: a CIA holds contents, a content holds an NCCH, an NCCH
//! holds a RomFS. [`SubStream`] carves `[offset, offset + length)` out of a
//! [`SharedStream`] and presents it as a fresh `Read + Seek` starting at 0, so
//! the region can be wrapped with [`crate::stream::shared`] and handed to an
//! [`crate::formats::ivfc::IvfcStream`] or a [`crate::crypto::cbc::CbcStream`].

use std::io::{self, Read, Seek, SeekFrom};

use super::SharedStream;
use crate::{Error, Result};

/// A bounded view of part of a shared stream.
pub struct SubStream {
    base: SharedStream,
    offset: u64,
    length: u64,
    position: u64,
}

impl SubStream {
    /// View `length` bytes of `base` starting at `offset`.
    ///
    /// Returns [`Error::InvalidRange`] if the region runs past the end of the
    /// base stream.
    pub fn new(base: SharedStream, offset: u64, length: u64) -> Result<Self> {
        let base_len = base
            .try_borrow_mut()
            .map_err(|_| Error::Busy)?
            .seek(SeekFrom::End(0))?;
        let end = offset.checked_add(length).ok_or(Error::InvalidRange)?;
        if end > base_len {
            return Err(Error::InvalidRange);
        }
        Ok(Self {
            base,
            offset,
            length,
            position: 0,
        })
    }

    /// Length of the view in bytes.
    pub fn len(&self) -> u64 {
        self.length
    }

    /// Whether the view covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl Read for SubStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.length - self.position;
        let count = remaining.min(buf.len() as u64) as usize;
        if count == 0 {
            return Ok(0);
        }
        let mut base = self.base.try_borrow_mut().map_err(|_| Error::Busy)?;
        base.seek(SeekFrom::Start(self.offset + self.position))?;
        let n = base.read(&mut buf[..count])?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for SubStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => self.length.checked_add_signed(delta),
        }
        .filter(|&t| t <= self.length)
        .ok_or(Error::InvalidRange)?;
        self.position = target;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::stream::shared;

    #[test]
    fn reads_are_confined_to_region() {
        let base = shared(Cursor::new((0..100u8).collect::<Vec<_>>()));
        let mut sub = SubStream::new(base, 10, 20).unwrap();

        let mut all = Vec::new();
        sub.read_to_end(&mut all).unwrap();
        assert_eq!(all, (10..30u8).collect::<Vec<_>>());

        sub.seek(SeekFrom::End(-5)).unwrap();
        let mut tail = [0u8; 8];
        assert_eq!(sub.read(&mut tail).unwrap(), 5);
        assert_eq!(&tail[..5], &[25, 26, 27, 28, 29]);
    }

    #[test]
    fn region_past_end_is_rejected() {
        let base = shared(Cursor::new(vec![0u8; 16]));
        assert!(matches!(SubStream::new(base, 8, 9), Err(Error::InvalidRange)));
    }

    #[test]
    fn seek_outside_region_fails() {
        let base = shared(Cursor::new(vec![0u8; 16]));
        let mut sub = SubStream::new(base, 0, 8).unwrap();
        assert!(sub.seek(SeekFrom::Start(9)).is_err());
    }
}
