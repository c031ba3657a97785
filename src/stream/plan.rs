//! Read planning: splitting a logical byte range into physical blocks.
//!
//! A request `[begin, begin + count)` touches a run of blocks. Only the first
//! and last of them can be partially covered; everything in between is whole
//! and can be fetched and transformed as one batch. [`ReadPlan`] captures that
//! split without doing any I/O so it can be tested on its own.
//!
//! ```text
//!  block:   |   4   |   5   |   6   |   7   |
//!  request:      [=============================)
//!               ^begin partial  ^middle  ^end partial
//! ```

/// A block of which only `[skip, skip + len)` is wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partial {
    /// Block index relative to the window start.
    pub block: u64,
    /// Offset of the wanted bytes inside the block.
    pub skip: usize,
    /// Number of wanted bytes.
    pub len: usize,
    /// Where the bytes go in the caller's buffer.
    pub dest: usize,
}

/// A run of whole blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    /// First block index relative to the window start.
    pub first: u64,
    /// Number of blocks (never zero).
    pub count: u64,
    /// Where the first block goes in the caller's buffer.
    pub dest: usize,
}

/// Decomposition of one read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPlan {
    /// Nothing to read.
    Empty,
    /// Request begins and ends inside one block, which is not fully covered.
    Single(Partial),
    /// Request spans several blocks, or exactly covers whole blocks.
    Span {
        begin: Option<Partial>,
        middle: Option<BlockRange>,
        end: Option<Partial>,
    },
}

impl ReadPlan {
    /// Plan a read of `count` bytes at logical offset `begin`.
    pub fn new(begin: u64, count: usize, block_size: usize) -> Self {
        if count == 0 {
            return ReadPlan::Empty;
        }
        let bs = block_size as u64;
        let end = begin + count as u64;
        let first_block = begin / bs;
        let last_block = (end - 1) / bs;
        let head = (begin % bs) as usize;
        let tail = (end % bs) as usize;

        if first_block == last_block && (head != 0 || tail != 0) {
            return ReadPlan::Single(Partial {
                block: first_block,
                skip: head,
                len: count,
                dest: 0,
            });
        }

        let begin_part = (head != 0).then(|| Partial {
            block: first_block,
            skip: head,
            len: block_size - head,
            dest: 0,
        });
        let end_part = (tail != 0).then(|| Partial {
            block: last_block,
            skip: 0,
            len: tail,
            dest: count - tail,
        });

        let mid_first = first_block + u64::from(head != 0);
        let mid_end = last_block + 1 - u64::from(tail != 0);
        let middle = (mid_end > mid_first).then(|| BlockRange {
            first: mid_first,
            count: mid_end - mid_first,
            dest: begin_part.map_or(0, |p| p.len),
        });

        ReadPlan::Span {
            begin: begin_part,
            middle,
            end: end_part,
        }
    }

    /// Number of physical blocks the plan touches.
    pub fn block_count(&self) -> u64 {
        match self {
            ReadPlan::Empty => 0,
            ReadPlan::Single(_) => 1,
            ReadPlan::Span { begin, middle, end } => {
                u64::from(begin.is_some())
                    + middle.map_or(0, |m| m.count)
                    + u64::from(end.is_some())
            }
        }
    }
}
