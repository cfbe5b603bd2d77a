//! Chunks: contiguous device regions subdivided into blocks

use crate::memory::DevicePtr;

/// A sub-range of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Block {
    /// Byte offset from the chunk base
    pub offset: usize,
    /// Size in bytes (always a multiple of the arena alignment)
    pub size: usize,
    pub live: bool,
}

impl Block {
    fn free(offset: usize, size: usize) -> Self {
        Self {
            offset,
            size,
            live: false,
        }
    }

    fn is_adjacent_to(&self, other: &Block) -> bool {
        self.offset + self.size == other.offset
    }
}

/// One region obtained from the device allocator
///
/// Blocks are kept sorted by offset and tile the whole chunk, so the free
/// neighbours of a block are always at `idx - 1` and `idx + 1`.
#[derive(Debug)]
pub(crate) struct Chunk {
    /// Creation sequence number, stable for the chunk's lifetime
    pub id: u64,
    pub base: DevicePtr,
    pub size: usize,
    pub blocks: Vec<Block>,
    /// Freed-but-not-reused bytes
    pub dead_bytes: usize,
    /// Dedicated chunk from `reserve`, released as soon as its block is freed
    pub reserved: bool,
}

impl Chunk {
    pub fn new(id: u64, base: DevicePtr, size: usize) -> Self {
        Self {
            id,
            base,
            size,
            blocks: vec![Block::free(0, size)],
            dead_bytes: 0,
            reserved: false,
        }
    }

    pub fn contains(&self, ptr: DevicePtr) -> bool {
        ptr >= self.base && ptr < self.base.offset(self.size)
    }

    pub fn has_live_blocks(&self) -> bool {
        self.blocks.iter().any(|b| b.live)
    }

    pub fn live_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.live).count()
    }

    pub fn free_bytes(&self) -> usize {
        self.blocks.iter().filter(|b| !b.live).map(|b| b.size).sum()
    }

    pub fn largest_free_block(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| !b.live)
            .map(|b| b.size)
            .max()
            .unwrap_or(0)
    }

    /// Smallest free block that holds `size` bytes: `(block index, block size)`
    pub fn best_fit(&self, size: usize) -> Option<(usize, usize)> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.live && b.size >= size)
            .min_by_key(|(_, b)| b.size)
            .map(|(idx, b)| (idx, b.size))
    }

    /// Carve `size` bytes off the front of free block `idx` and mark them live
    pub fn take(&mut self, idx: usize, size: usize) -> DevicePtr {
        let block = self.blocks[idx];
        debug_assert!(!block.live && block.size >= size);

        let remainder = block.size - size;
        self.blocks[idx] = Block {
            offset: block.offset,
            size,
            live: true,
        };
        if remainder > 0 {
            self.blocks
                .insert(idx + 1, Block::free(block.offset + size, remainder));
        }
        self.dead_bytes = self.dead_bytes.saturating_sub(size);
        self.base.offset(block.offset)
    }

    /// Index of the live block starting at `ptr`
    pub fn live_block_at(&self, ptr: DevicePtr) -> Option<usize> {
        let offset = (ptr.addr() - self.base.addr()) as usize;
        self.blocks
            .binary_search_by_key(&offset, |b| b.offset)
            .ok()
            .filter(|&idx| self.blocks[idx].live)
    }

    /// Mark block `idx` free and merge it with free neighbours
    ///
    /// Returns the freed block's size.
    pub fn release(&mut self, idx: usize) -> usize {
        let size = self.blocks[idx].size;
        self.blocks[idx].live = false;
        self.coalesce_around(idx);
        size
    }

    fn coalesce_around(&mut self, mut idx: usize) {
        if idx > 0 {
            let prev = self.blocks[idx - 1];
            if !prev.live && prev.is_adjacent_to(&self.blocks[idx]) {
                self.blocks[idx - 1].size += self.blocks[idx].size;
                self.blocks.remove(idx);
                idx -= 1;
            }
        }
        if idx + 1 < self.blocks.len() {
            let next = self.blocks[idx + 1];
            if !next.live && self.blocks[idx].is_adjacent_to(&next) {
                self.blocks[idx].size += next.size;
                self.blocks.remove(idx + 1);
            }
        }
    }
}
