//! Fixed-capacity arena of decoded output slots
//!
//! Output buffers travel decoder -> sink cache queue -> sink release queue
//! -> decoder. The pool tracks which slots are lent out so a buffer can be
//! neither lost nor returned twice.

use crate::utils::error::{PlayerError, Result};
use std::collections::VecDeque;

/// Handle to a slot in a `BufferPool`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    index: u32,
    generation: u32,
}

impl BufferHandle {
    /// Slot index inside the pool
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

#[derive(Debug, Clone, Default)]
struct Slot {
    generation: u32,
    lent: bool,
}

/// Slot arena with explicit acquire/release
#[derive(Debug)]
pub struct BufferPool {
    slots: Vec<Slot>,
    free: VecDeque<u32>,
}

impl BufferPool {
    /// Create a pool with `capacity` slots, all owned by the pool
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Slot::default(); capacity],
            free: (0..capacity as u32).collect(),
        }
    }

    /// Lend out a free slot, if any
    pub fn acquire(&mut self) -> Option<BufferHandle> {
        let index = self.free.pop_front()?;
        let slot = &mut self.slots[index as usize];
        slot.lent = true;
        Some(BufferHandle {
            index,
            generation: slot.generation,
        })
    }

    /// Return a lent slot to the pool
    pub fn release(&mut self, handle: BufferHandle) -> Result<()> {
        let slot = self
            .slots
            .get_mut(handle.index())
            .ok_or_else(|| PlayerError::decoder_error(format!("buffer slot {} out of range", handle.index)))?;

        if !slot.lent || slot.generation != handle.generation {
            return Err(PlayerError::decoder_error(format!(
                "buffer slot {} released twice",
                handle.index
            )));
        }

        slot.lent = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push_back(handle.index);
        Ok(())
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slots currently owned by the pool
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Slots currently lent out
    pub fn outstanding(&self) -> usize {
        self.capacity() - self.available()
    }
}
