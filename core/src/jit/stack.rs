//! Compile-time model of the bytecode operand stack.
//!
//! Every logical position is backed by one word of a frame allocation, so
//! control-flow joins never need phis for stack values. Within a block the
//! model remembers which IR value sits in each position and only writes the
//! positions that changed ("dirty") when control is about to leave the block
//! or a helper needs a pointer into the stack.

use crate::ir::{IrBuilder, Operand, Ty};

use super::error::JitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StackFault {
    Underflow { needed: usize, depth: usize },
    Overflow { capacity: usize },
}

impl StackFault {
    pub(crate) fn at(self, ip: usize) -> JitError {
        match self {
            StackFault::Underflow { needed, depth } => JitError::StackUnderflow { ip, needed, depth },
            StackFault::Overflow { capacity } => JitError::StackOverflow { ip, capacity },
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    value: Option<Operand>,
    dirty: bool,
}

pub(crate) struct OperandStack {
    base: Operand,
    depth: usize,
    slots: Vec<Slot>,
}

impl OperandStack {
    pub(crate) fn new(base: Operand, capacity: usize) -> Self {
        Self {
            base,
            depth: 0,
            slots: vec![Slot::default(); capacity],
        }
    }

    pub(crate) fn base(&self) -> Operand {
        self.base
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Enter a new block at `depth`. Remembered values may not dominate the
    /// new block, so they are dropped. Edges into the block flushed first;
    /// anything still dirty belonged to a block that returned.
    pub(crate) fn enter_block(&mut self, depth: usize) -> Result<(), StackFault> {
        if depth > self.capacity() {
            return Err(StackFault::Overflow {
                capacity: self.capacity(),
            });
        }
        self.slots.iter_mut().for_each(|s| *s = Slot::default());
        self.depth = depth;
        Ok(())
    }

    fn slot_ptr(&self, b: &mut IrBuilder, index: usize) -> Operand {
        if index == 0 {
            self.base
        } else {
            b.element_ptr(self.base, index as i64, "stack_pos").into()
        }
    }

    fn require(&self, needed: usize) -> Result<(), StackFault> {
        if needed > self.depth {
            Err(StackFault::Underflow {
                needed,
                depth: self.depth,
            })
        } else {
            Ok(())
        }
    }

    fn read(&mut self, b: &mut IrBuilder, index: usize) -> Operand {
        if let Some(value) = self.slots[index].value {
            return value;
        }
        let ptr = self.slot_ptr(b, index);
        let value: Operand = b.load(Ty::I64, ptr, "stack_load").into();
        self.slots[index] = Slot {
            value: Some(value),
            dirty: false,
        };
        value
    }

    fn write(&mut self, index: usize, value: Operand) {
        self.slots[index] = Slot {
            value: Some(value),
            dirty: true,
        };
    }

    pub(crate) fn push(&mut self, value: Operand) -> Result<(), StackFault> {
        if self.depth == self.capacity() {
            return Err(StackFault::Overflow {
                capacity: self.capacity(),
            });
        }
        self.write(self.depth, value);
        self.depth += 1;
        Ok(())
    }

    /// The value `k` positions below the top (`0` is the top).
    pub(crate) fn back(&mut self, b: &mut IrBuilder, k: usize) -> Result<Operand, StackFault> {
        self.require(k + 1)?;
        Ok(self.read(b, self.depth - 1 - k))
    }

    pub(crate) fn top(&mut self, b: &mut IrBuilder) -> Result<Operand, StackFault> {
        self.back(b, 0)
    }

    pub(crate) fn pop(&mut self, b: &mut IrBuilder) -> Result<Operand, StackFault> {
        let value = self.top(b)?;
        self.remove(1)?;
        Ok(value)
    }

    pub(crate) fn remove(&mut self, count: usize) -> Result<(), StackFault> {
        self.require(count)?;
        for slot in &mut self.slots[self.depth - count..self.depth] {
            *slot = Slot::default();
        }
        self.depth -= count;
        Ok(())
    }

    /// Write every changed position back to the stack memory.
    pub(crate) fn flush(&mut self, b: &mut IrBuilder) {
        for index in 0..self.depth {
            let slot = self.slots[index];
            if let (true, Some(value)) = (slot.dirty, slot.value) {
                let ptr = self.slot_ptr(b, index);
                b.store(value, ptr);
                self.slots[index].dirty = false;
            }
        }
    }

    /// Pointer to the lowest of the top `count` values, flushed so a helper
    /// can read them as an array.
    pub(crate) fn objects(&mut self, b: &mut IrBuilder, count: usize) -> Result<Operand, StackFault> {
        self.require(count)?;
        self.flush(b);
        Ok(self.slot_ptr(b, self.depth - count))
    }

    /// Pointer to the value `k` positions below the top.
    pub(crate) fn position(&mut self, b: &mut IrBuilder, k: usize) -> Result<Operand, StackFault> {
        self.require(k + 1)?;
        self.flush(b);
        Ok(self.slot_ptr(b, self.depth - 1 - k))
    }

    pub(crate) fn swap(&mut self, b: &mut IrBuilder) -> Result<(), StackFault> {
        let top = self.back(b, 0)?;
        let below = self.back(b, 1)?;
        self.write(self.depth - 1, below);
        self.write(self.depth - 2, top);
        Ok(())
    }

    pub(crate) fn dup(&mut self, b: &mut IrBuilder) -> Result<(), StackFault> {
        let top = self.top(b)?;
        self.push(top)
    }

    /// Reverse the order of the top `count` values.
    pub(crate) fn rotate(&mut self, b: &mut IrBuilder, count: usize) -> Result<(), StackFault> {
        self.require(count)?;
        let values = (0..count).map(|k| self.back(b, k)).collect::<Result<Vec<_>, _>>()?;
        let lowest = self.depth - count;
        for (i, value) in values.into_iter().enumerate() {
            self.write(lowest + i, value);
        }
        Ok(())
    }

    /// Move the top value below the next `positions` values.
    pub(crate) fn move_down(&mut self, b: &mut IrBuilder, positions: usize) -> Result<(), StackFault> {
        self.require(positions + 1)?;
        let top = self.top(b)?;
        for k in 0..positions {
            let below = self.back(b, k + 1)?;
            self.write(self.depth - 1 - k, below);
        }
        self.write(self.depth - 1 - positions, top);
        Ok(())
    }
}
