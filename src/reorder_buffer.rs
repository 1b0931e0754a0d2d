use std::rc::Rc;

use serde::Serialize;

use crate::errors::SimError;
use crate::instructions::{Instruction, RegisterType, WordType};

// Lifecycle of an in-flight instruction. There is deliberately no EXECUTING
// state: an entry stays ISSUED until its result is written back.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[allow(non_camel_case_types)]
pub(crate) enum ROBState {
    ISSUED,
    RESULT_WRITTEN,
    COMMITTED,
}

#[derive(Clone, Debug)]
pub(crate) struct ROBEntry {
    pub(crate) instr: Rc<Instruction>,
    pub(crate) state: ROBState,
    pub(crate) destination: Option<RegisterType>,
    pub(crate) value: Option<WordType>,
    pub(crate) ready: bool,
}

/// The reorder buffer: a fixed-capacity circular FIFO of in-flight
/// instructions. Only the head entry ever leaves the buffer, and only once
/// it is ready; that is what turns out-of-order completion into in-order
/// commit.
pub(crate) struct ROB {
    capacity: u16,
    entries: Vec<Option<ROBEntry>>,
    head: u16,
    tail: u16,
    count: u16,
}

impl ROB {
    pub(crate) fn new(capacity: u16) -> ROB {
        let mut entries = Vec::with_capacity(capacity as usize);
        for _ in 0..capacity {
            entries.push(None);
        }
        ROB {
            capacity,
            entries,
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    pub(crate) fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Appends at the tail and returns the slot index. The index stays valid
    /// for the entry's whole lifetime and is the handle a reservation
    /// station uses to post its result.
    pub(crate) fn add_entry(
        &mut self,
        instr: Rc<Instruction>,
        destination: Option<RegisterType>,
    ) -> Result<u16, SimError> {
        if self.is_full() {
            return Err(SimError::RobFull);
        }

        let index = self.tail;
        self.entries[index as usize] = Some(ROBEntry {
            instr,
            state: ROBState::ISSUED,
            destination,
            value: None,
            ready: false,
        });
        self.tail = (self.tail + 1) % self.capacity;
        self.count += 1;
        Ok(index)
    }

    /// Records a produced value and marks the entry ready. A no-op for an
    /// index that no longer holds a live entry.
    pub(crate) fn update_entry(&mut self, index: u16, value: WordType) {
        if index >= self.capacity {
            return;
        }
        if let Some(entry) = &mut self.entries[index as usize] {
            entry.value = Some(value);
            entry.ready = true;
            entry.state = ROBState::RESULT_WRITTEN;
        }
    }

    /// Retires the head entry if it exists and is ready. `None` is the
    /// normal case while the head instruction is still executing.
    pub(crate) fn commit(&mut self) -> Option<ROBEntry> {
        if self.is_empty() {
            return None;
        }

        match &self.entries[self.head as usize] {
            Some(entry) if entry.ready => {}
            _ => return None,
        }

        let mut entry = self.entries[self.head as usize].take()?;
        entry.state = ROBState::COMMITTED;
        self.head = (self.head + 1) % self.capacity;
        self.count -= 1;
        Some(entry)
    }

    /// Discards every entry strictly after `index` and recomputes tail and
    /// count. Hook for branch-misprediction recovery; the current control
    /// model never calls it.
    #[allow(dead_code)]
    pub(crate) fn flush_after(&mut self, index: u16) {
        let mut current = (index + 1) % self.capacity;
        while current != self.tail {
            self.entries[current as usize] = None;
            current = (current + 1) % self.capacity;
        }
        self.tail = (index + 1) % self.capacity;
        self.count = (self.tail + self.capacity - self.head) % self.capacity;
    }

    pub(crate) fn entries(&self) -> &[Option<ROBEntry>] {
        &self.entries
    }
}
