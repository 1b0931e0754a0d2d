use std::fmt;
use std::rc::Rc;

use crate::instructions::{mnemonic, Instruction, Opcode, WordType};

/// Functional-unit classes. Each class owns an independently sized pool of
/// reservation stations.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum FUType {
    ADD,
    MUL,
    MEM,
}

impl FUType {
    // Branches and jumps have no pool of their own in this model; they are
    // plain dataflow ops and run on the adder.
    pub(crate) fn for_opcode(opcode: Opcode) -> FUType {
        match opcode {
            Opcode::ADD | Opcode::SUB | Opcode::BEQ | Opcode::BNE | Opcode::J => FUType::ADD,
            Opcode::MUL | Opcode::DIV => FUType::MUL,
            Opcode::LD | Opcode::ST => FUType::MEM,
        }
    }
}

/// Station identity, used as the producer tag during register renaming.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct Tag {
    pub(crate) fu: FUType,
    pub(crate) index: u8,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fu {
            FUType::ADD => write!(f, "Add{}", self.index),
            FUType::MUL => write!(f, "Mul{}", self.index),
            FUType::MEM => write!(f, "Mem{}", self.index),
        }
    }
}

/// An operand slot: either a resolved value, or a tag naming the station
/// that will produce the value. `Unused` counts as resolved.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Operand {
    Value(WordType),
    Pending(Tag),
    Unused,
}

impl Operand {
    pub(crate) fn is_resolved(&self) -> bool {
        !matches!(self, Operand::Pending(_))
    }

    pub(crate) fn value_or(&self, default: WordType) -> WordType {
        match self {
            Operand::Value(value) => *value,
            _ => default,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Value(value) => write!(f, "{}", value),
            Operand::Pending(tag) => write!(f, "<{}>", tag),
            Operand::Unused => write!(f, "-"),
        }
    }
}

/// A single reservation station.
pub(crate) struct RS {
    pub(crate) tag: Tag,
    pub(crate) busy: bool,
    pub(crate) op: Option<Opcode>,
    pub(crate) source: [Operand; 2],
    // load/store effective address, fixed at issue time
    pub(crate) addr: Option<WordType>,
    pub(crate) instr: Option<Rc<Instruction>>,
    pub(crate) remaining_cycles: u8,
    pub(crate) rob_index: Option<u16>,
}

impl RS {
    fn new(tag: Tag) -> RS {
        RS {
            tag,
            busy: false,
            op: None,
            source: [Operand::Unused, Operand::Unused],
            addr: None,
            instr: None,
            remaining_cycles: 0,
            rob_index: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.busy = false;
        self.op = None;
        self.source = [Operand::Unused, Operand::Unused];
        self.addr = None;
        self.instr = None;
        self.remaining_cycles = 0;
        self.rob_index = None;
    }
}

impl fmt::Display for RS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag)?;
        if let Some(op) = self.op {
            write!(f, " {}", mnemonic(op))?;
        }
        for operand in &self.source {
            write!(f, " {}", operand)?;
        }
        Ok(())
    }
}

/// The three reservation-station pools plus the common data bus across them.
pub(crate) struct RSTable {
    add_stations: Vec<RS>,
    mul_stations: Vec<RS>,
    mem_stations: Vec<RS>,
}

impl RSTable {
    pub(crate) fn new(n_add: u8, n_mul: u8, n_mem: u8) -> RSTable {
        RSTable {
            add_stations: Self::build_pool(FUType::ADD, n_add),
            mul_stations: Self::build_pool(FUType::MUL, n_mul),
            mem_stations: Self::build_pool(FUType::MEM, n_mem),
        }
    }

    fn build_pool(fu: FUType, count: u8) -> Vec<RS> {
        (0..count).map(|index| RS::new(Tag { fu, index })).collect()
    }

    fn pool_mut(&mut self, fu: FUType) -> &mut Vec<RS> {
        match fu {
            FUType::ADD => &mut self.add_stations,
            FUType::MUL => &mut self.mul_stations,
            FUType::MEM => &mut self.mem_stations,
        }
    }

    /// First non-busy station of the class the opcode executes on, in
    /// construction order. `None` is a structural-hazard stall.
    pub(crate) fn get_available_station(&mut self, opcode: Opcode) -> Option<&mut RS> {
        self.pool_mut(FUType::for_opcode(opcode))
            .iter_mut()
            .find(|rs| !rs.busy)
    }

    pub(crate) fn get_mut(&mut self, tag: Tag) -> &mut RS {
        &mut self.pool_mut(tag.fu)[tag.index as usize]
    }

    /// Common-data-bus broadcast: every operand still waiting on `tag`, in
    /// any pool, resolves to `value`. A station waiting on the same tag in
    /// both slots resolves both in this one call.
    pub(crate) fn update_stations(&mut self, tag: Tag, value: WordType) {
        for rs in self.iter_mut() {
            if !rs.busy {
                continue;
            }
            for operand in rs.source.iter_mut() {
                if *operand == Operand::Pending(tag) {
                    *operand = Operand::Value(value);
                }
            }
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &RS> + '_ {
        self.add_stations
            .iter()
            .chain(self.mul_stations.iter())
            .chain(self.mem_stations.iter())
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut RS> + '_ {
        self.add_stations
            .iter_mut()
            .chain(self.mul_stations.iter_mut())
            .chain(self.mem_stations.iter_mut())
    }

    pub(crate) fn all_idle(&self) -> bool {
        self.iter().all(|rs| !rs.busy)
    }
}
