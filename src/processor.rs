use std::collections::HashMap;
use std::error::Error;
use std::fs::File;
use std::rc::Rc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::SimError;
use crate::instructions::{
    mnemonic, register_name, Instruction, InstructionFactory, Opcode, WordType, REG_COUNT,
};
use crate::register_status::RegisterStatus;
use crate::reorder_buffer::{ROBState, ROB};
use crate::reservation_station::{RSTable, Operand, Tag, RS};

#[derive(Clone, Deserialize, Debug)]
#[serde(default)]
pub(crate) struct SimConfig {
    // the number of arithmetic reservation stations
    pub(crate) n_add: u8,
    // the number of multiply/divide reservation stations
    pub(crate) n_mul: u8,
    // the number of load/store reservation stations
    pub(crate) n_mem: u8,
    // the capacity of the reorder buffer
    pub(crate) rob_capacity: u16,
    // execution latency per mnemonic; unlisted opcodes take 1 cycle
    pub(crate) latencies: HashMap<String, u8>,
}

impl Default for SimConfig {
    fn default() -> SimConfig {
        SimConfig {
            n_add: 3,
            n_mul: 3,
            n_mem: 2,
            rob_capacity: 8,
            latencies: HashMap::new(),
        }
    }
}

pub(crate) fn load_sim_config(file_path: &str) -> Result<SimConfig, Box<dyn Error>> {
    let file = File::open(file_path)?;
    let config = serde_yaml::from_reader(file)?;
    Ok(config)
}

pub(crate) struct PerfCounters {
    pub(crate) total_instructions: u64,
    pub(crate) total_cycles: u64,
    pub(crate) bubble_cycles: u64,
    pub(crate) committed_instructions: u64,
}

impl PerfCounters {
    fn new(total_instructions: u64) -> PerfCounters {
        PerfCounters {
            total_instructions,
            total_cycles: 0,
            bubble_cycles: 0,
            committed_instructions: 0,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub(crate) struct Metrics {
    pub(crate) total_instructions: u64,
    pub(crate) total_cycles: u64,
    pub(crate) bubble_cycles: u64,
    pub(crate) committed_instructions: u64,
    pub(crate) ipc: f64,
}

#[derive(Clone, Debug, Serialize)]
pub(crate) struct RegisterSnapshot {
    pub(crate) name: String,
    pub(crate) value: WordType,
    pub(crate) producer: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub(crate) struct StationSnapshot {
    pub(crate) name: String,
    pub(crate) busy: bool,
    pub(crate) op: Option<&'static str>,
    pub(crate) vj: Option<WordType>,
    pub(crate) vk: Option<WordType>,
    pub(crate) qj: Option<String>,
    pub(crate) qk: Option<String>,
    pub(crate) a: Option<WordType>,
    pub(crate) remaining_cycles: u8,
}

#[derive(Clone, Debug, Serialize)]
pub(crate) struct ROBEntrySnapshot {
    pub(crate) instruction: String,
    pub(crate) state: ROBState,
    pub(crate) destination: Option<String>,
    pub(crate) value: Option<WordType>,
    pub(crate) ready: bool,
}

#[derive(Clone, Debug, Serialize)]
pub(crate) struct ProcessorState {
    pub(crate) cycle: u64,
    pub(crate) metrics: Metrics,
    pub(crate) registers: Vec<RegisterSnapshot>,
    pub(crate) reservation_stations: Vec<StationSnapshot>,
    pub(crate) reorder_buffer: Vec<Option<ROBEntrySnapshot>>,
    pub(crate) is_finished: bool,
}

/// The scheduling/execution/commit engine. `step()` advances one logical
/// clock cycle: Issue, then Execute, then Commit, all against state as it
/// stood at the start of the cycle. Single-threaded and fully synchronous;
/// the caller decides the pacing.
pub(crate) struct Processor {
    config: SimConfig,
    stations: RSTable,
    registers: RegisterStatus,
    rob: ROB,
    program: Vec<Rc<Instruction>>,
    next_instr: usize,
    cycle: u64,
    perf_counters: PerfCounters,
    memory: HashMap<WordType, WordType>,
    is_finished: bool,
}

impl Processor {
    pub(crate) fn new(config: &SimConfig) -> Processor {
        let mut processor = Processor {
            config: config.clone(),
            stations: RSTable::new(config.n_add, config.n_mul, config.n_mem),
            registers: RegisterStatus::new(),
            rob: ROB::new(config.rob_capacity),
            program: Vec::new(),
            next_instr: 0,
            cycle: 0,
            perf_counters: PerfCounters::new(0),
            memory: HashMap::new(),
            is_finished: false,
        };
        processor.seed_memory();
        processor
    }

    /// Parses and installs a new instruction stream, resetting every
    /// sub-structure from the persisted configuration. A parse failure
    /// aborts the load and leaves no partial program installed.
    pub(crate) fn load_program(&mut self, lines: &[&str]) -> Result<(), SimError> {
        let factory = InstructionFactory::new(&self.config.latencies);
        let mut program = Vec::with_capacity(lines.len());
        for line in lines {
            program.push(Rc::new(factory.create_instruction(line)?));
        }

        self.program = program;
        self.next_instr = 0;
        self.cycle = 0;
        self.is_finished = false;
        self.perf_counters = PerfCounters::new(self.program.len() as u64);
        self.stations = RSTable::new(self.config.n_add, self.config.n_mul, self.config.n_mem);
        self.registers = RegisterStatus::new();
        self.rob = ROB::new(self.config.rob_capacity);
        self.seed_memory();
        Ok(())
    }

    fn seed_memory(&mut self) {
        self.memory.clear();
        self.memory.insert(0, 10);
        self.memory.insert(4, 20);
    }

    /// Advances one clock cycle. Returns whether further stepping is
    /// possible; once the program has finished this is a no-op returning
    /// `Ok(false)`. A `DivisionByZero` fault propagates out.
    pub(crate) fn step(&mut self) -> Result<bool, SimError> {
        if self.is_finished {
            return Ok(false);
        }

        self.cycle += 1;
        self.perf_counters.total_cycles += 1;

        let issued = self.issue();
        let executed = self.execute()?;
        let committed = self.commit();

        // a bubble is a cycle with no forward progress while work remains
        if !(issued || executed || committed) && !self.is_program_finished() {
            self.perf_counters.bubble_cycles += 1;
        }

        self.is_finished = self.is_program_finished();
        Ok(!self.is_finished)
    }

    // Issues at most one instruction, in program order. A missing station or
    // a full ROB is a stall, not a failure: issue simply does not happen
    // this cycle.
    fn issue(&mut self) -> bool {
        if self.next_instr >= self.program.len() {
            return false;
        }
        let instr = Rc::clone(&self.program[self.next_instr]);

        let tag = match self.stations.get_available_station(instr.opcode) {
            Some(rs) => rs.tag,
            None => return false,
        };

        // Stores and control ops produce no architectural register; their
        // ROB entry carries no destination and they rename nothing.
        let destination = match instr.opcode {
            Opcode::ST | Opcode::BEQ | Opcode::BNE | Opcode::J => None,
            _ => instr.dest,
        };

        let rob_index = match self.rob.add_entry(Rc::clone(&instr), destination) {
            Ok(index) => index,
            Err(_) => return false,
        };

        let rs = self.stations.get_mut(tag);
        rs.busy = true;
        rs.op = Some(instr.opcode);
        rs.instr = Some(Rc::clone(&instr));
        // the countdown starts this same cycle, so one extra tick keeps the
        // observable latency at `latency` full cycles after issue
        rs.remaining_cycles = instr.latency + 1;
        rs.rob_index = Some(rob_index);

        // The effective address is fixed now, even if the base register is
        // still being produced. Known simplification of this model.
        if matches!(instr.opcode, Opcode::LD | Opcode::ST) {
            let base = match instr.src1 {
                Some(src1) => self.registers.get_value(src1),
                None => 0,
            };
            rs.addr = Some(base + instr.immediate.unwrap_or(0));
        }

        if let Some(src1) = instr.src1 {
            rs.source[0] = match self.registers.get_status(src1) {
                None => Operand::Value(self.registers.get_value(src1)),
                Some(producer) => Operand::Pending(producer),
            };
        }
        if let Some(src2) = instr.src2 {
            rs.source[1] = match self.registers.get_status(src2) {
                None => Operand::Value(self.registers.get_value(src2)),
                Some(producer) => Operand::Pending(producer),
            };
        }

        if let Some(dest) = destination {
            self.registers.set_status(dest, tag);
        }

        debug!("cycle {}: issued [{}] to {}", self.cycle, instr, tag);

        self.next_instr += 1;
        true
    }

    // Advances every busy station. Stations whose latency has elapsed and
    // whose operands are all resolved produce their result, post it to the
    // ROB and broadcast it on the common data bus. Broadcasts are applied
    // after the pass, so a value produced this cycle wakes its consumers for
    // a later cycle.
    fn execute(&mut self) -> Result<bool, SimError> {
        let mut progress = false;
        let mut cdb_broadcast_buffer: Vec<(Tag, WordType)> = Vec::new();

        for rs in self.stations.iter_mut() {
            if !rs.busy {
                continue;
            }
            if rs.remaining_cycles > 0 {
                rs.remaining_cycles -= 1;
            }
            if rs.remaining_cycles > 0 || !rs.source.iter().all(Operand::is_resolved) {
                continue;
            }
            let op = match rs.op {
                Some(op) => op,
                None => continue,
            };

            let value = Self::execute_operation(&mut self.memory, rs, op)?;
            debug!("cycle {}: executed [{}] -> {}", self.cycle, rs, value);

            if let Some(rob_index) = rs.rob_index {
                self.rob.update_entry(rob_index, value);
            }
            cdb_broadcast_buffer.push((rs.tag, value));
            rs.reset();
            progress = true;
        }

        for (tag, value) in cdb_broadcast_buffer {
            self.stations.update_stations(tag, value);
        }

        Ok(progress)
    }

    fn execute_operation(
        memory: &mut HashMap<WordType, WordType>,
        rs: &RS,
        op: Opcode,
    ) -> Result<WordType, SimError> {
        let vj = rs.source[0].value_or(0);
        let vk = rs.source[1].value_or(0);
        let addr = rs.addr.unwrap_or(0);

        match op {
            Opcode::ADD => Ok(vj + vk),
            Opcode::SUB => Ok(vj - vk),
            Opcode::MUL => Ok(vj * vk),
            Opcode::DIV => {
                if vk == 0 {
                    return Err(SimError::DivisionByZero);
                }
                Ok(vj / vk)
            }
            Opcode::LD => Ok(memory.get(&addr).copied().unwrap_or(0)),
            Opcode::ST => {
                memory.insert(addr, vj);
                // ROB bookkeeping only; a store has no destination register
                Ok(vj)
            }
            Opcode::BEQ => Ok((vj == vk) as WordType),
            Opcode::BNE => Ok((vj != vk) as WordType),
            // branch results are dataflow values only; the program counter
            // is never redirected
            Opcode::J => Ok(0),
        }
    }

    // Retires the ROB head if it is ready; at most one commit per cycle.
    fn commit(&mut self) -> bool {
        match self.rob.commit() {
            Some(entry) => {
                if let (Some(dest), Some(value)) = (entry.destination, entry.value) {
                    self.registers.update_on_commit(dest, value);
                }
                self.perf_counters.committed_instructions += 1;
                debug!("cycle {}: committed [{}]", self.cycle, entry.instr);
                true
            }
            None => false,
        }
    }

    fn is_program_finished(&self) -> bool {
        self.next_instr >= self.program.len()
            && self.stations.all_idle()
            && self.rob.is_empty()
            && self.perf_counters.committed_instructions == self.perf_counters.total_instructions
    }

    pub(crate) fn get_metrics(&self) -> Metrics {
        let counters = &self.perf_counters;
        let ipc = if counters.total_cycles > 0 {
            counters.committed_instructions as f64 / counters.total_cycles as f64
        } else {
            0.0
        };
        Metrics {
            total_instructions: counters.total_instructions,
            total_cycles: counters.total_cycles,
            bubble_cycles: counters.bubble_cycles,
            committed_instructions: counters.committed_instructions,
            ipc,
        }
    }

    pub(crate) fn get_state(&self) -> ProcessorState {
        let registers = (0..REG_COUNT)
            .map(|reg| RegisterSnapshot {
                name: register_name(reg),
                value: self.registers.get_value(reg),
                producer: self.registers.get_status(reg).map(|tag| tag.to_string()),
            })
            .collect();

        let reservation_stations = self
            .stations
            .iter()
            .map(|rs| StationSnapshot {
                name: rs.tag.to_string(),
                busy: rs.busy,
                op: rs.op.map(mnemonic),
                vj: match rs.source[0] {
                    Operand::Value(value) => Some(value),
                    _ => None,
                },
                vk: match rs.source[1] {
                    Operand::Value(value) => Some(value),
                    _ => None,
                },
                qj: match rs.source[0] {
                    Operand::Pending(tag) => Some(tag.to_string()),
                    _ => None,
                },
                qk: match rs.source[1] {
                    Operand::Pending(tag) => Some(tag.to_string()),
                    _ => None,
                },
                a: rs.addr,
                remaining_cycles: rs.remaining_cycles,
            })
            .collect();

        let reorder_buffer = self
            .rob
            .entries()
            .iter()
            .map(|slot| {
                slot.as_ref().map(|entry| ROBEntrySnapshot {
                    instruction: entry.instr.to_string(),
                    state: entry.state,
                    destination: entry.destination.map(register_name),
                    value: entry.value,
                    ready: entry.ready,
                })
            })
            .collect();

        ProcessorState {
            cycle: self.cycle,
            metrics: self.get_metrics(),
            registers,
            reservation_stations,
            reorder_buffer,
            is_finished: self.is_finished,
        }
    }
}
