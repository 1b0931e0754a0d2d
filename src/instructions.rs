use std::collections::HashMap;
use std::fmt;

use regex::Regex;

use crate::errors::SimError;

pub(crate) type RegisterType = u16;
pub(crate) type WordType = i64;

// Two banks of 32 architectural registers: R0..R31 and F0..F31.
pub(crate) const REG_BANK_SIZE: RegisterType = 32;
pub(crate) const REG_COUNT: RegisterType = 2 * REG_BANK_SIZE;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Opcode {
    ADD,
    SUB,
    MUL,
    DIV,
    LD,
    ST,
    BEQ,
    BNE,
    J,
}

pub(crate) fn mnemonic(opcode: Opcode) -> &'static str {
    match opcode {
        Opcode::ADD => "ADD",
        Opcode::SUB => "SUB",
        Opcode::MUL => "MUL",
        Opcode::DIV => "DIV",
        Opcode::LD => "LD",
        Opcode::ST => "ST",
        Opcode::BEQ => "BEQ",
        Opcode::BNE => "BNE",
        Opcode::J => "J",
    }
}

pub(crate) fn get_opcode(mnemonic: &str) -> Option<Opcode> {
    let string = mnemonic.to_uppercase();

    match string.as_str() {
        "ADD" => Some(Opcode::ADD),
        "SUB" => Some(Opcode::SUB),
        "MUL" => Some(Opcode::MUL),
        "DIV" => Some(Opcode::DIV),
        "LD" => Some(Opcode::LD),
        "ST" => Some(Opcode::ST),
        "BEQ" => Some(Opcode::BEQ),
        "BNE" => Some(Opcode::BNE),
        "J" => Some(Opcode::J),
        _ => None,
    }
}

pub(crate) fn get_register(name: &str) -> Option<RegisterType> {
    let name_uppercased = name.to_uppercase();
    let mut chars = name_uppercased.chars();

    let bank_offset = match chars.next() {
        Some('R') => 0,
        Some('F') => REG_BANK_SIZE,
        _ => return None,
    };

    let reg: RegisterType = chars.as_str().parse().ok()?;
    if reg >= REG_BANK_SIZE {
        return None;
    }
    Some(bank_offset + reg)
}

pub(crate) fn register_name(reg: RegisterType) -> String {
    if reg < REG_BANK_SIZE {
        format!("R{}", reg)
    } else {
        format!("F{}", reg - REG_BANK_SIZE)
    }
}

/// One decoded instruction. Built once at program-load time and never
/// mutated afterwards; shared between the owning reservation station and the
/// reorder buffer entry through an `Rc`.
#[derive(Debug, Clone)]
pub(crate) struct Instruction {
    pub(crate) opcode: Opcode,
    pub(crate) dest: Option<RegisterType>,
    pub(crate) src1: Option<RegisterType>,
    pub(crate) src2: Option<RegisterType>,
    pub(crate) immediate: Option<WordType>,
    // cycles of execution once the operands are available
    pub(crate) latency: u8,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", mnemonic(self.opcode))?;

        match self.opcode {
            Opcode::ADD | Opcode::SUB | Opcode::MUL | Opcode::DIV => {
                write!(
                    f,
                    " {}, {}, {}",
                    register_name(self.dest.unwrap_or(0)),
                    register_name(self.src1.unwrap_or(0)),
                    register_name(self.src2.unwrap_or(0))
                )
            }
            Opcode::LD | Opcode::ST => {
                write!(
                    f,
                    " {}, {}({})",
                    register_name(self.dest.unwrap_or(0)),
                    self.immediate.unwrap_or(0),
                    register_name(self.src1.unwrap_or(0))
                )
            }
            Opcode::BEQ | Opcode::BNE => {
                write!(
                    f,
                    " {}, {}, {}",
                    register_name(self.src1.unwrap_or(0)),
                    register_name(self.src2.unwrap_or(0)),
                    self.immediate.unwrap_or(0)
                )
            }
            Opcode::J => write!(f, " {}", self.immediate.unwrap_or(0)),
        }
    }
}

/// Turns source lines into `Instruction`s. The latency table maps mnemonics
/// to cycle counts; anything not listed executes in 1 cycle.
pub(crate) struct InstructionFactory {
    mem_operand: Regex,
    latencies: HashMap<String, u8>,
}

impl InstructionFactory {
    pub(crate) fn new(latencies: &HashMap<String, u8>) -> InstructionFactory {
        InstructionFactory {
            // the imm(base) form of LD/ST, e.g. 0(R0) or -4(F2)
            mem_operand: Regex::new(r"^(-?\d+)\((\w+)\)$").unwrap(),
            latencies: latencies.clone(),
        }
    }

    pub(crate) fn create_instruction(&self, line: &str) -> Result<Instruction, SimError> {
        let cleaned = line.replace(',', " ");
        let tokens: Vec<&str> = cleaned.split_whitespace().collect();

        let op_token = match tokens.first() {
            Some(token) => *token,
            None => return Err(SimError::MalformedInstruction(line.trim().to_string())),
        };

        let opcode = match get_opcode(op_token) {
            Some(opcode) => opcode,
            None => {
                return Err(SimError::MalformedInstruction(format!(
                    "unrecognized opcode '{}'",
                    op_token
                )))
            }
        };

        let latency = self.latency_for(opcode);

        match opcode {
            Opcode::ADD | Opcode::SUB | Opcode::MUL | Opcode::DIV => {
                if tokens.len() != 4 {
                    return Err(Self::bad_line(line));
                }
                Ok(Instruction {
                    opcode,
                    dest: Some(Self::parse_register(tokens[1])?),
                    src1: Some(Self::parse_register(tokens[2])?),
                    src2: Some(Self::parse_register(tokens[3])?),
                    immediate: None,
                    latency,
                })
            }
            Opcode::LD | Opcode::ST => {
                if tokens.len() != 3 {
                    return Err(Self::bad_line(line));
                }
                let captures = match self.mem_operand.captures(tokens[2]) {
                    Some(captures) => captures,
                    None => return Err(Self::bad_line(line)),
                };
                Ok(Instruction {
                    opcode,
                    dest: Some(Self::parse_register(tokens[1])?),
                    src1: Some(Self::parse_register(&captures[2])?),
                    src2: None,
                    immediate: Some(Self::parse_immediate(&captures[1], line)?),
                    latency,
                })
            }
            Opcode::BEQ | Opcode::BNE => {
                if tokens.len() != 4 {
                    return Err(Self::bad_line(line));
                }
                Ok(Instruction {
                    opcode,
                    dest: None,
                    src1: Some(Self::parse_register(tokens[1])?),
                    src2: Some(Self::parse_register(tokens[2])?),
                    immediate: Some(Self::parse_immediate(tokens[3], line)?),
                    latency,
                })
            }
            Opcode::J => {
                if tokens.len() != 2 {
                    return Err(Self::bad_line(line));
                }
                Ok(Instruction {
                    opcode,
                    dest: None,
                    src1: None,
                    src2: None,
                    immediate: Some(Self::parse_immediate(tokens[1], line)?),
                    latency,
                })
            }
        }
    }

    fn latency_for(&self, opcode: Opcode) -> u8 {
        self.latencies.get(mnemonic(opcode)).copied().unwrap_or(1)
    }

    fn parse_register(token: &str) -> Result<RegisterType, SimError> {
        get_register(token).ok_or_else(|| SimError::UnknownRegister(token.to_string()))
    }

    fn parse_immediate(token: &str, line: &str) -> Result<WordType, SimError> {
        token.parse().map_err(|_| Self::bad_line(line))
    }

    fn bad_line(line: &str) -> SimError {
        SimError::MalformedInstruction(line.trim().to_string())
    }
}
