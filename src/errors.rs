use thiserror::Error;

/// Fault taxonomy of the simulation engine.
///
/// `RobFull` is not a fault in the usual sense: issue treats it as a
/// structural-hazard stall and retries on a later cycle. The variant exists
/// so a caller bypassing the capacity check gets a typed refusal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub(crate) enum SimError {
    #[error("malformed instruction: {0}")]
    MalformedInstruction(String),

    #[error("unknown register '{0}'")]
    UnknownRegister(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("reorder buffer is full")]
    RobFull,
}
