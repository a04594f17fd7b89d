use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AadError {
    #[error("Stale node: position {position} is not live on the active tape (len {len})")]
    StaleNode { position: usize, len: usize },
    #[error("Foreign node: handle belongs to tape {found}, active tape is {expected}")]
    ForeignNode { expected: u64, found: u64 },
    #[error("No output slots on node {0}: it was recorded in single-output mode")]
    NoOutputSlots(usize),
    #[error("Output {output} out of range: {outputs} outputs configured")]
    OutputOutOfRange { output: usize, outputs: usize },
    #[error("Output width mismatch on node {position}: expected {expected}, found {found}")]
    OutputWidthMismatch {
        position: usize,
        expected: usize,
        found: usize,
    },
    #[error("Invalid propagation range: from {from} to {to}")]
    InvalidRange { from: usize, to: usize },
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, AadError>;

impl From<AadError> for String {
    fn from(e: AadError) -> Self {
        e.to_string()
    }
}
