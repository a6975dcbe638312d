use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error(
        "dimension mismatch in {op}: lhs is {}x{}, rhs is {}x{}",
        .lhs.0, .lhs.1, .rhs.0, .rhs.1
    )]
    DimensionMismatch {
        op: &'static str,
        lhs: (usize, usize),
        rhs: (usize, usize),
    },

    #[error(
        "invalid layer chain: layer {layer} outputs {out_dim} \
         but the next layer expects {next_in_dim}"
    )]
    InvalidLayerChain {
        layer: usize,
        out_dim: usize,
        next_in_dim: usize,
    },

    #[error("cannot build batches of size {batch_size} over {len} rows")]
    EmptyBatchSet { batch_size: usize, len: usize },

    #[error("{op} misused: {reason}")]
    StateMisuse {
        op: &'static str,
        reason: &'static str,
    },

    #[error("row index {index} out of range for {len} rows")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("non-finite value produced by {op}")]
    NonFinite { op: &'static str },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("parse error at line {line}: {msg}")]
    Parse { line: usize, msg: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
