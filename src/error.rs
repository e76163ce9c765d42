use thiserror::Error;

// Unified error type for gstrs

#[derive(Error, Debug)]
pub enum GsError {
    #[error("illegal value for argument {arg}: {reason}")]
    InvalidArgument { arg: i32, reason: String },
    #[error("invalid process grid: {0}")]
    InvalidGrid(String),
    #[error("inconsistent factor structure: {0}")]
    Structure(String),
    #[error("zero pivot at row {0}")]
    ZeroPivot(usize),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("communication failure: {0}")]
    Comm(String),
    #[error("allocation failure: {0}")]
    Allocation(String),
}

impl GsError {
    pub(crate) fn invalid(arg: i32, reason: impl Into<String>) -> Self {
        GsError::InvalidArgument { arg, reason: reason.into() }
    }

    /// Integer status code: `-arg` for an illegal argument, `row + 1` for a
    /// zero pivot, `i32::MAX` for every other failure.
    pub fn info(&self) -> i32 {
        match self {
            GsError::InvalidArgument { arg, .. } => -arg,
            GsError::ZeroPivot(row) => i32::try_from(*row).map_or(i32::MAX, |r| r.saturating_add(1)),
            _ => i32::MAX,
        }
    }
}
