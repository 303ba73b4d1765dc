use crate::heap::HeapError;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TableError {
    /// The heap refused a string or a backing array. Membership is unchanged.
    #[error("out of memory: {requested} bytes requested")]
    OutOfMemory { requested: usize },
    /// The caller passed a string the collector already reclaimed.
    #[error("string was reclaimed before it could be interned")]
    DanglingReference,
}

impl From<HeapError> for TableError {
    fn from(e: HeapError) -> Self {
        match e {
            HeapError::OutOfMemory { requested } => TableError::OutOfMemory { requested },
        }
    }
}
