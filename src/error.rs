use thiserror::Error;

use crate::tape::TapeIndex;

/// Errors raised by construction and mutation of the tape.
///
/// Numeric edge cases such as division by zero are never reported here;
/// they propagate through evaluation as ordinary IEEE values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TapeError {
    /// An operand id does not name a node that is already on the tape.
    #[error("node id {id} is out of range for a tape of {len} nodes")]
    OutOfRangeId { id: TapeIndex, len: usize },

    /// A leaf-only operation was applied to an operation node.
    #[error("node {id} is not a leaf value; cannot set value to non-leaf nodes")]
    WrongNodeKind { id: TapeIndex },

    /// The function applied at this node cannot build its own derivative graph.
    #[error("function at node {id} has no symbolic derivative")]
    NoSymbolicDerivative { id: TapeIndex },
}
