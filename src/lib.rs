//! Tape based automatic differentiation of scalar expressions.
//!
//! Expressions are recorded on a [`Tape`] through [`TapeTerm`] handles. A term
//! can be evaluated, derived numerically with respect to a leaf, used as the
//! root of a backward pass, or turned into a new term representing its
//! derivative, which in turn can be derived again.
//!
//! ```
//! use gradtape::Tape;
//!
//! let tape = Tape::new();
//! let x = tape.term("x", 0.5);
//! let y = (-(x * x)).exp();
//! let dy = y.gen_graph(&x).unwrap().unwrap();
//! let ddy = dy.gen_graph(&x).unwrap().unwrap();
//! assert!((dy.eval() - y.derive(&x)).abs() < 1e-12);
//! assert!((ddy.eval() - (4. * 0.25 - 2.) * y.eval()).abs() < 1e-12);
//! ```

mod backprop;
pub mod error;
mod eval;
mod gen_graph;
pub mod tape;
mod term;
pub mod unary_fn;

pub use error::TapeError;
pub use tape::{BinaryOp, GradMode, Tape, TapeIndex, TapeNode, TapeValue, UnaryOp};
pub use term::TapeTerm;
pub use unary_fn::UnaryFn;
