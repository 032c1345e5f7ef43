use std::rc::Rc;

use crate::{
    error::TapeError,
    tape::{add_div, add_mul, add_neg, add_sub, add_unary_fn, add_value, TapeIndex, TapeNode},
};

/// A trait that represents an unary operation on a value.
/// It needs to implement a transformation of the value and its gradient.
pub trait UnaryFn {
    fn name(&self) -> String;
    fn f(&self, data: f64) -> f64;
    fn grad(&self, data: f64) -> f64;

    /// A method to generate a graph node that represents differentiation of this node.
    /// It takes input, this node and the input's derived node indices as the arguments.
    ///
    /// The default implementation reports that no symbolic derivative exists.
    fn gen_graph(
        &self,
        _nodes: &mut Vec<TapeNode>,
        _input: TapeIndex,
        output: TapeIndex,
        _derived: TapeIndex,
    ) -> Result<Option<TapeIndex>, TapeError> {
        Err(TapeError::NoSymbolicDerivative { id: output })
    }
}

pub(crate) struct PtrUnaryFn {
    pub name: String,
    pub f: fn(f64) -> f64,
    pub grad: fn(f64) -> f64,
}

impl UnaryFn for PtrUnaryFn {
    fn name(&self) -> String {
        self.name.clone()
    }
    fn f(&self, data: f64) -> f64 {
        (self.f)(data)
    }
    fn grad(&self, data: f64) -> f64 {
        (self.grad)(data)
    }
}

type GenGraphFn =
    dyn Fn(&mut Vec<TapeNode>, TapeIndex, TapeIndex, TapeIndex) -> Result<Option<TapeIndex>, TapeError>;

/// Adapts three closures to [`UnaryFn`].
pub(crate) struct ClosureUnaryFn {
    name: String,
    f: Box<dyn Fn(f64) -> f64>,
    grad: Box<dyn Fn(f64) -> f64>,
    gen_graph: Box<GenGraphFn>,
}

impl ClosureUnaryFn {
    pub(crate) fn new(
        name: impl Into<String>,
        f: impl Fn(f64) -> f64 + 'static,
        grad: impl Fn(f64) -> f64 + 'static,
        gen_graph: impl Fn(
                &mut Vec<TapeNode>,
                TapeIndex,
                TapeIndex,
                TapeIndex,
            ) -> Result<Option<TapeIndex>, TapeError>
            + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            f: Box::new(f),
            grad: Box::new(grad),
            gen_graph: Box::new(gen_graph),
        }
    }
}

impl UnaryFn for ClosureUnaryFn {
    fn name(&self) -> String {
        self.name.clone()
    }
    fn f(&self, data: f64) -> f64 {
        (self.f)(data)
    }
    fn grad(&self, data: f64) -> f64 {
        (self.grad)(data)
    }
    fn gen_graph(
        &self,
        nodes: &mut Vec<TapeNode>,
        input: TapeIndex,
        output: TapeIndex,
        derived: TapeIndex,
    ) -> Result<Option<TapeIndex>, TapeError> {
        (self.gen_graph)(nodes, input, output, derived)
    }
}

/// Elementary functions that know how to build their own derivative graphs,
/// so expressions using them can be differentiated any number of times.
pub mod builtin {
    use super::*;

    pub struct Exp;

    impl UnaryFn for Exp {
        fn name(&self) -> String {
            "exp".to_string()
        }
        fn f(&self, data: f64) -> f64 {
            data.exp()
        }
        fn grad(&self, data: f64) -> f64 {
            data.exp()
        }
        fn gen_graph(
            &self,
            nodes: &mut Vec<TapeNode>,
            _input: TapeIndex,
            output: TapeIndex,
            derived: TapeIndex,
        ) -> Result<Option<TapeIndex>, TapeError> {
            Ok(Some(add_mul(nodes, output, derived)?))
        }
    }

    pub struct Sin;

    impl UnaryFn for Sin {
        fn name(&self) -> String {
            "sin".to_string()
        }
        fn f(&self, data: f64) -> f64 {
            data.sin()
        }
        fn grad(&self, data: f64) -> f64 {
            data.cos()
        }
        fn gen_graph(
            &self,
            nodes: &mut Vec<TapeNode>,
            input: TapeIndex,
            _output: TapeIndex,
            derived: TapeIndex,
        ) -> Result<Option<TapeIndex>, TapeError> {
            let cos = add_unary_fn(nodes, Rc::new(Cos), input)?;
            Ok(Some(add_mul(nodes, cos, derived)?))
        }
    }

    pub struct Cos;

    impl UnaryFn for Cos {
        fn name(&self) -> String {
            "cos".to_string()
        }
        fn f(&self, data: f64) -> f64 {
            data.cos()
        }
        fn grad(&self, data: f64) -> f64 {
            -data.sin()
        }
        fn gen_graph(
            &self,
            nodes: &mut Vec<TapeNode>,
            input: TapeIndex,
            _output: TapeIndex,
            derived: TapeIndex,
        ) -> Result<Option<TapeIndex>, TapeError> {
            let sin = add_unary_fn(nodes, Rc::new(Sin), input)?;
            let neg_sin = add_neg(nodes, sin)?;
            Ok(Some(add_mul(nodes, neg_sin, derived)?))
        }
    }

    /// Natural logarithm.
    pub struct Ln;

    impl UnaryFn for Ln {
        fn name(&self) -> String {
            "ln".to_string()
        }
        fn f(&self, data: f64) -> f64 {
            data.ln()
        }
        fn grad(&self, data: f64) -> f64 {
            data.recip()
        }
        fn gen_graph(
            &self,
            nodes: &mut Vec<TapeNode>,
            input: TapeIndex,
            _output: TapeIndex,
            derived: TapeIndex,
        ) -> Result<Option<TapeIndex>, TapeError> {
            Ok(Some(add_div(nodes, derived, input)?))
        }
    }

    pub struct Sqrt;

    impl UnaryFn for Sqrt {
        fn name(&self) -> String {
            "sqrt".to_string()
        }
        fn f(&self, data: f64) -> f64 {
            data.sqrt()
        }
        fn grad(&self, data: f64) -> f64 {
            0.5 / data.sqrt()
        }
        fn gen_graph(
            &self,
            nodes: &mut Vec<TapeNode>,
            _input: TapeIndex,
            output: TapeIndex,
            derived: TapeIndex,
        ) -> Result<Option<TapeIndex>, TapeError> {
            let two = add_value(nodes, "2", 2.);
            let denom = add_mul(nodes, two, output)?;
            Ok(Some(add_div(nodes, derived, denom)?))
        }
    }

    pub struct Tanh;

    impl UnaryFn for Tanh {
        fn name(&self) -> String {
            "tanh".to_string()
        }
        fn f(&self, data: f64) -> f64 {
            data.tanh()
        }
        fn grad(&self, data: f64) -> f64 {
            let t = data.tanh();
            1. - t * t
        }
        fn gen_graph(
            &self,
            nodes: &mut Vec<TapeNode>,
            _input: TapeIndex,
            output: TapeIndex,
            derived: TapeIndex,
        ) -> Result<Option<TapeIndex>, TapeError> {
            let one = add_value(nodes, "1", 1.);
            let sq = add_mul(nodes, output, output)?;
            let sech2 = add_sub(nodes, one, sq)?;
            Ok(Some(add_mul(nodes, sech2, derived)?))
        }
    }
}
