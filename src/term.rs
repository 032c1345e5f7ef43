use std::{
    fmt,
    ops::{Add, Div, Mul, Neg, Sub},
    rc::Rc,
};

use crate::{
    backprop::backprop,
    error::TapeError,
    eval::{derive, eval},
    gen_graph::gen_graph,
    tape::{Tape, TapeIndex, TapeNode, TapeValue, UnaryFnPayload},
    unary_fn::{builtin, PtrUnaryFn},
    UnaryFn,
};

/// A handle to a node in a [`Tape`]. It does not own anything, so it is `Copy`
/// and any number of terms may point to the same node.
#[derive(Copy, Clone)]
pub struct TapeTerm<'a> {
    tape: &'a Tape,
    idx: TapeIndex,
}

impl<'a> fmt::Debug for TapeTerm<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TapeTerm")
            .field("tape", &(self.tape as *const Tape))
            .field("idx", &self.idx)
            .finish()
    }
}

impl<'a> PartialEq for TapeTerm<'a> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tape, other.tape) && self.idx == other.idx
    }
}

impl<'a> TapeTerm<'a> {
    pub(crate) fn new(tape: &'a Tape, idx: TapeIndex) -> Self {
        Self { tape, idx }
    }

    fn same_tape(&self, rhs: &Self) {
        assert!(
            std::ptr::eq(self.tape, rhs.tape),
            "Terms from different tapes cannot be combined"
        );
    }

    fn binary(self, rhs: Self, value: TapeValue) -> Self {
        self.same_tape(&rhs);
        Self::new(self.tape, self.tape.push(value))
    }

    fn constant(self, val: f64) -> Self {
        self.tape.term(format!("{val}"), val)
    }

    pub fn idx(&self) -> TapeIndex {
        self.idx
    }

    pub fn tape(&self) -> &'a Tape {
        self.tape
    }

    pub fn name(&self) -> String {
        self.nodes()[self.idx as usize].name().to_string()
    }

    fn nodes(&self) -> std::cell::Ref<'a, [TapeNode]> {
        self.tape.nodes()
    }

    pub fn eval(&self) -> f64 {
        eval(&self.nodes(), self.idx)
    }

    /// One-time derivation. Does not update internal gradient values.
    pub fn derive(&self, var: &Self) -> f64 {
        self.same_tape(var);
        derive(&self.nodes(), self.idx, var.idx)
    }

    /// Assign gradients to every node this term depends on, with this term
    /// as the root. Gradients of other nodes are cleared.
    pub fn backprop(&self) {
        self.tape
            .with_nodes_mut(|nodes, mode| backprop(nodes, self.idx, mode));
    }

    /// Gradient from the last backward pass, `None` if the pass did not reach
    /// this node or none has been run.
    pub fn grad(&self) -> Option<f64> {
        self.nodes()[self.idx as usize].grad()
    }

    /// Overwrite the value of this term, which must be a leaf.
    pub fn set(&self, val: f64) -> Result<(), TapeError> {
        self.tape.set_leaf_value(self.idx, val)
    }

    /// Generate a new term representing the derivative of this term
    /// with respect to `var`. `None` means the derivative is constant zero.
    /// See [`Tape::gen_graph`] for what an error leaves on the tape.
    pub fn gen_graph(&self, var: &Self) -> Result<Option<Self>, TapeError> {
        self.same_tape(var);
        let ret = self
            .tape
            .with_nodes_mut(|nodes, _| gen_graph(nodes, self.idx, var.idx))?;
        Ok(ret.map(|idx| Self::new(self.tape, idx)))
    }

    /// Repeat [`Self::gen_graph`] `n` times to get the n-th derivative.
    /// `n == 0` returns this term.
    ///
    /// The node count grows quickly with `n`, roughly by a constant factor per
    /// order since products and quotients duplicate their operands' subgraphs.
    /// With the `expr_name` feature each label spells out its whole expression,
    /// so label memory grows faster still: ten orders of `exp(-(x * x))` give
    /// tens of thousands of nodes and megabytes of labels. Disable the feature
    /// for deep derivatives.
    pub fn gen_graph_n(&self, var: &Self, n: usize) -> Result<Option<Self>, TapeError> {
        let mut next = *self;
        for _ in 0..n {
            match next.gen_graph(var)? {
                Some(term) => next = term,
                None => return Ok(None),
            }
        }
        Ok(Some(next))
    }

    /// Apply a function without a symbolic derivative. Such a term supports
    /// `eval`, `derive` and `backprop`, but not `gen_graph`.
    pub fn apply(
        &self,
        name: &(impl AsRef<str> + ?Sized),
        f: fn(f64) -> f64,
        grad: fn(f64) -> f64,
    ) -> Self {
        self.apply_rc(Rc::new(PtrUnaryFn {
            name: name.as_ref().to_string(),
            f,
            grad,
        }))
    }

    pub fn apply_t(&self, f: Box<dyn UnaryFn>) -> Self {
        self.apply_rc(Rc::from(f))
    }

    /// Apply a function given as closures, see [`Tape::create_custom_unary`].
    pub fn apply_custom<F, G, B>(
        &self,
        name: impl Into<String>,
        f: F,
        grad: G,
        gen_graph: B,
    ) -> Result<Self, TapeError>
    where
        F: Fn(f64) -> f64 + 'static,
        G: Fn(f64) -> f64 + 'static,
        B: Fn(
                &mut Vec<TapeNode>,
                TapeIndex,
                TapeIndex,
                TapeIndex,
            ) -> Result<Option<TapeIndex>, TapeError>
            + 'static,
    {
        let idx = self
            .tape
            .create_custom_unary(name, self.idx, f, grad, gen_graph)?;
        Ok(Self::new(self.tape, idx))
    }

    fn apply_rc(&self, f: Rc<dyn UnaryFn>) -> Self {
        let value = TapeValue::UnaryFn(UnaryFnPayload { term: self.idx, f });
        Self::new(self.tape, self.tape.push(value))
    }

    pub fn exp(&self) -> Self {
        self.apply_rc(Rc::new(builtin::Exp))
    }

    pub fn sin(&self) -> Self {
        self.apply_rc(Rc::new(builtin::Sin))
    }

    pub fn cos(&self) -> Self {
        self.apply_rc(Rc::new(builtin::Cos))
    }

    pub fn ln(&self) -> Self {
        self.apply_rc(Rc::new(builtin::Ln))
    }

    pub fn sqrt(&self) -> Self {
        self.apply_rc(Rc::new(builtin::Sqrt))
    }

    pub fn tanh(&self) -> Self {
        self.apply_rc(Rc::new(builtin::Tanh))
    }
}

impl<'a> Add for TapeTerm<'a> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        self.binary(rhs, TapeValue::Add(self.idx, rhs.idx))
    }
}

impl<'a> Sub for TapeTerm<'a> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        self.binary(rhs, TapeValue::Sub(self.idx, rhs.idx))
    }
}

impl<'a> Mul for TapeTerm<'a> {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self::Output {
        self.binary(rhs, TapeValue::Mul(self.idx, rhs.idx))
    }
}

impl<'a> Div for TapeTerm<'a> {
    type Output = Self;
    fn div(self, rhs: Self) -> Self::Output {
        self.binary(rhs, TapeValue::Div(self.idx, rhs.idx))
    }
}

impl<'a> Neg for TapeTerm<'a> {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self::new(self.tape, self.tape.push(TapeValue::Neg(self.idx)))
    }
}

/// Mixed arithmetic with plain numbers, which become constant leaves.
macro_rules! impl_scalar_op {
    ($trait:ident, $method:ident) => {
        impl<'a> $trait<f64> for TapeTerm<'a> {
            type Output = Self;
            fn $method(self, rhs: f64) -> Self::Output {
                <TapeTerm<'a> as $trait<TapeTerm<'a>>>::$method(self, self.constant(rhs))
            }
        }

        impl<'a> $trait<TapeTerm<'a>> for f64 {
            type Output = TapeTerm<'a>;
            fn $method(self, rhs: TapeTerm<'a>) -> Self::Output {
                <TapeTerm<'a> as $trait<TapeTerm<'a>>>::$method(rhs.constant(self), rhs)
            }
        }
    };
}

impl_scalar_op!(Add, add);
impl_scalar_op!(Sub, sub);
impl_scalar_op!(Mul, mul);
impl_scalar_op!(Div, div);
