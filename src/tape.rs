//! Implementation of shared memory arena for the terms, aka a tape.
//! See https://rufflewind.com/2016-12-30/reverse-mode-automatic-differentiation
//!
//! Every node refers to its operands by index, and an operand is always
//! appended before the node that uses it. Insertion order is therefore a
//! topological order, which both the backward pass and the graph generator
//! rely on.

use std::{
    cell::{Cell, Ref, RefCell},
    fmt,
    rc::Rc,
};

use crate::{
    backprop::backprop, error::TapeError, eval::derive, eval::eval, gen_graph::gen_graph,
    term::TapeTerm, unary_fn::ClosureUnaryFn, UnaryFn,
};

/// Position of a node in the tape. It is assigned on append and never changes.
pub type TapeIndex = u32;

/// How the backward pass writes a gradient into an operand that already has one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GradMode {
    /// The latest push replaces the stored gradient. Gives correct results only
    /// when the graph reachable from the root is a tree; a node shared by two
    /// consumers keeps the contribution of the lower-id consumer only.
    #[default]
    Overwrite,
    /// Pushes are summed, which is correct for shared subexpressions (diamonds).
    Accumulate,
}

/// Binary arithmetic node kinds accepted by [`Tape::create_binary`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Unary arithmetic node kinds accepted by [`Tape::create_unary`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}

#[derive(Default, Debug)]
pub struct Tape {
    nodes: RefCell<Vec<TapeNode>>,
    grad_mode: Cell<GradMode>,
}

#[derive(Clone, Debug)]
pub struct TapeNode {
    name: String,
    value: TapeValue,
    grad: Option<f64>,
}

impl TapeNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &TapeValue {
        &self.value
    }

    /// Gradient left by the most recent backward pass, or `None` if the pass
    /// did not reach this node.
    pub fn grad(&self) -> Option<f64> {
        self.grad
    }

    pub(crate) fn set_grad(&mut self, grad: Option<f64>) {
        self.grad = grad;
    }

    /// Operand indices of this node, left first.
    pub fn parents(&self) -> [Option<TapeIndex>; 2] {
        self.value.operands()
    }
}

#[derive(Clone)]
pub struct UnaryFnPayload {
    pub term: TapeIndex,
    pub f: Rc<dyn UnaryFn>,
}

impl fmt::Debug for UnaryFnPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnaryFnPayload")
            .field("term", &self.term)
            .field("f", &self.f.name())
            .finish()
    }
}

#[derive(Clone, Debug)]
pub enum TapeValue {
    Value(f64),
    Add(TapeIndex, TapeIndex),
    Sub(TapeIndex, TapeIndex),
    Mul(TapeIndex, TapeIndex),
    Div(TapeIndex, TapeIndex),
    Neg(TapeIndex),
    UnaryFn(UnaryFnPayload),
}

impl TapeValue {
    pub fn operands(&self) -> [Option<TapeIndex>; 2] {
        use TapeValue::*;
        match *self {
            Value(_) => [None, None],
            Add(lhs, rhs) | Sub(lhs, rhs) | Mul(lhs, rhs) | Div(lhs, rhs) => {
                [Some(lhs), Some(rhs)]
            }
            Neg(term) | UnaryFn(UnaryFnPayload { term, .. }) => [Some(term), None],
        }
    }
}

pub(crate) fn check_index(nodes: &[TapeNode], id: TapeIndex) -> Result<(), TapeError> {
    if (id as usize) < nodes.len() {
        Ok(())
    } else {
        Err(TapeError::OutOfRangeId {
            id,
            len: nodes.len(),
        })
    }
}

pub(crate) fn check_operands(nodes: &[TapeNode], value: &TapeValue) -> Result<(), TapeError> {
    value
        .operands()
        .into_iter()
        .flatten()
        .try_for_each(|id| check_index(nodes, id))
}

#[cfg(feature = "expr_name")]
fn node_name(nodes: &[TapeNode], value: &TapeValue) -> String {
    use TapeValue::*;
    let name = |idx: &TapeIndex| nodes[*idx as usize].name.as_str();
    match value {
        Value(val) => format!("{val}"),
        Add(lhs, rhs) => format!("({} + {})", name(lhs), name(rhs)),
        Sub(lhs, rhs) => format!("({} - {})", name(lhs), name(rhs)),
        Mul(lhs, rhs) => format!("({} * {})", name(lhs), name(rhs)),
        Div(lhs, rhs) => format!("({} / {})", name(lhs), name(rhs)),
        Neg(term) => format!("-{}", name(term)),
        UnaryFn(UnaryFnPayload { term, f }) => format!("{}({})", f.name(), name(term)),
    }
}

#[cfg(not(feature = "expr_name"))]
fn node_name(nodes: &[TapeNode], _value: &TapeValue) -> String {
    format!("a{}", nodes.len())
}

/// Append without validating operands. Callers guarantee every operand is
/// already on the tape.
pub(crate) fn push_node(
    nodes: &mut Vec<TapeNode>,
    name: Option<String>,
    value: TapeValue,
) -> TapeIndex {
    let idx = nodes.len() as TapeIndex;
    let name = name.unwrap_or_else(|| node_name(nodes, &value));
    nodes.push(TapeNode {
        name,
        value,
        grad: None,
    });
    idx
}

fn add_checked(
    nodes: &mut Vec<TapeNode>,
    name: Option<String>,
    value: TapeValue,
) -> Result<TapeIndex, TapeError> {
    check_operands(nodes, &value)?;
    Ok(push_node(nodes, name, value))
}

/// Append a leaf value. Leaves have no operands, so this cannot fail.
pub fn add_value(nodes: &mut Vec<TapeNode>, name: impl Into<String>, val: f64) -> TapeIndex {
    push_node(nodes, Some(name.into()), TapeValue::Value(val))
}

pub fn add_add(
    nodes: &mut Vec<TapeNode>,
    lhs: TapeIndex,
    rhs: TapeIndex,
) -> Result<TapeIndex, TapeError> {
    add_checked(nodes, None, TapeValue::Add(lhs, rhs))
}

pub fn add_sub(
    nodes: &mut Vec<TapeNode>,
    lhs: TapeIndex,
    rhs: TapeIndex,
) -> Result<TapeIndex, TapeError> {
    add_checked(nodes, None, TapeValue::Sub(lhs, rhs))
}

pub fn add_mul(
    nodes: &mut Vec<TapeNode>,
    lhs: TapeIndex,
    rhs: TapeIndex,
) -> Result<TapeIndex, TapeError> {
    add_checked(nodes, None, TapeValue::Mul(lhs, rhs))
}

pub fn add_div(
    nodes: &mut Vec<TapeNode>,
    lhs: TapeIndex,
    rhs: TapeIndex,
) -> Result<TapeIndex, TapeError> {
    add_checked(nodes, None, TapeValue::Div(lhs, rhs))
}

pub fn add_neg(nodes: &mut Vec<TapeNode>, term: TapeIndex) -> Result<TapeIndex, TapeError> {
    add_checked(nodes, None, TapeValue::Neg(term))
}

pub fn add_unary_fn(
    nodes: &mut Vec<TapeNode>,
    f: Rc<dyn UnaryFn>,
    term: TapeIndex,
) -> Result<TapeIndex, TapeError> {
    add_checked(nodes, None, TapeValue::UnaryFn(UnaryFnPayload { term, f }))
}

impl Tape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grad_mode(grad_mode: GradMode) -> Self {
        Self {
            nodes: RefCell::new(vec![]),
            grad_mode: Cell::new(grad_mode),
        }
    }

    pub fn grad_mode(&self) -> GradMode {
        self.grad_mode.get()
    }

    pub fn set_grad_mode(&self, grad_mode: GradMode) {
        self.grad_mode.set(grad_mode);
    }

    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    /// Borrow the node list, e.g. to print or render it.
    ///
    /// The borrow must be released before the tape is modified again.
    pub fn nodes(&self) -> Ref<'_, [TapeNode]> {
        Ref::map(self.nodes.borrow(), |nodes| nodes.as_slice())
    }

    /// Create a leaf and return a term pointing to it.
    pub fn term<'a>(&'a self, name: impl Into<String>, init: f64) -> TapeTerm<'a> {
        let idx = self.create_leaf(name, init);
        TapeTerm::new(self, idx)
    }

    /// Return a term for an existing node.
    pub fn at(&self, idx: TapeIndex) -> Result<TapeTerm<'_>, TapeError> {
        check_index(&self.nodes.borrow(), idx)?;
        Ok(TapeTerm::new(self, idx))
    }

    pub fn create_leaf(&self, name: impl Into<String>, init: f64) -> TapeIndex {
        add_value(&mut self.nodes.borrow_mut(), name, init)
    }

    pub fn create_binary(
        &self,
        op: BinaryOp,
        lhs: TapeIndex,
        rhs: TapeIndex,
    ) -> Result<TapeIndex, TapeError> {
        let mut nodes = self.nodes.borrow_mut();
        match op {
            BinaryOp::Add => add_add(&mut nodes, lhs, rhs),
            BinaryOp::Sub => add_sub(&mut nodes, lhs, rhs),
            BinaryOp::Mul => add_mul(&mut nodes, lhs, rhs),
            BinaryOp::Div => add_div(&mut nodes, lhs, rhs),
        }
    }

    pub fn create_unary(&self, op: UnaryOp, term: TapeIndex) -> Result<TapeIndex, TapeError> {
        let mut nodes = self.nodes.borrow_mut();
        match op {
            UnaryOp::Neg => add_neg(&mut nodes, term),
        }
    }

    pub fn create_unary_fn(
        &self,
        term: TapeIndex,
        f: Box<dyn UnaryFn>,
    ) -> Result<TapeIndex, TapeError> {
        add_unary_fn(&mut self.nodes.borrow_mut(), Rc::from(f), term)
    }

    /// Create a node applying a function given as three callables: the function
    /// itself, its derivative, and a builder that appends the symbolic derivative.
    ///
    /// The builder receives the node list, the operand index, this node's index
    /// and the index of the operand's derivative graph.
    pub fn create_custom_unary<F, G, B>(
        &self,
        name: impl Into<String>,
        term: TapeIndex,
        f: F,
        grad: G,
        gen_graph: B,
    ) -> Result<TapeIndex, TapeError>
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
        let f = ClosureUnaryFn::new(name, f, grad, gen_graph);
        add_unary_fn(&mut self.nodes.borrow_mut(), Rc::new(f), term)
    }

    /// Overwrite the value of a leaf. Nodes depending on it see the new value
    /// on their next evaluation.
    pub fn set_leaf_value(&self, idx: TapeIndex, val: f64) -> Result<(), TapeError> {
        let mut nodes = self.nodes.borrow_mut();
        check_index(&nodes, idx)?;
        match &mut nodes[idx as usize].value {
            TapeValue::Value(v) => {
                *v = val;
                Ok(())
            }
            _ => Err(TapeError::WrongNodeKind { id: idx }),
        }
    }

    /// Returns the stored value if the node is a leaf.
    pub fn leaf_value(&self, idx: TapeIndex) -> Result<Option<f64>, TapeError> {
        let nodes = self.nodes.borrow();
        check_index(&nodes, idx)?;
        Ok(match nodes[idx as usize].value {
            TapeValue::Value(v) => Some(v),
            _ => None,
        })
    }

    pub fn label(&self, idx: TapeIndex) -> Result<String, TapeError> {
        let nodes = self.nodes.borrow();
        check_index(&nodes, idx)?;
        Ok(nodes[idx as usize].name.clone())
    }

    pub fn grad(&self, idx: TapeIndex) -> Result<Option<f64>, TapeError> {
        let nodes = self.nodes.borrow();
        check_index(&nodes, idx)?;
        Ok(nodes[idx as usize].grad)
    }

    pub fn eval(&self, idx: TapeIndex) -> Result<f64, TapeError> {
        let nodes = self.nodes.borrow();
        check_index(&nodes, idx)?;
        Ok(eval(&nodes, idx))
    }

    /// One-time derivation. Does not update internal gradient values.
    pub fn derive(&self, idx: TapeIndex, wrt: TapeIndex) -> Result<f64, TapeError> {
        let nodes = self.nodes.borrow();
        check_index(&nodes, idx)?;
        check_index(&nodes, wrt)?;
        Ok(derive(&nodes, idx, wrt))
    }

    /// Run a backward pass seeded at `root`, replacing every node's gradient.
    pub fn backprop(&self, root: TapeIndex) -> Result<(), TapeError> {
        let mut nodes = self.nodes.borrow_mut();
        check_index(&nodes, root)?;
        backprop(&mut nodes, root, self.grad_mode.get());
        Ok(())
    }

    /// Append the derivative graph of `idx` with respect to `wrt`.
    /// `Ok(None)` means `idx` does not depend on `wrt`.
    ///
    /// On error, nodes appended before the failing function node stay on the
    /// tape. They are unreachable from any returned index but still count in
    /// [`Self::len`].
    pub fn gen_graph(
        &self,
        idx: TapeIndex,
        wrt: TapeIndex,
    ) -> Result<Option<TapeIndex>, TapeError> {
        let mut nodes = self.nodes.borrow_mut();
        check_index(&nodes, idx)?;
        check_index(&nodes, wrt)?;
        gen_graph(&mut nodes, idx, wrt)
    }

    pub(crate) fn with_nodes_mut<R>(
        &self,
        f: impl FnOnce(&mut Vec<TapeNode>, GradMode) -> R,
    ) -> R {
        f(&mut self.nodes.borrow_mut(), self.grad_mode.get())
    }

    /// Internal append for terms, whose indices are always valid on their own tape.
    pub(crate) fn push(&self, value: TapeValue) -> TapeIndex {
        push_node(&mut self.nodes.borrow_mut(), None, value)
    }
}
