//! Forward evaluation and one-time derivation by structural recursion.
//!
//! Nothing is cached, so both functions always see the current leaf values.

use crate::tape::{TapeIndex, TapeNode, TapeValue, UnaryFnPayload};

pub(crate) fn eval(nodes: &[TapeNode], idx: TapeIndex) -> f64 {
    use TapeValue::*;
    match nodes[idx as usize].value() {
        Value(val) => *val,
        Add(lhs, rhs) => eval(nodes, *lhs) + eval(nodes, *rhs),
        Sub(lhs, rhs) => eval(nodes, *lhs) - eval(nodes, *rhs),
        Mul(lhs, rhs) => eval(nodes, *lhs) * eval(nodes, *rhs),
        Div(lhs, rhs) => eval(nodes, *lhs) / eval(nodes, *rhs),
        Neg(term) => -eval(nodes, *term),
        UnaryFn(UnaryFnPayload { term, f }) => f.f(eval(nodes, *term)),
    }
}

/// wrt - The variable to derive With Respect To
pub(crate) fn derive(nodes: &[TapeNode], idx: TapeIndex, wrt: TapeIndex) -> f64 {
    use TapeValue::*;
    match nodes[idx as usize].value() {
        Value(_) => {
            if idx == wrt {
                1.
            } else {
                0.
            }
        }
        Add(lhs, rhs) => derive(nodes, *lhs, wrt) + derive(nodes, *rhs, wrt),
        Sub(lhs, rhs) => derive(nodes, *lhs, wrt) - derive(nodes, *rhs, wrt),
        Mul(lhs, rhs) => {
            let dlhs = derive(nodes, *lhs, wrt);
            let drhs = derive(nodes, *rhs, wrt);
            eval(nodes, *lhs) * drhs + dlhs * eval(nodes, *rhs)
        }
        Div(lhs, rhs) => {
            let dlhs = derive(nodes, *lhs, wrt);
            let drhs = derive(nodes, *rhs, wrt);
            let lhs = eval(nodes, *lhs);
            let rhs = eval(nodes, *rhs);
            dlhs / rhs - lhs * drhs / rhs / rhs
        }
        Neg(term) => -derive(nodes, *term, wrt),
        UnaryFn(UnaryFnPayload { term, f }) => {
            derive(nodes, *term, wrt) * f.grad(eval(nodes, *term))
        }
    }
}
