//! Reverse-mode sweep over the tape.
//!
//! Nodes are visited from the root downwards in index order. Because an
//! operand always has a lower index than its consumer, every consumer of a node
//! is visited before the node itself pushes further.

use crate::{
    eval::eval,
    tape::{GradMode, TapeIndex, TapeNode, TapeValue, UnaryFnPayload},
};

pub(crate) fn backprop(nodes: &mut [TapeNode], root: TapeIndex, mode: GradMode) {
    for node in nodes.iter_mut() {
        node.set_grad(None);
    }
    nodes[root as usize].set_grad(Some(1.));

    let mut reached = 1;
    for idx in (1..=root).rev() {
        let Some(grad) = nodes[idx as usize].grad() else {
            continue;
        };
        for (target, contrib) in pushes(nodes, idx, grad).into_iter().flatten() {
            log::trace!("backprop: node {idx} -> node {target}: {contrib}");
            let node = &mut nodes[target as usize];
            let next = match (mode, node.grad()) {
                (GradMode::Accumulate, Some(prev)) => prev + contrib,
                (_, prev) => {
                    if prev.is_none() {
                        reached += 1;
                    }
                    contrib
                }
            };
            node.set_grad(Some(next));
        }
    }
    log::debug!(
        "backprop from node {root} ({mode:?}): {reached} of {} nodes reached",
        nodes.len()
    );
}

/// Gradient contributions of the node at `idx` to its operands.
fn pushes(nodes: &[TapeNode], idx: TapeIndex, grad: f64) -> [Option<(TapeIndex, f64)>; 2] {
    use TapeValue::*;
    match nodes[idx as usize].value() {
        Value(_) => [None, None],
        Add(lhs, rhs) => [Some((*lhs, grad)), Some((*rhs, grad))],
        Sub(lhs, rhs) => [Some((*lhs, grad)), Some((*rhs, -grad))],
        Mul(lhs, rhs) => [
            Some((*lhs, grad * eval(nodes, *rhs))),
            Some((*rhs, grad * eval(nodes, *lhs))),
        ],
        Div(lhs, rhs) => {
            let lhsv = eval(nodes, *lhs);
            let rhsv = eval(nodes, *rhs);
            [
                Some((*lhs, grad / rhsv)),
                Some((*rhs, -grad * lhsv / rhsv / rhsv)),
            ]
        }
        Neg(term) => [Some((*term, -grad)), None],
        UnaryFn(UnaryFnPayload { term, f }) => {
            [Some((*term, grad * f.grad(eval(nodes, *term)))), None]
        }
    }
}
