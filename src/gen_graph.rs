//! Symbolic differentiation: append a subgraph whose value is the derivative
//! of another node.
//!
//! `None` stands for a derivative that is identically zero. It lets the
//! generator drop whole branches instead of building `0 * x` style nodes.
//! The result of a generation is an ordinary node, so it can be evaluated,
//! backpropagated or differentiated again.

use crate::{
    error::TapeError,
    tape::{
        add_add, add_div, add_mul, add_neg, add_sub, add_value, check_index, TapeIndex,
        TapeNode, TapeValue, UnaryFnPayload,
    },
};

pub(crate) fn gen_graph(
    nodes: &mut Vec<TapeNode>,
    idx: TapeIndex,
    wrt: TapeIndex,
) -> Result<Option<TapeIndex>, TapeError> {
    let len = nodes.len();
    let ret = gen_graph_rec(nodes, idx, wrt)?;
    log::debug!(
        "gen_graph(node {idx} wrt {wrt}): {} nodes appended, result {ret:?}",
        nodes.len() - len
    );
    Ok(ret)
}

fn gen_graph_rec(
    nodes: &mut Vec<TapeNode>,
    idx: TapeIndex,
    wrt: TapeIndex,
) -> Result<Option<TapeIndex>, TapeError> {
    use TapeValue::*;
    let ret = match nodes[idx as usize].value().clone() {
        Value(_) => {
            if idx == wrt {
                Some(add_value(nodes, "1", 1.))
            } else {
                None
            }
        }
        Add(lhs, rhs) => {
            let dlhs = gen_graph_rec(nodes, lhs, wrt)?;
            let drhs = gen_graph_rec(nodes, rhs, wrt)?;
            match (dlhs, drhs) {
                (Some(dlhs), None) => Some(dlhs),
                (None, Some(drhs)) => Some(drhs),
                (Some(dlhs), Some(drhs)) => Some(add_add(nodes, dlhs, drhs)?),
                (None, None) => None,
            }
        }
        Sub(lhs, rhs) => {
            let dlhs = gen_graph_rec(nodes, lhs, wrt)?;
            let drhs = gen_graph_rec(nodes, rhs, wrt)?;
            match (dlhs, drhs) {
                (Some(dlhs), None) => Some(dlhs),
                (None, Some(drhs)) => Some(add_neg(nodes, drhs)?),
                (Some(dlhs), Some(drhs)) => Some(add_sub(nodes, dlhs, drhs)?),
                (None, None) => None,
            }
        }
        Mul(lhs, rhs) => {
            let dlhs = gen_graph_rec(nodes, lhs, wrt)?;
            let drhs = gen_graph_rec(nodes, rhs, wrt)?;
            match (dlhs, drhs) {
                (Some(dlhs), None) => Some(add_mul(nodes, dlhs, rhs)?),
                (None, Some(drhs)) => Some(add_mul(nodes, lhs, drhs)?),
                (Some(dlhs), Some(drhs)) => {
                    let plhs = add_mul(nodes, dlhs, rhs)?;
                    let prhs = add_mul(nodes, lhs, drhs)?;
                    Some(add_add(nodes, plhs, prhs)?)
                }
                (None, None) => None,
            }
        }
        Div(lhs, rhs) => {
            let dlhs = gen_graph_rec(nodes, lhs, wrt)?;
            let drhs = gen_graph_rec(nodes, rhs, wrt)?;
            match (dlhs, drhs) {
                (Some(dlhs), None) => Some(add_div(nodes, dlhs, rhs)?),
                (None, Some(drhs)) => {
                    let prhs = quotient_rhs(nodes, lhs, rhs, drhs)?;
                    Some(add_neg(nodes, prhs)?)
                }
                (Some(dlhs), Some(drhs)) => {
                    let plhs = add_div(nodes, dlhs, rhs)?;
                    let prhs = quotient_rhs(nodes, lhs, rhs, drhs)?;
                    Some(add_sub(nodes, plhs, prhs)?)
                }
                (None, None) => None,
            }
        }
        Neg(term) => match gen_graph_rec(nodes, term, wrt)? {
            Some(dterm) => Some(add_neg(nodes, dterm)?),
            None => None,
        },
        UnaryFn(UnaryFnPayload { term, f }) => match gen_graph_rec(nodes, term, wrt)? {
            Some(derived) => {
                let ret = f.gen_graph(nodes, term, idx, derived)?;
                if let Some(ret) = ret {
                    check_index(nodes, ret)?;
                }
                ret
            }
            None => None,
        },
    };
    if let Some(ret) = ret {
        log::trace!("gen_graph: d[{idx}]/d[{wrt}] -> node {ret}");
    }
    Ok(ret)
}

/// `lhs * drhs / rhs / rhs`, the second half of the quotient rule.
fn quotient_rhs(
    nodes: &mut Vec<TapeNode>,
    lhs: TapeIndex,
    rhs: TapeIndex,
    drhs: TapeIndex,
) -> Result<TapeIndex, TapeError> {
    let num = add_mul(nodes, lhs, drhs)?;
    let once = add_div(nodes, num, rhs)?;
    add_div(nodes, once, rhs)
}
