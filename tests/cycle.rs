//! Dependency graphs in diamond shape. A node consumed twice should receive
//! the sum of both contributions, which only the accumulating mode delivers.

use gradtape::{GradMode, Tape};

#[test]
fn diamond_accumulate() {
    let tape = Tape::with_grad_mode(GradMode::Accumulate);
    let a = tape.term("a", 1.);
    let b = tape.term("b", 3.);
    let c = tape.term("c", 5.);
    let ab = a + b;
    let ac = a + c;
    let abac = ab + ac;

    abac.backprop();
    assert_eq!(a.grad(), Some(2.));
    assert_eq!(b.grad(), Some(1.));
    assert_eq!(c.grad(), Some(1.));
    assert_eq!(abac.derive(&a), 2.);
}

#[test]
fn diamond_overwrite_keeps_last_push() {
    let tape = Tape::new();
    assert_eq!(tape.grad_mode(), GradMode::Overwrite);
    let a = tape.term("a", 1.);
    let a2 = -a;
    let b = tape.term("b", 3.);
    let c = tape.term("c", 5.);
    let ab = a2 + b;
    let ac = a2 + c;
    let abac = ab + ac;

    abac.backprop();
    assert_eq!(abac.grad(), Some(1.));
    assert_eq!(a2.grad(), Some(1.));
    assert_eq!(a.grad(), Some(-1.));
    assert_eq!(abac.derive(&a), -2.);

    tape.set_grad_mode(GradMode::Accumulate);
    abac.backprop();
    assert_eq!(a2.grad(), Some(2.));
    assert_eq!(a.grad(), Some(-2.));
}
