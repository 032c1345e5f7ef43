use approx::assert_abs_diff_eq;
use gradtape::{
    tape::{add_mul, TapeIndex, TapeNode},
    BinaryOp, Tape, TapeError, UnaryFn, UnaryOp,
};

fn arithm(tape: &Tape) -> [TapeIndex; 5] {
    let a = tape.create_leaf("a", 1.);
    let b = tape.create_leaf("b", 2.);
    let c = tape.create_leaf("c", 42.);
    let ab = tape.create_binary(BinaryOp::Add, a, b).unwrap();
    let abc = tape.create_binary(BinaryOp::Mul, ab, c).unwrap();
    [a, b, c, ab, abc]
}

#[test]
fn arithm_eval_and_derive() {
    let tape = Tape::new();
    let [a, b, c, _, abc] = arithm(&tape);
    assert_eq!(tape.eval(abc), Ok(126.));
    assert_eq!(tape.derive(abc, a), Ok(42.));
    assert_eq!(tape.derive(abc, b), Ok(42.));
    assert_eq!(tape.derive(abc, c), Ok(3.));
}

#[test]
fn arithm_backprop() {
    let tape = Tape::new();
    let [a, b, c, ab, abc] = arithm(&tape);
    for idx in 0..tape.len() as TapeIndex {
        assert_eq!(tape.grad(idx), Ok(None));
    }
    tape.backprop(abc).unwrap();
    assert_eq!(tape.grad(abc), Ok(Some(1.)));
    assert_eq!(tape.grad(a), Ok(Some(42.)));
    assert_eq!(tape.grad(b), Ok(Some(42.)));
    assert_eq!(tape.grad(c), Ok(Some(3.)));
    assert_eq!(tape.grad(ab), Ok(Some(42.)));
}

#[test]
fn arithm_with_terms() {
    let tape = Tape::new();
    let a = tape.term("a", 1.);
    let b = tape.term("b", 2.);
    let ab = a + b;
    let c = tape.term("c", 42.);
    let abc = ab * c;
    abc.backprop();
    assert_eq!(abc.eval(), 126.);
    assert_eq!(ab.grad(), Some(42.));
    assert_eq!(c.grad(), Some(3.));

    let d = tape.term("d", 2.);
    let abcd = abc / d;
    assert_eq!(abcd.derive(&c), 1.5);
    assert_eq!(abcd.derive(&d), -31.5);
}

#[test]
fn errors_on_bad_ids() {
    let tape = Tape::new();
    let [a, _, _, ab, _] = arithm(&tape);
    let len = tape.len();
    assert_eq!(
        tape.create_binary(BinaryOp::Sub, a, 99),
        Err(TapeError::OutOfRangeId { id: 99, len })
    );
    assert_eq!(
        tape.create_unary(UnaryOp::Neg, 99),
        Err(TapeError::OutOfRangeId { id: 99, len })
    );
    assert_eq!(
        tape.set_leaf_value(ab, 0.),
        Err(TapeError::WrongNodeKind { id: ab })
    );
    assert!(tape.eval(99).is_err());
    assert!(tape.backprop(99).is_err());
    assert!(tape.gen_graph(ab, 99).is_err());
    assert_eq!(tape.len(), len);
}

fn derive_exp(
    nodes: &mut Vec<TapeNode>,
    _input: TapeIndex,
    output: TapeIndex,
    derived: TapeIndex,
) -> Result<Option<TapeIndex>, TapeError> {
    Ok(Some(add_mul(nodes, output, derived)?))
}

#[test]
fn gaussian_custom_unary() {
    let tape = Tape::new();
    let x = tape.term("x", 0.);
    let sigma = tape.term("sigma", 1.);
    let arg = -(x * x / (sigma * sigma));
    let term = arg.apply_custom("exp", f64::exp, f64::exp, derive_exp).unwrap();
    assert_eq!(term.eval(), 1.);
    assert_eq!(term.derive(&x), 0.);

    let dterm = term.gen_graph(&x).unwrap().unwrap();
    for ix in -20..=20 {
        let xval = ix as f64 / 10.;
        x.set(xval).unwrap();
        let expected = -2. * xval * (-xval * xval).exp();
        assert_abs_diff_eq!(term.eval(), (-xval * xval).exp(), epsilon = 1e-12);
        assert_abs_diff_eq!(term.derive(&x), expected, epsilon = 1e-12);
        assert_abs_diff_eq!(dterm.eval(), expected, epsilon = 1e-12);
    }
}

struct SinFn(usize);

impl UnaryFn for SinFn {
    fn name(&self) -> String {
        ["sin", "cos", "-sin", "-cos"][self.0 % 4].to_string()
    }

    fn f(&self, data: f64) -> f64 {
        match self.0 % 4 {
            0 => data.sin(),
            1 => data.cos(),
            2 => -data.sin(),
            _ => -data.cos(),
        }
    }

    fn grad(&self, data: f64) -> f64 {
        Self(self.0 + 1).f(data)
    }

    fn gen_graph(
        &self,
        nodes: &mut Vec<TapeNode>,
        input: TapeIndex,
        _output: TapeIndex,
        derived: TapeIndex,
    ) -> Result<Option<TapeIndex>, TapeError> {
        let next = gradtape::tape::add_unary_fn(nodes, std::rc::Rc::new(Self(self.0 + 1)), input)?;
        Ok(Some(add_mul(nodes, next, derived)?))
    }
}

#[test]
fn higher_order_trait_fn() {
    let tape = Tape::new();
    let a = tape.term("a", 1.23);
    let sin_a = a.apply_t(Box::new(SinFn(0)));
    let d4 = sin_a.gen_graph_n(&a, 4).unwrap().unwrap();
    for i in -10..10 {
        let x = i as f64 * 0.3;
        a.set(x).unwrap();
        assert_abs_diff_eq!(d4.eval(), x.sin(), epsilon = 1e-12);
    }
}

#[test]
fn builtin_higher_order() {
    let tape = Tape::new();
    let x = tape.term("x", 0.8);
    let cases = [
        (x.sin(), -(0.8f64).cos()),
        (x.cos(), (0.8f64).sin()),
        (x.exp(), (0.8f64).exp()),
        (x.ln(), 2. / 0.8f64.powi(3)),
        (x.sqrt(), 0.375 * 0.8f64.powf(-2.5)),
    ];
    for (f, d3) in cases {
        let g = f.gen_graph_n(&x, 3).unwrap().unwrap();
        assert_abs_diff_eq!(g.eval(), d3, epsilon = 1e-9);
    }

    let t = x.tanh();
    let d1 = t.gen_graph(&x).unwrap().unwrap();
    let sech2 = 1. / 0.8f64.cosh().powi(2);
    assert_abs_diff_eq!(d1.eval(), sech2, epsilon = 1e-12);
    let d2 = d1.gen_graph(&x).unwrap().unwrap();
    assert_abs_diff_eq!(d2.eval(), -2. * 0.8f64.tanh() * sech2, epsilon = 1e-12);
}

#[test]
fn polynomial_derivatives_vanish() {
    let tape = Tape::new();
    let x = tape.term("x", 2.);
    let y = x * x * x;
    let d3 = y.gen_graph_n(&x, 3).unwrap().unwrap();
    assert_eq!(d3.eval(), 6.);
    assert_eq!(y.gen_graph_n(&x, 4).unwrap(), None);
    assert_eq!(y.gen_graph_n(&x, 0).unwrap(), Some(y));
}

#[test]
fn generated_graph_backprop() {
    let tape = Tape::new();
    let a = tape.term("a", 1.23);
    let b = tape.term("b", 3.21);
    let exp_ab = (a * b).exp();
    let d_exp_ab = exp_ab.gen_graph(&a).unwrap().unwrap();
    // d/da (b * exp(ab)) at the same point, through the generated graph.
    d_exp_ab.backprop();
    let expected = b.eval() * b.eval() * (a.eval() * b.eval()).exp();
    assert_abs_diff_eq!(d_exp_ab.derive(&a), expected, epsilon = 1e-9);
    assert_abs_diff_eq!(a.grad().unwrap(), expected, epsilon = 1e-9);
}
