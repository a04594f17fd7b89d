//! number.rs  ―  eager reverse-mode AD number
//! Public API:  Number  +  free fns  exp, log, sqrt, fabs,
//! normal_dens, normal_cdf, pow, max, min  +  collection helpers.

use std::cmp::Ordering;
use std::fmt;
use std::ops::*;

use super::node::MAX_ARITY;
use super::tape::{NodeRef, Tape};
use crate::math::gaussians;
use crate::utils::errors::Result;

/* ═══════════════════════  HANDLE: Number  ═══════════════════════════ */

/// A value together with the node that recorded it on the active tape.
///
/// Every operation on a `Number` evaluates eagerly and appends one node
/// holding the partial derivatives of the result with respect to its
/// operands. A `Number` is only meaningful while its node is on the
/// active tape; rewinding past it invalidates the handle.
#[derive(Clone, Copy, Debug)]
pub struct Number {
    val: f64,
    node: NodeRef,
}

impl Number {
    /// A leaf on the active tape.
    pub fn new(v: f64) -> Self {
        let node = Tape::with_active_mut(|t| t.create_node(0));
        Self { val: v, node }
    }

    /* ---- accessors ---- */
    #[inline]
    pub fn value(&self) -> f64 {
        self.val
    }

    #[inline]
    pub fn node(&self) -> NodeRef {
        self.node
    }

    pub fn adjoint(&self) -> Result<f64> {
        Tape::with_active(|t| t.adjoint_of(self.node))
    }

    pub fn set_adjoint(&self, adj: f64) -> Result<()> {
        Tape::with_active_mut(|t| {
            *t.adjoint_of_mut(self.node)? = adj;
            Ok(())
        })
    }

    /// Adjoint for one output in multi-output mode.
    pub fn adjoint_at(&self, output: usize) -> Result<f64> {
        Tape::with_active(|t| {
            let position = t.resolve(self.node)?;
            t.adjoint_at(position, output)
        })
    }

    pub fn set_adjoint_at(&self, output: usize, adj: f64) -> Result<()> {
        Tape::with_active_mut(|t| {
            let position = t.resolve(self.node)?;
            *t.adjoint_at_mut(position, output)? = adj;
            Ok(())
        })
    }

    /* ---- tape helpers ---- */

    /// Record this number again as a fresh leaf, dropping its history.
    pub fn put_on_tape(&mut self) {
        self.node = Tape::with_active_mut(|t| t.create_node(0));
    }

    /// Overwrite the value; the number becomes a new leaf.
    pub fn assign(&mut self, v: f64) {
        self.val = v;
        self.put_on_tape();
    }

    fn record(val: f64, args: &[(NodeRef, f64)]) -> Self {
        let node = Tape::with_active_mut(|t| {
            let mut positions = [(0usize, 0.0); MAX_ARITY];
            for (slot, &(r, d)) in positions.iter_mut().zip(args) {
                if cfg!(any(debug_assertions, feature = "validate")) && t.find(r).is_none() {
                    panic!(
                        "operand node {} is not live on the active tape {}",
                        r.position(),
                        t.id()
                    );
                }
                *slot = (r.position(), d);
            }
            t.record(&positions[..args.len()])
        });
        Self { val, node }
    }

    /* ---- elementary functions ---- */
    #[inline]
    pub fn exp(self) -> Self {
        unary::<ExpOp>(self)
    }
    #[inline]
    pub fn ln(self) -> Self {
        unary::<LogOp>(self)
    }
    #[inline]
    pub fn sqrt(self) -> Self {
        unary::<SqrtOp>(self)
    }
    /// `|x|`, with derivative `+1` at exactly zero.
    #[inline]
    pub fn abs(self) -> Self {
        unary::<FabsOp>(self)
    }
    #[inline]
    pub fn sin(self) -> Self {
        unary::<SinOp>(self)
    }
    #[inline]
    pub fn cos(self) -> Self {
        unary::<CosOp>(self)
    }
    #[inline]
    pub fn normal_dens(self) -> Self {
        unary::<NormalDensOp>(self)
    }
    #[inline]
    pub fn normal_cdf(self) -> Self {
        unary::<NormalCdfOp>(self)
    }
    #[inline]
    pub fn powf<R: Operand>(self, rhs: R) -> Self {
        binary::<PowOp, _, _>(self, rhs)
    }
    #[inline]
    pub fn max<R: Operand>(self, rhs: R) -> Self {
        binary::<MaxOp, _, _>(self, rhs)
    }
    #[inline]
    pub fn min<R: Operand>(self, rhs: R) -> Self {
        binary::<MinOp, _, _>(self, rhs)
    }
}

/* ═══════════════════════  OPERANDS  ═════════════════════════════════ */

/// Anything that can sit on either side of an operation: a `Number`
/// (differentiable) or a plain `f64` (folded into the partials).
pub trait Operand: Copy {
    fn scalar(&self) -> f64;
    fn tape_node(&self) -> Option<NodeRef>;
}

impl Operand for Number {
    #[inline]
    fn scalar(&self) -> f64 {
        self.val
    }
    #[inline]
    fn tape_node(&self) -> Option<NodeRef> {
        Some(self.node)
    }
}

impl Operand for f64 {
    #[inline]
    fn scalar(&self) -> f64 {
        *self
    }
    #[inline]
    fn tape_node(&self) -> Option<NodeRef> {
        None
    }
}

/* ═════════════════════  OPERATOR “TYPE CLASSES”  ════════════════════ */

pub trait BinOp {
    fn eval(l: f64, r: f64) -> f64;
    fn d_left(l: f64, r: f64) -> f64;
    fn d_right(l: f64, r: f64) -> f64;
}

pub struct AddOp;
impl BinOp for AddOp {
    fn eval(l: f64, r: f64) -> f64 {
        l + r
    }
    fn d_left(_l: f64, _r: f64) -> f64 {
        1.0
    }
    fn d_right(_l: f64, _r: f64) -> f64 {
        1.0
    }
}

pub struct SubOp;
impl BinOp for SubOp {
    fn eval(l: f64, r: f64) -> f64 {
        l - r
    }
    fn d_left(_l: f64, _r: f64) -> f64 {
        1.0
    }
    fn d_right(_l: f64, _r: f64) -> f64 {
        -1.0
    }
}

pub struct MulOp;
impl BinOp for MulOp {
    fn eval(l: f64, r: f64) -> f64 {
        l * r
    }
    fn d_left(_l: f64, r: f64) -> f64 {
        r
    }
    fn d_right(l: f64, _r: f64) -> f64 {
        l
    }
}

pub struct DivOp;
impl BinOp for DivOp {
    fn eval(l: f64, r: f64) -> f64 {
        l / r
    }
    fn d_left(_l: f64, r: f64) -> f64 {
        1.0 / r
    }
    fn d_right(l: f64, r: f64) -> f64 {
        -l / (r * r)
    }
}

pub struct PowOp;
impl BinOp for PowOp {
    fn eval(l: f64, r: f64) -> f64 {
        l.powf(r)
    }
    fn d_left(l: f64, r: f64) -> f64 {
        r * l.powf(r - 1.0)
    }
    fn d_right(l: f64, r: f64) -> f64 {
        // 0^r is flat in r
        let v = l.powf(r);
        if v == 0.0 {
            0.0
        } else {
            v * l.ln()
        }
    }
}

/// Ties select the left operand.
pub struct MaxOp;
impl BinOp for MaxOp {
    fn eval(l: f64, r: f64) -> f64 {
        if l >= r {
            l
        } else {
            r
        }
    }
    fn d_left(l: f64, r: f64) -> f64 {
        if l >= r {
            1.0
        } else {
            0.0
        }
    }
    fn d_right(l: f64, r: f64) -> f64 {
        if l >= r {
            0.0
        } else {
            1.0
        }
    }
}

/// Ties select the left operand.
pub struct MinOp;
impl BinOp for MinOp {
    fn eval(l: f64, r: f64) -> f64 {
        if l <= r {
            l
        } else {
            r
        }
    }
    fn d_left(l: f64, r: f64) -> f64 {
        if l <= r {
            1.0
        } else {
            0.0
        }
    }
    fn d_right(l: f64, r: f64) -> f64 {
        if l <= r {
            0.0
        } else {
            1.0
        }
    }
}

pub trait UnOp {
    fn eval(x: f64) -> f64;
    /// Derivative at `x`, given the already computed value `v = eval(x)`.
    fn deriv(x: f64, v: f64) -> f64;
}

macro_rules! un_op {
    ($name:ident, $eval:expr, $d:expr) => {
        pub struct $name;
        impl UnOp for $name {
            fn eval(x: f64) -> f64 {
                $eval(x)
            }
            fn deriv(x: f64, v: f64) -> f64 {
                $d(x, v)
            }
        }
    };
}

un_op!(ExpOp, f64::exp, |_x: f64, v: f64| v);
un_op!(LogOp, f64::ln, |x: f64, _v: f64| 1.0 / x);
un_op!(SqrtOp, f64::sqrt, |_x: f64, v: f64| 0.5 / v);
un_op!(FabsOp, f64::abs, |x: f64, _v: f64| if x >= 0.0 { 1.0 } else { -1.0 });
un_op!(SinOp, f64::sin, |x: f64, _v: f64| f64::cos(x));
un_op!(CosOp, f64::cos, |x: f64, _v: f64| -f64::sin(x));
un_op!(NormalDensOp, gaussians::normal_dens, |x: f64, v: f64| -x * v);
un_op!(NormalCdfOp, gaussians::normal_cdf, |x: f64, _v: f64| gaussians::normal_dens(x));

/* ═══════════════════════  RECORDING  ════════════════════════════════ */

#[inline]
fn unary<O: UnOp>(x: Number) -> Number {
    let v = O::eval(x.val);
    Number::record(v, &[(x.node, O::deriv(x.val, v))])
}

/// Evaluate `O` and record one argument per differentiable operand.
#[inline]
fn binary<O: BinOp, L: Operand, R: Operand>(l: L, r: R) -> Number {
    let (lv, rv) = (l.scalar(), r.scalar());
    let v = O::eval(lv, rv);
    match (l.tape_node(), r.tape_node()) {
        (Some(ln), Some(rn)) => {
            Number::record(v, &[(ln, O::d_left(lv, rv)), (rn, O::d_right(lv, rv))])
        }
        (Some(ln), None) => Number::record(v, &[(ln, O::d_left(lv, rv))]),
        (None, Some(rn)) => Number::record(v, &[(rn, O::d_right(lv, rv))]),
        (None, None) => Number::new(v),
    }
}

/* ══════════════════════  OPERATOR OVERLOADS  ════════════════════════ */

macro_rules! impl_bin_op {
    ($Trait:ident, $func:ident, $Assign:ident, $afunc:ident, $Op:ty) => {
        impl $Trait<Number> for Number {
            type Output = Number;
            #[inline]
            fn $func(self, rhs: Number) -> Number {
                binary::<$Op, _, _>(self, rhs)
            }
        }
        impl $Trait<f64> for Number {
            type Output = Number;
            #[inline]
            fn $func(self, rhs: f64) -> Number {
                binary::<$Op, _, _>(self, rhs)
            }
        }
        impl $Trait<Number> for f64 {
            type Output = Number;
            #[inline]
            fn $func(self, rhs: Number) -> Number {
                binary::<$Op, _, _>(self, rhs)
            }
        }
        impl $Assign<Number> for Number {
            #[inline]
            fn $afunc(&mut self, rhs: Number) {
                *self = binary::<$Op, _, _>(*self, rhs);
            }
        }
        impl $Assign<f64> for Number {
            #[inline]
            fn $afunc(&mut self, rhs: f64) {
                *self = binary::<$Op, _, _>(*self, rhs);
            }
        }
    };
}

impl_bin_op!(Add, add, AddAssign, add_assign, AddOp);
impl_bin_op!(Sub, sub, SubAssign, sub_assign, SubOp);
impl_bin_op!(Mul, mul, MulAssign, mul_assign, MulOp);
impl_bin_op!(Div, div, DivAssign, div_assign, DivOp);

impl Neg for Number {
    type Output = Number;
    #[inline]
    fn neg(self) -> Number {
        binary::<SubOp, _, _>(0.0, self)
    }
}

/* ═══════════════════  PUBLIC MATH HELPERS (free fns)  ═══════════════ */

#[inline]
pub fn exp(x: Number) -> Number {
    x.exp()
}
#[inline]
pub fn log(x: Number) -> Number {
    x.ln()
}
#[inline]
pub fn sqrt(x: Number) -> Number {
    x.sqrt()
}
#[inline]
pub fn fabs(x: Number) -> Number {
    x.abs()
}
#[inline]
pub fn normal_dens(x: Number) -> Number {
    x.normal_dens()
}
#[inline]
pub fn normal_cdf(x: Number) -> Number {
    x.normal_cdf()
}
#[inline]
pub fn pow<L: Operand, R: Operand>(l: L, r: R) -> Number {
    binary::<PowOp, _, _>(l, r)
}
#[inline]
pub fn max<L: Operand, R: Operand>(l: L, r: R) -> Number {
    binary::<MaxOp, _, _>(l, r)
}
#[inline]
pub fn min<L: Operand, R: Operand>(l: L, r: R) -> Number {
    binary::<MinOp, _, _>(l, r)
}

/* ═══════════════════════  COMPARISONS  ══════════════════════════════ */

impl PartialEq for Number {
    fn eq(&self, o: &Self) -> bool {
        self.val == o.val
    }
}
impl PartialEq<f64> for Number {
    fn eq(&self, o: &f64) -> bool {
        self.val == *o
    }
}
impl PartialEq<Number> for f64 {
    fn eq(&self, o: &Number) -> bool {
        *self == o.val
    }
}
impl PartialOrd for Number {
    fn partial_cmp(&self, o: &Self) -> Option<Ordering> {
        self.val.partial_cmp(&o.val)
    }
}
impl PartialOrd<f64> for Number {
    fn partial_cmp(&self, o: &f64) -> Option<Ordering> {
        self.val.partial_cmp(o)
    }
}
impl PartialOrd<Number> for f64 {
    fn partial_cmp(&self, o: &Number) -> Option<Ordering> {
        self.partial_cmp(&o.val)
    }
}

/* ═══════════════════════  CONVERSIONS  ══════════════════════════════ */

impl From<f64> for Number {
    fn from(v: f64) -> Self {
        Number::new(v)
    }
}
impl From<f32> for Number {
    fn from(v: f32) -> Self {
        Number::new(v as f64)
    }
}
impl From<i32> for Number {
    fn from(v: i32) -> Self {
        Number::new(v as f64)
    }
}
impl From<Number> for f64 {
    fn from(n: Number) -> Self {
        n.val
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.val)
    }
}

/// Re-record every number of a collection as a fresh leaf.
pub fn put_on_tape<'a, I>(numbers: I)
where
    I: IntoIterator<Item = &'a mut Number>,
{
    numbers.into_iter().for_each(Number::put_on_tape);
}

pub fn to_numbers(values: &[f64]) -> Vec<Number> {
    values.iter().map(|&v| Number::new(v)).collect()
}

pub fn to_values(numbers: &[Number]) -> Vec<f64> {
    numbers.iter().map(Number::value).collect()
}
