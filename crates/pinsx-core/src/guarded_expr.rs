use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Expression tree as written in a `.gcm` definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Const(i64),
    Var(String),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Rem(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    Le(Box<Expr>, Box<Expr>),
    Gt(Box<Expr>, Box<Expr>),
    Ge(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Ite(Box<Expr>, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Expression with variables resolved to payload slot indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledExpr {
    Const(i64),
    Slot(usize),
    Unary(UnaryOp, Box<CompiledExpr>),
    Binary(BinaryOp, Box<CompiledExpr>, Box<CompiledExpr>),
    Ite(Box<CompiledExpr>, Box<CompiledExpr>, Box<CompiledExpr>),
}

impl Expr {
    pub fn compile(&self, slots: &HashMap<String, usize>) -> Result<CompiledExpr, ProviderError> {
        let binary = |op, lhs: &Expr, rhs: &Expr| -> Result<CompiledExpr, ProviderError> {
            Ok(CompiledExpr::Binary(
                op,
                Box::new(lhs.compile(slots)?),
                Box::new(rhs.compile(slots)?),
            ))
        };

        match self {
            Expr::Const(value) => Ok(CompiledExpr::Const(*value)),
            Expr::Var(name) => slots
                .get(name)
                .map(|&slot| CompiledExpr::Slot(slot))
                .ok_or_else(|| ProviderError::model_load(format!("unknown variable `{name}`"))),
            Expr::Not(inner) => Ok(CompiledExpr::Unary(
                UnaryOp::Not,
                Box::new(inner.compile(slots)?),
            )),
            Expr::Neg(inner) => Ok(CompiledExpr::Unary(
                UnaryOp::Neg,
                Box::new(inner.compile(slots)?),
            )),
            Expr::Add(lhs, rhs) => binary(BinaryOp::Add, lhs, rhs),
            Expr::Sub(lhs, rhs) => binary(BinaryOp::Sub, lhs, rhs),
            Expr::Mul(lhs, rhs) => binary(BinaryOp::Mul, lhs, rhs),
            Expr::Div(lhs, rhs) => binary(BinaryOp::Div, lhs, rhs),
            Expr::Rem(lhs, rhs) => binary(BinaryOp::Rem, lhs, rhs),
            Expr::Eq(lhs, rhs) => binary(BinaryOp::Eq, lhs, rhs),
            Expr::Ne(lhs, rhs) => binary(BinaryOp::Ne, lhs, rhs),
            Expr::Lt(lhs, rhs) => binary(BinaryOp::Lt, lhs, rhs),
            Expr::Le(lhs, rhs) => binary(BinaryOp::Le, lhs, rhs),
            Expr::Gt(lhs, rhs) => binary(BinaryOp::Gt, lhs, rhs),
            Expr::Ge(lhs, rhs) => binary(BinaryOp::Ge, lhs, rhs),
            Expr::And(lhs, rhs) => binary(BinaryOp::And, lhs, rhs),
            Expr::Or(lhs, rhs) => binary(BinaryOp::Or, lhs, rhs),
            Expr::Ite(cond, then, otherwise) => Ok(CompiledExpr::Ite(
                Box::new(cond.compile(slots)?),
                Box::new(then.compile(slots)?),
                Box::new(otherwise.compile(slots)?),
            )),
        }
    }
}

impl CompiledExpr {
    pub fn eval(&self, state: &[i32]) -> Result<i64, ProviderError> {
        match self {
            CompiledExpr::Const(value) => Ok(*value),
            CompiledExpr::Slot(slot) => state.get(*slot).map(|&value| i64::from(value)).ok_or_else(|| {
                ProviderError::malformed(format!("slot {slot} missing from a {}-slot state", state.len()))
            }),
            CompiledExpr::Unary(UnaryOp::Not, inner) => Ok(i64::from(inner.eval(state)? == 0)),
            CompiledExpr::Unary(UnaryOp::Neg, inner) => inner
                .eval(state)?
                .checked_neg()
                .ok_or_else(|| ProviderError::evaluation("integer overflow in negation")),
            // Short-circuit so guards like `x != 0 && y / x > 1` stay total.
            CompiledExpr::Binary(BinaryOp::And, lhs, rhs) => {
                Ok(i64::from(lhs.eval(state)? != 0 && rhs.eval(state)? != 0))
            }
            CompiledExpr::Binary(BinaryOp::Or, lhs, rhs) => {
                Ok(i64::from(lhs.eval(state)? != 0 || rhs.eval(state)? != 0))
            }
            CompiledExpr::Binary(op, lhs, rhs) => apply(*op, lhs.eval(state)?, rhs.eval(state)?),
            CompiledExpr::Ite(cond, then, otherwise) => {
                if cond.eval(state)? != 0 {
                    then.eval(state)
                } else {
                    otherwise.eval(state)
                }
            }
        }
    }

    pub fn holds(&self, state: &[i32]) -> Result<bool, ProviderError> {
        Ok(self.eval(state)? != 0)
    }

    pub fn collect_reads(&self, reads: &mut BTreeSet<usize>) {
        match self {
            CompiledExpr::Const(_) => {}
            CompiledExpr::Slot(slot) => {
                reads.insert(*slot);
            }
            CompiledExpr::Unary(_, inner) => inner.collect_reads(reads),
            CompiledExpr::Binary(_, lhs, rhs) => {
                lhs.collect_reads(reads);
                rhs.collect_reads(reads);
            }
            CompiledExpr::Ite(cond, then, otherwise) => {
                cond.collect_reads(reads);
                then.collect_reads(reads);
                otherwise.collect_reads(reads);
            }
        }
    }

    pub fn reads(&self) -> BTreeSet<usize> {
        let mut reads = BTreeSet::new();
        self.collect_reads(&mut reads);
        reads
    }
}

fn apply(op: BinaryOp, lhs: i64, rhs: i64) -> Result<i64, ProviderError> {
    let overflow = || ProviderError::evaluation(format!("integer overflow in {lhs} {op:?} {rhs}"));
    match op {
        BinaryOp::Add => lhs.checked_add(rhs).ok_or_else(overflow),
        BinaryOp::Sub => lhs.checked_sub(rhs).ok_or_else(overflow),
        BinaryOp::Mul => lhs.checked_mul(rhs).ok_or_else(overflow),
        BinaryOp::Div | BinaryOp::Rem if rhs == 0 => {
            Err(ProviderError::evaluation(format!("division by zero in {lhs} {op:?} 0")))
        }
        BinaryOp::Div => lhs.checked_div(rhs).ok_or_else(overflow),
        BinaryOp::Rem => lhs.checked_rem(rhs).ok_or_else(overflow),
        BinaryOp::Eq => Ok(i64::from(lhs == rhs)),
        BinaryOp::Ne => Ok(i64::from(lhs != rhs)),
        BinaryOp::Lt => Ok(i64::from(lhs < rhs)),
        BinaryOp::Le => Ok(i64::from(lhs <= rhs)),
        BinaryOp::Gt => Ok(i64::from(lhs > rhs)),
        BinaryOp::Ge => Ok(i64::from(lhs >= rhs)),
        BinaryOp::And => Ok(i64::from(lhs != 0 && rhs != 0)),
        BinaryOp::Or => Ok(i64::from(lhs != 0 || rhs != 0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots() -> HashMap<String, usize> {
        HashMap::from([("x".to_string(), 0), ("y".to_string(), 1)])
    }

    fn parse(json: &str) -> CompiledExpr {
        let expr: Expr = serde_json::from_str(json).expect("parse expr");
        expr.compile(&slots()).expect("compile expr")
    }

    #[test]
    fn arithmetic_and_comparison() {
        let expr = parse(r#"{"lt":[{"add":[{"var":"x"},{"const":2}]},{"var":"y"}]}"#);
        assert!(expr.holds(&[1, 4]).expect("eval"));
        assert!(!expr.holds(&[2, 4]).expect("eval"));
        assert_eq!(expr.reads(), BTreeSet::from([0, 1]));
    }

    #[test]
    fn and_short_circuits_division() {
        let expr = parse(
            r#"{"and":[{"ne":[{"var":"x"},{"const":0}]},{"gt":[{"div":[{"var":"y"},{"var":"x"}]},{"const":1}]}]}"#,
        );
        assert!(!expr.holds(&[0, 5]).expect("guarded division"));
        assert!(expr.holds(&[2, 5]).expect("eval"));
    }

    #[test]
    fn division_by_zero_is_an_evaluation_error() {
        let expr = parse(r#"{"div":[{"var":"y"},{"var":"x"}]}"#);
        let err = expr.eval(&[0, 3]).expect_err("div by zero");
        assert!(matches!(err, ProviderError::Evaluation(_)));
    }

    #[test]
    fn unknown_variable_fails_to_compile() {
        let expr: Expr = serde_json::from_str(r#"{"var":"z"}"#).expect("parse");
        let err = expr.compile(&slots()).expect_err("unknown var");
        assert!(matches!(err, ProviderError::ModelLoad { .. }));
    }
}
