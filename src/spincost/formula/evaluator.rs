//! Tree-walking evaluator for cost formula expressions.
//!
//! Evaluates a parsed expression against a parameter bag. All
//! arithmetic is 64-bit IEEE-754: division by zero produces ±Inf or
//! NaN and surfaces as the result, never as an error. Comparisons
//! produce an internal boolean that is only usable as the condition of
//! the ternary selector; a boolean anywhere else is a type error, as
//! is a number in condition position.

use crate::spincost::formula::ast::{BinaryOperator, Expr, UnaryOperator};
use crate::spincost::formula::error::FormulaError;
use crate::spincost::params::ParamBag;

/// Intermediate value during evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Number(f64),
    Bool(bool),
}

impl Value {
    fn as_number(&self, context: &str) -> Result<f64, FormulaError> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Bool(_) => Err(FormulaError::type_error(format!(
                "comparison result used as a number in {}",
                context
            ))),
        }
    }
}

/// Evaluate an expression against a parameter bag, producing a number.
///
/// The top-level result must be numeric; a bare comparison is a type
/// error.
pub fn evaluate(expr: &Expr, params: &ParamBag) -> Result<f64, FormulaError> {
    evaluate_value(expr, params)?.as_number("formula result")
}

fn evaluate_value(expr: &Expr, params: &ParamBag) -> Result<Value, FormulaError> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),

        Expr::Identifier(name) => match params.get(name) {
            Some(value) => Ok(Value::Number(value)),
            None => Err(FormulaError::unknown_identifier(name.clone())),
        },

        Expr::UnaryOp { op, expr } => {
            let value = evaluate_value(expr, params)?.as_number("unary minus")?;
            match op {
                UnaryOperator::Minus => Ok(Value::Number(-value)),
            }
        }

        Expr::BinaryOp { left, op, right } => {
            let left_val = evaluate_value(left, params)?.as_number("binary operand")?;
            let right_val = evaluate_value(right, params)?.as_number("binary operand")?;

            let result = match op {
                BinaryOperator::Add => Value::Number(left_val + right_val),
                BinaryOperator::Subtract => Value::Number(left_val - right_val),
                BinaryOperator::Multiply => Value::Number(left_val * right_val),
                // IEEE-754: x/0 is ±Inf, 0/0 is NaN; both surface as results
                BinaryOperator::Divide => Value::Number(left_val / right_val),
                BinaryOperator::Equal => Value::Bool(left_val == right_val),
                BinaryOperator::NotEqual => Value::Bool(left_val != right_val),
                BinaryOperator::LessThan => Value::Bool(left_val < right_val),
                BinaryOperator::LessThanOrEqual => Value::Bool(left_val <= right_val),
                BinaryOperator::GreaterThan => Value::Bool(left_val > right_val),
                BinaryOperator::GreaterThanOrEqual => Value::Bool(left_val >= right_val),
            };
            Ok(result)
        }

        Expr::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            let cond = match evaluate_value(condition, params)? {
                Value::Bool(b) => b,
                Value::Number(_) => {
                    return Err(FormulaError::type_error(
                        "ternary condition must be a comparison",
                    ));
                }
            };
            // only the selected branch is evaluated
            if cond {
                evaluate_value(then_branch, params)
            } else {
                evaluate_value(else_branch, params)
            }
        }
    }
}
