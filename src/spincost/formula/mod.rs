/*!
Cost formula engine: lexer, parser, and evaluator.

A formula is a small arithmetic expression over a flat namespace of
numeric parameters, e.g. `electricity_kwh * rate_per_kwh + labor_cost`
or `quantity > 100 ? price * 0.9 : price`.

## Supported syntax

- infix `+` `-` `*` `/` with standard precedence, parentheses, unary
  minus;
- comparisons `<` `<=` `>` `>=` `==` `!=` over numbers, yielding a
  boolean usable only as a ternary condition;
- the ternary selector `cond ? a : b`;
- identifiers (ASCII letter or `_` followed by alphanumerics or `_`)
  resolved against the parameter bag;
- decimal float literals, with optional fraction and exponent.

Everything else - function calls, strings, logical connectives,
assignment - is rejected at parse time.

## Compilation and key-sets

[`Formula::compile`] parses once and the resulting program can be
evaluated any number of times. Identifiers are resolved by name at
evaluation time, so a program compiled while the bag held key-set *K*
is equally valid against any superset *K′ ⊇ K*; compilation never
captures the key-set.

## Numeric semantics

All operands are `f64`. Division by zero follows IEEE-754 (±Inf or
NaN) and surfaces as the evaluation result rather than an error.
Additive and multiplicative chains evaluate left-to-right as written.
*/

pub mod ast;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod parser;

pub use ast::{BinaryOperator, Expr, UnaryOperator};
pub use error::{FormulaError, FormulaResult};
pub use evaluator::evaluate;
pub use parser::parse_formula;

use crate::spincost::params::ParamBag;

/// A compiled cost formula.
///
/// Wraps the parsed expression together with its source text so log
/// lines can echo the original formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    expr: Expr,
    source: String,
}

impl Formula {
    /// Compile formula text into a reusable program.
    pub fn compile(formula: &str) -> FormulaResult<Self> {
        let expr = parse_formula(formula)?;
        Ok(Self {
            expr,
            source: formula.to_string(),
        })
    }

    /// Evaluate the compiled program against a parameter bag.
    pub fn evaluate(&self, params: &ParamBag) -> FormulaResult<f64> {
        evaluate(&self.expr, params)
    }

    /// The original formula text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Identifiers referenced by the program.
    pub fn identifiers(&self) -> Vec<String> {
        self.expr.identifiers()
    }
}
