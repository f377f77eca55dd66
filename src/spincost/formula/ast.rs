/// Expression AST for step cost formulas.
///
/// The grammar is deliberately small: arithmetic, comparisons, and the
/// ternary selector over a flat namespace of numeric parameters. There
/// are no function calls, assignments, or string values.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Parameter reference, resolved against the bag at evaluation time
    Identifier(String),
    /// Decimal float literal
    Number(f64),
    /// Binary operations: expr op expr
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    /// Unary negation: -expr
    UnaryOp { op: UnaryOperator, expr: Box<Expr> },
    /// Ternary selector: cond ? then : otherwise
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl BinaryOperator {
    /// Whether this operator compares two numbers into a boolean
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::NotEqual
                | BinaryOperator::LessThan
                | BinaryOperator::LessThanOrEqual
                | BinaryOperator::GreaterThan
                | BinaryOperator::GreaterThanOrEqual
        )
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Minus,
}

impl Expr {
    /// Collect every identifier referenced by this expression.
    pub fn identifiers(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_identifiers(&mut names);
        names
    }

    fn collect_identifiers(&self, names: &mut Vec<String>) {
        match self {
            Expr::Identifier(name) => {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            Expr::Number(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.collect_identifiers(names);
                right.collect_identifiers(names);
            }
            Expr::UnaryOp { expr, .. } => expr.collect_identifiers(names),
            Expr::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.collect_identifiers(names);
                then_branch.collect_identifiers(names);
                else_branch.collect_identifiers(names);
            }
        }
    }
}
