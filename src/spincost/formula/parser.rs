/*!
# Formula Parsing

Recursive-descent parser for cost formula expressions, implementing the
precedence hierarchy from the ternary selector down to primary
expressions:

```text
Level 1 (Lowest):  Ternary selector ?:       (parse_conditional)
Level 2:           Comparisons               (parse_comparison)
Level 3:           Addition/Subtraction      (parse_additive)
Level 4:           Multiplication/Division   (parse_multiplicative)
Level 5:           Unary minus               (parse_unary)
Level 6 (Highest): Primary expressions       (parse_primary)
```

Each level calls the next higher level, so precedence falls out of the
call structure. Additive and multiplicative chains associate left, and
the evaluator walks them in that order, which keeps summation
left-to-right as written.

Everything outside the grammar is a parse error: there are no function
calls, no string literals, no logical connectives, and no assignment.
*/

use crate::spincost::formula::ast::{BinaryOperator, Expr, UnaryOperator};
use crate::spincost::formula::error::FormulaError;
use crate::spincost::formula::lexer::{Token, TokenType, tokenize};

/// Parse formula text into an expression tree.
///
/// # Returns
/// * `Ok(Expr)` - parsed expression covering the whole input
/// * `Err(FormulaError)` - lexical or syntax error with position
pub fn parse_formula(formula: &str) -> Result<Expr, FormulaError> {
    let tokens = tokenize(formula)?;
    let mut parser = TokenParser::new(tokens);
    let expr = parser.parse_conditional()?;
    parser.expect_eof()?;
    Ok(expr)
}

/// Token navigation state for recursive descent parsing.
struct TokenParser {
    tokens: Vec<Token>,
    position: usize,
}

impl TokenParser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    fn current_token(&self) -> &Token {
        // tokenize always appends Eof, so position stays in bounds
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    fn expect(&mut self, expected: TokenType) -> Result<Token, FormulaError> {
        let token = self.current_token().clone();
        if token.token_type == expected {
            self.advance();
            Ok(token)
        } else {
            Err(FormulaError::parse_error(
                format!("expected {:?}, found '{}'", expected, token.value),
                Some(token.position),
            ))
        }
    }

    fn expect_eof(&self) -> Result<(), FormulaError> {
        let token = self.current_token();
        if token.token_type == TokenType::Eof {
            Ok(())
        } else {
            Err(FormulaError::parse_error(
                format!("unexpected trailing input '{}'", token.value),
                Some(token.position),
            ))
        }
    }

    /// Parse the ternary selector (lowest precedence, right-associative).
    ///
    /// Grammar: `comparison (? conditional : conditional)?`
    fn parse_conditional(&mut self) -> Result<Expr, FormulaError> {
        let condition = self.parse_comparison()?;

        if self.current_token().token_type == TokenType::Question {
            self.advance(); // consume ?
            let then_branch = self.parse_conditional()?;
            self.expect(TokenType::Colon)?;
            let else_branch = self.parse_conditional()?;
            return Ok(Expr::Conditional {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            });
        }

        Ok(condition)
    }

    /// Parse comparison expressions.
    ///
    /// Grammar: `additive ((< | <= | > | >= | == | !=) additive)*`
    ///
    /// Chained comparisons parse but fail type checking at evaluation
    /// time, since a comparison result is only usable as a `?:`
    /// condition.
    fn parse_comparison(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_additive()?;

        loop {
            let op = match self.current_token().token_type {
                TokenType::LessThan => BinaryOperator::LessThan,
                TokenType::LessThanOrEqual => BinaryOperator::LessThanOrEqual,
                TokenType::GreaterThan => BinaryOperator::GreaterThan,
                TokenType::GreaterThanOrEqual => BinaryOperator::GreaterThanOrEqual,
                TokenType::Equal => BinaryOperator::Equal,
                TokenType::NotEqual => BinaryOperator::NotEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parse addition and subtraction (left-associative).
    ///
    /// Grammar: `multiplicative ((+ | -) multiplicative)*`
    fn parse_additive(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.current_token().token_type {
                TokenType::Plus => BinaryOperator::Add,
                TokenType::Minus => BinaryOperator::Subtract,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parse multiplication and division (left-associative).
    ///
    /// Grammar: `unary ((* | /) unary)*`
    fn parse_multiplicative(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.current_token().token_type {
                TokenType::Asterisk => BinaryOperator::Multiply,
                TokenType::Slash => BinaryOperator::Divide,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parse unary minus.
    ///
    /// Grammar: `- unary | primary`
    fn parse_unary(&mut self) -> Result<Expr, FormulaError> {
        if self.current_token().token_type == TokenType::Minus {
            self.advance();
            let expr = self.parse_unary()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr: Box::new(expr),
            });
        }
        self.parse_primary()
    }

    /// Parse primary expressions: literals, identifiers, parentheses.
    fn parse_primary(&mut self) -> Result<Expr, FormulaError> {
        let token = self.current_token().clone();

        match token.token_type {
            TokenType::Number => {
                self.advance();
                let value: f64 = token.value.parse().map_err(|_| {
                    FormulaError::parse_error(
                        format!("invalid numeric literal '{}'", token.value),
                        Some(token.position),
                    )
                })?;
                Ok(Expr::Number(value))
            }
            TokenType::Identifier => {
                self.advance();
                if self.current_token().token_type == TokenType::LeftParen {
                    // 'name(' would be a function call, which the
                    // grammar does not have
                    return Err(FormulaError::parse_error(
                        format!("function calls are not supported: '{}'", token.value),
                        Some(token.position),
                    ));
                }
                Ok(Expr::Identifier(token.value))
            }
            TokenType::LeftParen => {
                self.advance();
                let expr = self.parse_conditional()?;
                self.expect(TokenType::RightParen)?;
                Ok(expr)
            }
            _ => Err(FormulaError::parse_error(
                format!("unexpected token '{}'", token.value),
                Some(token.position),
            )),
        }
    }
}
