/*!
Tokenization for cost formula expressions.

Converts formula text into a token stream for the recursive-descent
parser. The recognized alphabet is small: identifiers, decimal float
literals, arithmetic and comparison operators, parentheses, and the
two characters of the ternary selector.
*/

use crate::spincost::formula::error::FormulaError;

/// Token types recognized by the formula lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    // Literals and identifiers
    Identifier, // parameter names
    Number,     // decimal float literals (42, 3.14, 1e-3)

    // Punctuation
    LeftParen,  // (
    RightParen, // )
    Question,   // ? (ternary selector)
    Colon,      // : (ternary selector)

    // Arithmetic operators
    Plus,     // +
    Minus,    // -
    Asterisk, // *
    Slash,    // /

    // Comparison operators
    Equal,              // ==
    NotEqual,           // !=
    LessThan,           // <
    GreaterThan,        // >
    LessThanOrEqual,    // <=
    GreaterThanOrEqual, // >=

    // Special
    Eof, // end of input
}

/// A token with its type, text, and position in the formula string.
///
/// Position information feeds the parse errors that operators see in
/// the logs, so it points at the first character of the token.
#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    pub position: usize,
}

/// Tokenize formula text into a vector of tokens.
///
/// # Returns
/// * `Ok(Vec<Token>)` - tokens terminated by an `Eof` token
/// * `Err(FormulaError)` - lexical error with position
pub fn tokenize(formula: &str) -> Result<Vec<Token>, FormulaError> {
    let mut tokens = Vec::new();
    let mut chars = formula.chars().peekable();
    let mut position = 0;

    while let Some(&ch) = chars.peek() {
        match ch {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
                position += 1;
            }
            '(' => {
                tokens.push(Token {
                    token_type: TokenType::LeftParen,
                    value: "(".to_string(),
                    position,
                });
                chars.next();
                position += 1;
            }
            ')' => {
                tokens.push(Token {
                    token_type: TokenType::RightParen,
                    value: ")".to_string(),
                    position,
                });
                chars.next();
                position += 1;
            }
            '?' => {
                tokens.push(Token {
                    token_type: TokenType::Question,
                    value: "?".to_string(),
                    position,
                });
                chars.next();
                position += 1;
            }
            ':' => {
                tokens.push(Token {
                    token_type: TokenType::Colon,
                    value: ":".to_string(),
                    position,
                });
                chars.next();
                position += 1;
            }
            '+' => {
                tokens.push(Token {
                    token_type: TokenType::Plus,
                    value: "+".to_string(),
                    position,
                });
                chars.next();
                position += 1;
            }
            '-' => {
                tokens.push(Token {
                    token_type: TokenType::Minus,
                    value: "-".to_string(),
                    position,
                });
                chars.next();
                position += 1;
            }
            '*' => {
                tokens.push(Token {
                    token_type: TokenType::Asterisk,
                    value: "*".to_string(),
                    position,
                });
                chars.next();
                position += 1;
            }
            '/' => {
                tokens.push(Token {
                    token_type: TokenType::Slash,
                    value: "/".to_string(),
                    position,
                });
                chars.next();
                position += 1;
            }
            '=' => {
                chars.next();
                position += 1;
                if let Some(&'=') = chars.peek() {
                    tokens.push(Token {
                        token_type: TokenType::Equal,
                        value: "==".to_string(),
                        position: position - 1,
                    });
                    chars.next();
                    position += 1;
                } else {
                    return Err(FormulaError::parse_error(
                        "unexpected character '=' - did you mean '=='?",
                        Some(position - 1),
                    ));
                }
            }
            '!' => {
                chars.next();
                position += 1;
                if let Some(&'=') = chars.peek() {
                    tokens.push(Token {
                        token_type: TokenType::NotEqual,
                        value: "!=".to_string(),
                        position: position - 1,
                    });
                    chars.next();
                    position += 1;
                } else {
                    return Err(FormulaError::parse_error(
                        "unexpected character '!' - did you mean '!='?",
                        Some(position - 1),
                    ));
                }
            }
            '<' => {
                chars.next();
                position += 1;
                if let Some(&'=') = chars.peek() {
                    tokens.push(Token {
                        token_type: TokenType::LessThanOrEqual,
                        value: "<=".to_string(),
                        position: position - 1,
                    });
                    chars.next();
                    position += 1;
                } else {
                    tokens.push(Token {
                        token_type: TokenType::LessThan,
                        value: "<".to_string(),
                        position: position - 1,
                    });
                }
            }
            '>' => {
                chars.next();
                position += 1;
                if let Some(&'=') = chars.peek() {
                    tokens.push(Token {
                        token_type: TokenType::GreaterThanOrEqual,
                        value: ">=".to_string(),
                        position: position - 1,
                    });
                    chars.next();
                    position += 1;
                } else {
                    tokens.push(Token {
                        token_type: TokenType::GreaterThan,
                        value: ">".to_string(),
                        position: position - 1,
                    });
                }
            }
            '0'..='9' => {
                let start = position;
                let mut value = String::new();
                let mut has_decimal = false;
                let mut has_exponent = false;

                while let Some(&next_ch) = chars.peek() {
                    if next_ch.is_ascii_digit() {
                        value.push(next_ch);
                        chars.next();
                        position += 1;
                    } else if next_ch == '.' && !has_decimal && !has_exponent {
                        has_decimal = true;
                        value.push(next_ch);
                        chars.next();
                        position += 1;
                    } else if (next_ch == 'e' || next_ch == 'E') && !has_exponent {
                        has_exponent = true;
                        value.push(next_ch);
                        chars.next();
                        position += 1;

                        if let Some(&sign_ch) = chars.peek() {
                            if sign_ch == '+' || sign_ch == '-' {
                                value.push(sign_ch);
                                chars.next();
                                position += 1;
                            }
                        }
                    } else {
                        break;
                    }
                }

                tokens.push(Token {
                    token_type: TokenType::Number,
                    value,
                    position: start,
                });
            }
            _ if ch.is_ascii_alphabetic() || ch == '_' => {
                let start = position;
                let mut value = String::new();
                while let Some(&next_ch) = chars.peek() {
                    if next_ch.is_ascii_alphanumeric() || next_ch == '_' {
                        value.push(next_ch);
                        chars.next();
                        position += 1;
                    } else {
                        break;
                    }
                }

                tokens.push(Token {
                    token_type: TokenType::Identifier,
                    value,
                    position: start,
                });
            }
            _ => {
                return Err(FormulaError::parse_error(
                    format!("unexpected character '{}'", ch),
                    Some(position),
                ));
            }
        }
    }

    tokens.push(Token {
        token_type: TokenType::Eof,
        value: String::new(),
        position,
    });

    Ok(tokens)
}
