//! Compiler for condition group expressions.
//!
//! A group expression combines condition names with `&&`, `||`, `!` and
//! parentheses, e.g. `hasKey && (isDay || !isLocked)`. Compilation runs in
//! four stages:
//!
//! 1. character-level syntax validation
//! 2. tokenization
//! 3. conversion to postfix (shunting-yard, precedence `||` < `&&` < `!`)
//! 4. reduction of the postfix sequence into an [`Expr`] tree, resolving
//!    every identifier against the node's known conditions
//!
//! Syntax rules enforced by stage 1:
//!
//! - only `[A-Za-z0-9]`, space, `(`, `)`, `!`, `&`, `|` are allowed
//! - parentheses must balance
//! - `!` must be preceded by a space or `(` and directly followed by its
//!   operand, so `!!x`, `! x` and `(x !)` are rejected
//! - `&` and `|` only appear doubled, surrounded by single spaces, with an
//!   operand on both sides

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors produced while compiling a group expression.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompileError {
    #[error("group '{group}': the expression is empty")]
    Empty { group: String },

    #[error("group '{group}': character '{ch}' at {position} is not allowed")]
    InvalidCharacter {
        group: String,
        ch: char,
        position: usize,
    },

    #[error("group '{group}': '!' at {position} must follow a space or '('")]
    NegationPlacement { group: String, position: usize },

    #[error("group '{group}': '!' at {position} must be directly followed by an operand")]
    DanglingNegation { group: String, position: usize },

    #[error("group '{group}': '{operator}' at {position} has no left operand")]
    MissingLeftOperand {
        group: String,
        operator: char,
        position: usize,
    },

    #[error("group '{group}': '{operator}' at {position} must be written as a pair")]
    UnpairedOperator {
        group: String,
        operator: char,
        position: usize,
    },

    #[error("group '{group}': operator at {position} must be surrounded by single spaces")]
    OperatorSpacing { group: String, position: usize },

    #[error("group '{group}': the last operator has no right operand")]
    MissingRightOperand { group: String },

    #[error("group '{group}': parentheses are not balanced")]
    UnbalancedParentheses { group: String },

    #[error("group '{group}': unknown condition '{name}'")]
    UnknownCondition { group: String, name: String },

    #[error("group '{group}': malformed expression: {reason}")]
    Malformed { group: String, reason: String },
}

/// A compiled boolean expression over condition names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    Condition(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Evaluate the tree, asking `leaf` for each referenced condition.
    ///
    /// Both operands of `&&` and `||` are always evaluated.
    ///
    /// # Example
    ///
    /// ```rust
    /// use dynamic_state_machine::core::expression::compile;
    ///
    /// let expr = compile("demo", "a || b && !c", |_| true).unwrap();
    /// let mut calls = Vec::new();
    /// let result = expr.evaluate(&mut |name: &str| {
    ///     calls.push(name.to_string());
    ///     name == "a"
    /// });
    ///
    /// assert!(result);
    /// assert_eq!(calls, vec!["a", "b", "c"]);
    /// ```
    pub fn evaluate<F>(&self, leaf: &mut F) -> bool
    where
        F: FnMut(&str) -> bool,
    {
        match self {
            Self::Condition(name) => leaf(name),
            Self::Not(inner) => !inner.evaluate(leaf),
            Self::And(left, right) => {
                let left = left.evaluate(leaf);
                let right = right.evaluate(leaf);
                left && right
            }
            Self::Or(left, right) => {
                let left = left.evaluate(leaf);
                let right = right.evaluate(leaf);
                left || right
            }
        }
    }

    /// Condition names referenced by this tree, left to right.
    pub fn conditions(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_conditions(&mut names);
        names
    }

    fn collect_conditions<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Self::Condition(name) => names.push(name),
            Self::Not(inner) => inner.collect_conditions(names),
            Self::And(left, right) | Self::Or(left, right) => {
                left.collect_conditions(names);
                right.collect_conditions(names);
            }
        }
    }
}

impl fmt::Display for Expr {
    /// Fully parenthesized rendering that compiles back to the same tree.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Condition(name) => f.write_str(name),
            Self::Not(inner) => match inner.as_ref() {
                Self::Condition(name) => write!(f, "!{}", name),
                other => write!(f, "!({})", Unwrapped(other)),
            },
            Self::And(left, right) => write!(f, "({} && {})", left, right),
            Self::Or(left, right) => write!(f, "({} || {})", left, right),
        }
    }
}

/// Renders a binary node without its outer parentheses.
struct Unwrapped<'a>(&'a Expr);

impl fmt::Display for Unwrapped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Expr::And(left, right) => write!(f, "{} && {}", left, right),
            Expr::Or(left, right) => write!(f, "{} || {}", left, right),
            other => write!(f, "{}", other),
        }
    }
}

/// A named group expression together with its compiled tree.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledGroup {
    pub name: String,
    pub source: String,
    pub expr: Expr,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Token {
    Ident(String),
    Not,
    And,
    Or,
    Open,
    Close,
}

impl Token {
    fn precedence(&self) -> Option<u8> {
        match self {
            Self::Or => Some(0),
            Self::And => Some(1),
            Self::Not => Some(2),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(name) => f.write_str(name),
            Self::Not => f.write_str("!"),
            Self::And => f.write_str("&&"),
            Self::Or => f.write_str("||"),
            Self::Open => f.write_str("("),
            Self::Close => f.write_str(")"),
        }
    }
}

/// Compile `source` for the group named `group`.
///
/// `is_known` decides whether an identifier names a condition of the owning
/// node.
///
/// # Example
///
/// ```rust
/// use dynamic_state_machine::core::expression::{compile, CompileError};
///
/// let known = |name: &str| matches!(name, "hasKey" | "isDay");
///
/// let expr = compile("enter", "hasKey && !isDay", known).unwrap();
/// assert_eq!(expr.to_string(), "(hasKey && !isDay)");
///
/// let err = compile("enter", "hasKey&&isDay", known).unwrap_err();
/// assert!(matches!(err, CompileError::OperatorSpacing { .. }));
/// ```
pub fn compile<F>(group: &str, source: &str, is_known: F) -> Result<Expr, CompileError>
where
    F: Fn(&str) -> bool,
{
    validate(group, source)?;
    let tokens = tokenize(group, source)?;
    let postfix = to_postfix(group, tokens)?;
    tracing::debug!(
        group = %group,
        postfix = %postfix.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(" "),
        "converted group expression to postfix"
    );
    build(group, postfix, &is_known)
}

/// Character-level syntax check.
pub fn validate(group: &str, source: &str) -> Result<(), CompileError> {
    let chars: Vec<char> = source.chars().collect();
    let len = chars.len();
    let mut depth: i64 = 0;
    let mut operand_left = false;
    let mut needs_right = false;

    let mut i = 0;
    while i < len {
        let ch = chars[i];
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(CompileError::UnbalancedParentheses {
                        group: group.to_string(),
                    });
                }
            }
            ' ' => {}
            '!' => {
                if i > 0 && !matches!(chars[i - 1], ' ' | '(') {
                    return Err(CompileError::NegationPlacement {
                        group: group.to_string(),
                        position: i,
                    });
                }
                match chars.get(i + 1) {
                    None | Some('|' | '&' | '!' | ')' | ' ') => {
                        return Err(CompileError::DanglingNegation {
                            group: group.to_string(),
                            position: i,
                        })
                    }
                    Some(_) => {}
                }
            }
            '&' | '|' => {
                if !operand_left {
                    return Err(CompileError::MissingLeftOperand {
                        group: group.to_string(),
                        operator: ch,
                        position: i,
                    });
                }
                operand_left = false;
                needs_right = true;

                if i > 0 && chars[i - 1] != ' ' {
                    return Err(CompileError::OperatorSpacing {
                        group: group.to_string(),
                        position: i,
                    });
                }
                if chars.get(i + 1) != Some(&ch) {
                    return Err(CompileError::UnpairedOperator {
                        group: group.to_string(),
                        operator: ch,
                        position: i,
                    });
                }
                i += 1;
                match chars.get(i + 1) {
                    None => {
                        return Err(CompileError::MissingRightOperand {
                            group: group.to_string(),
                        })
                    }
                    Some(' ') => {}
                    Some(_) => {
                        return Err(CompileError::OperatorSpacing {
                            group: group.to_string(),
                            position: i - 1,
                        })
                    }
                }
            }
            c if c.is_ascii_alphanumeric() => {
                operand_left = true;
                needs_right = false;
            }
            other => {
                return Err(CompileError::InvalidCharacter {
                    group: group.to_string(),
                    ch: other,
                    position: i,
                })
            }
        }
        i += 1;
    }

    if depth != 0 {
        return Err(CompileError::UnbalancedParentheses {
            group: group.to_string(),
        });
    }
    if needs_right {
        return Err(CompileError::MissingRightOperand {
            group: group.to_string(),
        });
    }
    Ok(())
}

/// Split a validated expression into tokens.
///
/// Spaces are dropped, so identifiers separated only by spaces merge.
pub(crate) fn tokenize(group: &str, source: &str) -> Result<Vec<Token>, CompileError> {
    let mut tokens = Vec::new();
    let mut ident = String::new();
    let mut chars = source.chars().filter(|c| *c != ' ').peekable();

    while let Some(ch) = chars.next() {
        if ch.is_ascii_alphanumeric() {
            ident.push(ch);
            continue;
        }
        if !ident.is_empty() {
            tokens.push(Token::Ident(std::mem::take(&mut ident)));
        }
        let token = match ch {
            '(' => Token::Open,
            ')' => Token::Close,
            '!' => Token::Not,
            '&' | '|' => {
                if chars.peek() != Some(&ch) {
                    return Err(CompileError::Malformed {
                        group: group.to_string(),
                        reason: format!("single '{}' operator", ch),
                    });
                }
                chars.next();
                if ch == '&' {
                    Token::And
                } else {
                    Token::Or
                }
            }
            other => {
                return Err(CompileError::InvalidCharacter {
                    group: group.to_string(),
                    ch: other,
                    position: 0,
                })
            }
        };
        tokens.push(token);
    }
    if !ident.is_empty() {
        tokens.push(Token::Ident(ident));
    }
    Ok(tokens)
}

/// Shunting-yard conversion of infix tokens to postfix order.
pub(crate) fn to_postfix(group: &str, tokens: Vec<Token>) -> Result<Vec<Token>, CompileError> {
    let mut output = Vec::with_capacity(tokens.len());
    let mut operators: Vec<Token> = Vec::new();

    for token in tokens {
        match token {
            Token::Ident(_) => output.push(token),
            Token::Open => operators.push(token),
            Token::Close => loop {
                match operators.pop() {
                    Some(Token::Open) => break,
                    Some(op) => output.push(op),
                    None => {
                        return Err(CompileError::UnbalancedParentheses {
                            group: group.to_string(),
                        })
                    }
                }
            },
            Token::Not | Token::And | Token::Or => {
                let precedence = token.precedence().unwrap_or_default();
                while let Some(top) = operators.last() {
                    match top.precedence() {
                        Some(top_precedence) if top_precedence >= precedence => {
                            if let Some(op) = operators.pop() {
                                output.push(op);
                            }
                        }
                        _ => break,
                    }
                }
                operators.push(token);
            }
        }
    }

    while let Some(op) = operators.pop() {
        if op == Token::Open {
            return Err(CompileError::UnbalancedParentheses {
                group: group.to_string(),
            });
        }
        output.push(op);
    }
    Ok(output)
}

/// Reduce a postfix sequence into a single tree.
pub(crate) fn build<F>(group: &str, postfix: Vec<Token>, is_known: &F) -> Result<Expr, CompileError>
where
    F: Fn(&str) -> bool,
{
    let malformed = |reason: &str| CompileError::Malformed {
        group: group.to_string(),
        reason: reason.to_string(),
    };

    let mut stack: Vec<Expr> = Vec::new();
    for token in postfix {
        match token {
            Token::Ident(name) => {
                if !is_known(&name) {
                    return Err(CompileError::UnknownCondition {
                        group: group.to_string(),
                        name,
                    });
                }
                stack.push(Expr::Condition(name));
            }
            Token::Not => {
                let operand = stack.pop().ok_or_else(|| malformed("'!' has no operand"))?;
                stack.push(Expr::Not(Box::new(operand)));
            }
            Token::And | Token::Or => {
                let right = stack
                    .pop()
                    .ok_or_else(|| malformed("binary operator is missing operands"))?;
                let left = stack
                    .pop()
                    .ok_or_else(|| malformed("binary operator is missing operands"))?;
                stack.push(if token == Token::And {
                    Expr::And(Box::new(left), Box::new(right))
                } else {
                    Expr::Or(Box::new(left), Box::new(right))
                });
            }
            Token::Open | Token::Close => return Err(malformed("parenthesis left in postfix form")),
        }
    }

    match stack.len() {
        0 => Err(CompileError::Empty {
            group: group.to_string(),
        }),
        1 => stack.pop().ok_or_else(|| malformed("empty stack")),
        n => Err(malformed(&format!("{} operands are left without an operator", n))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(name: &str) -> bool {
        matches!(name, "true" | "false")
    }

    fn run(source: &str) -> Result<bool, CompileError> {
        compile("test", source, literal).map(|expr| expr.evaluate(&mut |name: &str| name == "true"))
    }

    #[test]
    fn evaluates_with_precedence() {
        assert_eq!(run("true || false && false"), Ok(true));
        assert_eq!(run("(true || false) && false"), Ok(false));
        assert_eq!(run("true && false || true && true || false && true"), Ok(true));
    }

    #[test]
    fn evaluates_nested_groups() {
        assert_eq!(
            run("((true && false) || true) && (true || false) && false"),
            Ok(false)
        );
        assert_eq!(
            run("!(!true || (false && true) || ((true || true) && false) || (false && false))"),
            Ok(true)
        );
    }

    #[test]
    fn evaluates_negation() {
        assert_eq!(run("!true || !(true || false)"), Ok(false));
        assert_eq!(run("!true"), Ok(false));
        assert_eq!(run("!false"), Ok(true));
    }

    #[test]
    fn single_identifier() {
        assert_eq!(run("true"), Ok(true));
        assert_eq!(run("false"), Ok(false));
        assert_eq!(run("(true)"), Ok(true));
    }

    #[test]
    fn unknown_identifier_is_rejected() {
        match run("falses") {
            Err(CompileError::UnknownCondition { name, .. }) => assert_eq!(name, "falses"),
            other => panic!("Expected UnknownCondition, got {:?}", other),
        }
    }

    #[test]
    fn spaces_merge_identifiers() {
        assert!(matches!(
            run("true false"),
            Err(CompileError::UnknownCondition { .. })
        ));
    }

    #[test]
    fn operator_without_left_operand() {
        assert!(matches!(
            run("|false&"),
            Err(CompileError::MissingLeftOperand { .. })
        ));
        assert!(matches!(
            run("| false"),
            Err(CompileError::MissingLeftOperand { .. })
        ));
        assert!(matches!(
            run("false || && true"),
            Err(CompileError::MissingLeftOperand { .. })
        ));
    }

    #[test]
    fn operator_inside_empty_parentheses() {
        assert!(matches!(
            run("false ( && ) true"),
            Err(CompileError::Malformed { .. })
        ));
    }

    #[test]
    fn negation_followed_by_operator() {
        assert!(matches!(
            run("true !&& false"),
            Err(CompileError::DanglingNegation { .. })
        ));
    }

    #[test]
    fn double_negation_is_rejected() {
        assert!(matches!(
            run("!!true"),
            Err(CompileError::DanglingNegation { .. })
        ));
        assert!(run("!(!true)").is_ok());
    }

    #[test]
    fn negation_must_touch_its_operand() {
        assert!(matches!(
            run("(true !)"),
            Err(CompileError::DanglingNegation { .. })
        ));
        assert!(matches!(
            run("! true"),
            Err(CompileError::DanglingNegation { .. })
        ));
        assert!(matches!(
            run("true && !"),
            Err(CompileError::DanglingNegation { .. })
        ));
        assert_eq!(run("(!true)"), Ok(false));
    }

    #[test]
    fn negation_must_follow_space_or_parenthesis() {
        assert!(matches!(
            run("true&& false!"),
            Err(CompileError::OperatorSpacing { .. })
        ));
        assert!(matches!(
            run("(true)!"),
            Err(CompileError::NegationPlacement { .. })
        ));
    }

    #[test]
    fn unbalanced_parentheses() {
        assert!(matches!(
            run("(((true))"),
            Err(CompileError::UnbalancedParentheses { .. })
        ));
        assert!(matches!(
            run(")true("),
            Err(CompileError::UnbalancedParentheses { .. })
        ));
    }

    #[test]
    fn leftover_operands_are_rejected() {
        assert!(matches!(
            run("true !false !true"),
            Err(CompileError::Malformed { .. })
        ));
    }

    #[test]
    fn operators_must_be_paired_and_spaced() {
        assert!(matches!(
            run("true & false"),
            Err(CompileError::UnpairedOperator { .. })
        ));
        assert!(matches!(
            run("true &&false"),
            Err(CompileError::OperatorSpacing { .. })
        ));
        assert!(matches!(
            run("true ||"),
            Err(CompileError::MissingRightOperand { .. })
        ));
    }

    #[test]
    fn rejects_invalid_characters() {
        match run("true && fal_se") {
            Err(CompileError::InvalidCharacter { ch, .. }) => assert_eq!(ch, '_'),
            other => panic!("Expected InvalidCharacter, got {:?}", other),
        }
    }

    #[test]
    fn empty_expression_is_rejected() {
        assert!(matches!(run(""), Err(CompileError::Empty { .. })));
        assert!(matches!(run("   "), Err(CompileError::Empty { .. })));
    }

    #[test]
    fn postfix_order_follows_precedence() {
        let tokens = tokenize("t", "a || b && !c").unwrap();
        let postfix = to_postfix("t", tokens).unwrap();
        let rendered: Vec<String> = postfix.iter().map(|t| t.to_string()).collect();
        assert_eq!(rendered, vec!["a", "b", "c", "!", "&&", "||"]);
    }

    #[test]
    fn evaluation_does_not_short_circuit() {
        let expr = compile("t", "a && b || c", |_| true).unwrap();
        let mut seen = Vec::new();
        expr.evaluate(&mut |name: &str| {
            seen.push(name.to_string());
            false
        });
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[test]
    fn display_recompiles_to_same_tree() {
        let expr = compile("t", "!(a || b) && c || !d", |_| true).unwrap();
        let rendered = expr.to_string();
        let again = compile("t", &rendered, |_| true).unwrap();
        assert_eq!(expr, again);
    }

    #[test]
    fn lists_referenced_conditions() {
        let expr = compile("t", "a && (b || !a)", |_| true).unwrap();
        assert_eq!(expr.conditions(), vec!["a", "b", "a"]);
    }
}
