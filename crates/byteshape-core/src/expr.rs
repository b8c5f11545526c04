//! The argument-resolution mini-language used by size/count/choice strings.
//!
//! Three grammars, all parsed once at description time and evaluated per
//! instance:
//!
//! - path:       `header.palette.2.len`
//! - arithmetic: `width - 1` (space-separated `+`/`-` over literals and paths)
//! - list:       `width,height,depth` (ordered constructor arguments)
//!
//! Anything outside `+`, `-`, numeric literals, and dot-paths is rejected at
//! parse time. Arithmetic evaluates in `i64`.

use crate::value::Value;
use std::fmt;
use thiserror::Error as ThisError;

///
/// ExprError
///

#[derive(Clone, Debug, ThisError, PartialEq)]
pub enum ExprError {
    #[error("malformed expression {input:?}: {reason}")]
    Malformed { input: String, reason: String },

    #[error("unknown property {segment:?} while resolving {path:?}")]
    UnknownProperty { path: String, segment: String },

    #[error("index {index} out of bounds while resolving {path:?}")]
    IndexOutOfBounds { path: String, index: usize },

    #[error("operand {token:?} did not resolve to an integer")]
    NotANumber { token: String },
}

///
/// Segment
///

#[derive(Clone, Debug, Eq, PartialEq)]
enum Segment {
    Field(String),
    Index(usize),
}

///
/// PathExpr
/// Dot-separated property/index chain, resolved against an instance.
///

#[derive(Clone, Debug)]
pub struct PathExpr {
    raw: String,
    segments: Vec<Segment>,
}

impl PathExpr {
    pub fn parse(input: &str) -> Result<Self, ExprError> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(ExprError::Malformed {
                input: input.to_string(),
                reason: "empty path".to_string(),
            });
        }

        let mut segments = Vec::new();
        for part in raw.split('.') {
            if part.is_empty() {
                return Err(ExprError::Malformed {
                    input: input.to_string(),
                    reason: "empty path segment".to_string(),
                });
            }
            if part.bytes().all(|b| b.is_ascii_digit()) {
                let index = part.parse().map_err(|_| ExprError::Malformed {
                    input: input.to_string(),
                    reason: format!("index segment {part:?} overflows"),
                })?;
                segments.push(Segment::Index(index));
            } else {
                segments.push(Segment::Field(part.to_string()));
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Walk the chain down from `root`.
    pub fn resolve<'a>(&self, root: &'a Value) -> Result<&'a Value, ExprError> {
        let mut current = root;

        for segment in &self.segments {
            current = match segment {
                Segment::Field(name) => {
                    current
                        .field(name)
                        .ok_or_else(|| ExprError::UnknownProperty {
                            path: self.raw.clone(),
                            segment: name.clone(),
                        })?
                }
                Segment::Index(index) => match current {
                    Value::List(items) => {
                        items.get(*index).ok_or(ExprError::IndexOutOfBounds {
                            path: self.raw.clone(),
                            index: *index,
                        })?
                    }
                    _ => {
                        return Err(ExprError::UnknownProperty {
                            path: self.raw.clone(),
                            segment: index.to_string(),
                        });
                    }
                },
            };
        }

        Ok(current)
    }

    /// Integer view of the resolved value, for arithmetic and counts.
    pub fn resolve_i64(&self, root: &Value) -> Result<i64, ExprError> {
        let value = self.resolve(root)?;

        value.as_i64().ok_or_else(|| ExprError::NotANumber {
            token: self.raw.clone(),
        })
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

///
/// Term
///

#[derive(Clone, Debug)]
enum Term {
    Literal(i64),
    Path(PathExpr),
}

impl Term {
    fn parse(token: &str) -> Result<Self, ExprError> {
        // a leading sign or digit means a literal; paths never start with either
        if token
            .bytes()
            .next()
            .is_some_and(|b| b.is_ascii_digit() || b == b'-' || b == b'+')
        {
            let literal = token.parse().map_err(|_| ExprError::NotANumber {
                token: token.to_string(),
            })?;
            return Ok(Self::Literal(literal));
        }

        PathExpr::parse(token).map(Self::Path)
    }

    fn eval(&self, root: &Value) -> Result<i64, ExprError> {
        match self {
            Self::Literal(v) => Ok(*v),
            Self::Path(path) => path.resolve_i64(root),
        }
    }
}

///
/// Op
///

#[derive(Clone, Copy, Debug)]
enum Op {
    Add,
    Sub,
}

///
/// NumExpr
/// `first (op term)*` over space-separated tokens. A bare literal or bare
/// path is the one-term case, so every numeric annotation argument goes
/// through the same parser.
///

#[derive(Clone, Debug)]
pub struct NumExpr {
    raw: String,
    first: Term,
    rest: Vec<(Op, Term)>,
}

impl NumExpr {
    /// A constant expression.
    #[must_use]
    pub fn literal(value: i64) -> Self {
        Self {
            raw: value.to_string(),
            first: Term::Literal(value),
            rest: Vec::new(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, ExprError> {
        let raw = input.trim();
        let mut tokens = raw.split_whitespace();

        let first = match tokens.next() {
            Some(token) => Term::parse(token)?,
            None => {
                return Err(ExprError::Malformed {
                    input: input.to_string(),
                    reason: "empty expression".to_string(),
                });
            }
        };

        let mut rest = Vec::new();
        loop {
            let Some(op) = tokens.next() else { break };
            let op = match op {
                "+" => Op::Add,
                "-" => Op::Sub,
                other => {
                    return Err(ExprError::Malformed {
                        input: input.to_string(),
                        reason: format!("expected + or -, found {other:?}"),
                    });
                }
            };
            let Some(operand) = tokens.next() else {
                return Err(ExprError::Malformed {
                    input: input.to_string(),
                    reason: "trailing operator".to_string(),
                });
            };
            rest.push((op, Term::parse(operand)?));
        }

        Ok(Self {
            raw: raw.to_string(),
            first,
            rest,
        })
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn eval(&self, root: &Value) -> Result<i64, ExprError> {
        let mut acc = self.first.eval(root)?;

        for (op, term) in &self.rest {
            let operand = term.eval(root)?;
            acc = match op {
                Op::Add => acc.wrapping_add(operand),
                Op::Sub => acc.wrapping_sub(operand),
            };
        }

        Ok(acc)
    }
}

impl fmt::Display for NumExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

///
/// ArgList
/// Comma-separated paths forwarded as ordered constructor arguments.
///

#[derive(Clone, Debug)]
pub struct ArgList {
    paths: Vec<PathExpr>,
}

impl ArgList {
    pub fn parse(input: &str) -> Result<Self, ExprError> {
        let mut paths = Vec::new();
        for part in input.split(',') {
            paths.push(PathExpr::parse(part)?);
        }

        Ok(Self { paths })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Resolve every path in order, cloning the values out of the instance.
    pub fn resolve(&self, root: &Value) -> Result<Vec<Value>, ExprError> {
        self.paths
            .iter()
            .map(|path| path.resolve(root).cloned())
            .collect()
    }
}

///
/// TESTS
///
