//! 查询 AST 与求值。
//!
//! 求值只读记录，不分配；字面量在解析阶段就编译成 Matcher。

use std::cmp::Ordering;

use crate::core::value::{Record, Value};
use crate::query::matcher::{create_matcher, Matcher};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn accepts(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
        }
    }
}

/// `@a.b.c` → auto-generated 命名空间下的 ["a", "b", "c"]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldPath {
    pub is_auto_generated: bool,
    pub parts: Vec<String>,
}

/// 查询字面量。引号内的字面量只按字符串比较。
#[derive(Debug)]
pub struct Literal {
    matcher: Box<dyn Matcher>,
    quoted: bool,
    int: Option<i64>,
    float: Option<f64>,
}

impl Literal {
    /// `whole` = 整串匹配（字段比较）；否则子串匹配（自由词）
    pub fn new(text: &str, quoted: bool, whole: bool) -> Self {
        let (int, float) = if quoted {
            (None, None)
        } else {
            (text.parse::<i64>().ok(), text.parse::<f64>().ok().filter(|f| f.is_finite()))
        };
        Self {
            matcher: create_matcher(text, whole),
            quoted,
            int,
            float,
        }
    }

    pub fn text(&self) -> &str {
        self.matcher.literal()
    }

    pub fn is_numeric(&self) -> bool {
        self.float.is_some()
    }

    fn numeric_cmp(&self, leaf: &Value) -> Option<Ordering> {
        match (leaf, self.int, self.float) {
            (Value::Int(i), Some(j), _) => Some(i.cmp(&j)),
            (Value::Int(i), None, Some(f)) => (*i as f64).partial_cmp(&f),
            (Value::Float(x), _, Some(f)) => x.partial_cmp(&f),
            _ => None,
        }
    }

    fn equals(&self, leaf: &Value) -> bool {
        match leaf {
            Value::String(s) => self.matcher.matches(s),
            Value::Int(_) | Value::Float(_) => {
                !self.quoted && self.numeric_cmp(leaf) == Some(Ordering::Equal)
            }
            Value::Bool(b) => {
                !self.quoted && self.text().eq_ignore_ascii_case(if *b { "true" } else { "false" })
            }
            Value::Null => !self.quoted && self.text().eq_ignore_ascii_case("null"),
            Value::Array(_) | Value::Object(_) => false,
        }
    }
}

#[derive(Debug)]
pub enum QueryExpr {
    Or(Vec<QueryExpr>),
    And(Vec<QueryExpr>),
    Not(Box<QueryExpr>),
    /// `path:v`、`path:(a OR b)`、`path > n` ...；多个 operand 之间为 OR
    Field {
        path: FieldPath,
        op: CompareOp,
        operands: Vec<Literal>,
    },
    /// 无路径的自由词：在 user-generated 记录的所有叶子上做子串匹配
    Term(Literal),
}

impl QueryExpr {
    pub fn matches(&self, auto_generated: &Record, user_generated: &Record) -> bool {
        match self {
            QueryExpr::Or(items) => items.iter().any(|q| q.matches(auto_generated, user_generated)),
            QueryExpr::And(items) => items.iter().all(|q| q.matches(auto_generated, user_generated)),
            QueryExpr::Not(inner) => !inner.matches(auto_generated, user_generated),
            QueryExpr::Field { path, op, operands } => {
                let ns = if path.is_auto_generated {
                    auto_generated
                } else {
                    user_generated
                };
                match Value::lookup(ns, path.parts.as_slice()) {
                    Some(leaf) => operands.iter().any(|lit| compare(leaf, *op, lit)),
                    None => false,
                }
            }
            QueryExpr::Term(lit) => user_generated.values().any(|v| term_matches(v, lit)),
        }
    }
}

fn compare(leaf: &Value, op: CompareOp, lit: &Literal) -> bool {
    match leaf {
        Value::Array(items) => items.iter().any(|item| compare(item, op, lit)),
        _ if op == CompareOp::Eq => lit.equals(leaf),
        _ => lit.numeric_cmp(leaf).is_some_and(|ord| op.accepts(ord)),
    }
}

fn term_matches(leaf: &Value, lit: &Literal) -> bool {
    match leaf {
        Value::String(s) => lit.matcher.matches(s),
        Value::Int(_) | Value::Float(_) | Value::Bool(_) => leaf.to_json().to_string() == lit.text(),
        Value::Null => false,
        Value::Array(items) => items.iter().any(|v| term_matches(v, lit)),
        Value::Object(map) => map.values().any(|v| term_matches(v, lit)),
    }
}
