//! 查询语言：词法 + 递归下降。
//!
//! ```text
//! or_expr    := and_expr ( OR and_expr )*
//! and_expr   := not_expr ( [AND] not_expr )*
//! not_expr   := NOT not_expr | primary
//! primary    := "(" or_expr ")" | path op operand | term
//! operand    := "(" term ( OR term )* ")" | term
//! ```
//!
//! 关键字大小写不敏感；位置为输入中的字节偏移。

use crate::core::error::{IrError, Result};
use crate::query::expr::{CompareOp, FieldPath, Literal, QueryExpr};

/// 括号与 NOT 的最大嵌套层数
pub const MAX_QUERY_DEPTH: usize = 64;

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    LParen,
    RParen,
    Op(CompareOp),
    And,
    Or,
    Not,
    Word(String),
    Quoted(String),
}

#[derive(Clone, Debug)]
struct Token {
    tok: Tok,
    pos: usize,
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | ':' | '<' | '>' | '"')
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut out = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some(&(pos, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let tok = match c {
            '(' => {
                chars.next();
                Tok::LParen
            }
            ')' => {
                chars.next();
                Tok::RParen
            }
            ':' => {
                chars.next();
                Tok::Op(CompareOp::Eq)
            }
            '>' | '<' => {
                chars.next();
                let eq = chars.next_if(|&(_, c)| c == '=').is_some();
                Tok::Op(match (c, eq) {
                    ('>', false) => CompareOp::Gt,
                    ('>', true) => CompareOp::Ge,
                    ('<', false) => CompareOp::Lt,
                    _ => CompareOp::Le,
                })
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, escaped)) => s.push(escaped),
                            None => break,
                        },
                        _ => s.push(c),
                    }
                }
                if !closed {
                    return Err(IrError::query(pos, "unterminated quoted string"));
                }
                Tok::Quoted(s)
            }
            _ => {
                let mut s = String::new();
                while let Some((_, c)) = chars.next_if(|&(_, c)| is_word_char(c)) {
                    s.push(c);
                }
                if s.eq_ignore_ascii_case("and") {
                    Tok::And
                } else if s.eq_ignore_ascii_case("or") {
                    Tok::Or
                } else if s.eq_ignore_ascii_case("not") {
                    Tok::Not
                } else {
                    Tok::Word(s)
                }
            }
        };
        out.push(Token { tok, pos });
    }
    Ok(out)
}

struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.idx).map(|t| &t.tok)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Tok> {
        self.tokens.get(self.idx + ahead).map(|t| &t.tok)
    }

    fn pos(&self) -> usize {
        self.tokens.get(self.idx).map_or(self.end, |t| t.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.idx).cloned();
        if t.is_some() {
            self.idx += 1;
        }
        t
    }

    fn expect_rparen(&mut self) -> Result<()> {
        match self.peek() {
            Some(Tok::RParen) => {
                self.idx += 1;
                Ok(())
            }
            _ => Err(IrError::query(self.pos(), "expected ')'")),
        }
    }

    fn enter(&mut self, pos: usize) -> Result<()> {
        if self.depth >= MAX_QUERY_DEPTH {
            return Err(IrError::query(pos, "query nesting too deep"));
        }
        self.depth += 1;
        Ok(())
    }

    fn or_expr(&mut self) -> Result<QueryExpr> {
        let mut items = vec![self.and_expr()?];
        while self.peek() == Some(&Tok::Or) {
            self.idx += 1;
            items.push(self.and_expr()?);
        }
        Ok(flatten(items, QueryExpr::Or))
    }

    fn and_expr(&mut self) -> Result<QueryExpr> {
        let mut items = vec![self.not_expr()?];
        loop {
            match self.peek() {
                Some(Tok::And) => {
                    self.idx += 1;
                    items.push(self.not_expr()?);
                }
                // 并列即 AND
                Some(Tok::LParen | Tok::Not | Tok::Word(_) | Tok::Quoted(_)) => {
                    items.push(self.not_expr()?);
                }
                _ => break,
            }
        }
        Ok(flatten(items, QueryExpr::And))
    }

    fn not_expr(&mut self) -> Result<QueryExpr> {
        if self.peek() == Some(&Tok::Not) {
            self.enter(self.pos())?;
            self.idx += 1;
            let inner = self.not_expr()?;
            self.depth -= 1;
            return Ok(QueryExpr::Not(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<QueryExpr> {
        let pos = self.pos();
        let is_field = matches!(self.peek_at(1), Some(Tok::Op(_)));
        let Some(token) = self.advance() else {
            return Err(IrError::query(pos, "unexpected end of query"));
        };
        match token.tok {
            Tok::LParen => {
                self.enter(pos)?;
                let inner = self.or_expr()?;
                self.expect_rparen()?;
                self.depth -= 1;
                Ok(inner)
            }
            Tok::Word(path) if is_field => self.field(parse_path(&path, pos)?),
            Tok::Quoted(key) if is_field => self.field(FieldPath {
                is_auto_generated: false,
                parts: vec![key],
            }),
            Tok::Word(text) => Ok(QueryExpr::Term(Literal::new(&text, false, false))),
            Tok::Quoted(text) => Ok(QueryExpr::Term(Literal::new(&text, true, false))),
            Tok::Op(_) => Err(IrError::query(pos, "comparison without a field path")),
            Tok::RParen => Err(IrError::query(pos, "unexpected ')'")),
            Tok::And | Tok::Or | Tok::Not => Err(IrError::query(pos, "unexpected keyword")),
        }
    }

    fn field(&mut self, path: FieldPath) -> Result<QueryExpr> {
        let Some(Token { tok: Tok::Op(op), .. }) = self.advance() else {
            return Err(IrError::query(self.pos(), "expected comparison operator"));
        };
        let operands = if self.peek() == Some(&Tok::LParen) {
            if op != CompareOp::Eq {
                return Err(IrError::query(self.pos(), "alternatives are only allowed with ':'"));
            }
            self.idx += 1;
            let mut lits = vec![self.operand(op)?];
            while self.peek() == Some(&Tok::Or) {
                self.idx += 1;
                lits.push(self.operand(op)?);
            }
            self.expect_rparen()?;
            lits
        } else {
            vec![self.operand(op)?]
        };
        Ok(QueryExpr::Field { path, op, operands })
    }

    fn operand(&mut self, op: CompareOp) -> Result<Literal> {
        let pos = self.pos();
        let lit = match self.advance().map(|t| t.tok) {
            Some(Tok::Word(text)) => Literal::new(&text, false, true),
            Some(Tok::Quoted(text)) => Literal::new(&text, true, true),
            _ => return Err(IrError::query(pos, "expected a value")),
        };
        if op != CompareOp::Eq && !lit.is_numeric() {
            return Err(IrError::query(pos, format!("'{}' is not a number", lit.text())));
        }
        Ok(lit)
    }
}

fn flatten(mut items: Vec<QueryExpr>, wrap: fn(Vec<QueryExpr>) -> QueryExpr) -> QueryExpr {
    if items.len() == 1 {
        items.remove(0)
    } else {
        wrap(items)
    }
}

fn parse_path(raw: &str, pos: usize) -> Result<FieldPath> {
    let (is_auto_generated, body) = match raw.strip_prefix('@') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let parts: Vec<String> = body.split('.').map(str::to_string).collect();
    if parts.iter().any(String::is_empty) {
        return Err(IrError::query(pos, format!("malformed field path '{raw}'")));
    }
    Ok(FieldPath {
        is_auto_generated,
        parts,
    })
}

/// 解析查询；空白输入也是错误
pub fn parse_query(input: &str) -> Result<QueryExpr> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(IrError::query(0, "empty query"));
    }
    let mut parser = Parser {
        tokens,
        idx: 0,
        end: input.len(),
        depth: 0,
    };
    let expr = parser.or_expr()?;
    if parser.idx < parser.tokens.len() {
        return Err(IrError::query(parser.pos(), "unexpected trailing input"));
    }
    Ok(expr)
}
