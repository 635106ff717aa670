//! Arena-indexed WHERE expression tree and recursive-descent parser
//! (spec §3 "WHERE expression tree", §4.6). Replaces the teacher's two
//! coexisting parsers (`sql.rs`'s ad hoc splitter and the orphaned
//! `sql/parser.rs` tokenizer) with the single arena-based grammar spec.md
//! §9 calls for.
use crate::errors::Error;
use crate::row::Row;

pub const MAX_EXPR_NODES: usize = 30;
pub const INVALID: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    Username,
    Email,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(u32),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprNode {
    Basic { field: Field, op: Op, value: Value },
    And { left: u32, right: u32 },
    Or { left: u32, right: u32 },
}

/// A fixed-capacity arena of expression nodes, owned by its `Statement`
/// and never escaping it (spec §3).
#[derive(Debug, Clone, Default)]
pub struct ExprArena {
    nodes: Vec<ExprNode>,
}

impl ExprArena {
    pub fn new() -> Self {
        ExprArena { nodes: Vec::new() }
    }

    fn push(&mut self, node: ExprNode) -> Result<u32, Error> {
        if self.nodes.len() >= MAX_EXPR_NODES {
            return Err(Error::PrepareSyntaxError(
                "WHERE expression exceeds 30 nodes".into(),
            ));
        }
        self.nodes.push(node);
        Ok((self.nodes.len() - 1) as u32)
    }

    pub fn get(&self, idx: u32) -> &ExprNode {
        &self.nodes[idx as usize]
    }

    /// Post-order evaluation with short-circuiting for And/Or (spec §4.6).
    pub fn eval(&self, idx: u32, row: &Row) -> bool {
        match self.get(idx) {
            ExprNode::Basic { field, op, value } => eval_basic(row, *field, *op, value),
            ExprNode::And { left, right } => self.eval(*left, row) && self.eval(*right, row),
            ExprNode::Or { left, right } => self.eval(*left, row) || self.eval(*right, row),
        }
    }

    /// If the root is a top-level `id = k` comparison not nested under an
    /// `Or`, return `k` (planner's `IndexLookup` fast path, spec §4.7).
    pub fn top_level_id_eq(&self, root: u32) -> Option<u32> {
        match self.get(root) {
            ExprNode::Basic {
                field: Field::Id,
                op: Op::Eq,
                value: Value::Int(k),
            } => Some(*k),
            ExprNode::And { left, right } => {
                self.top_level_id_eq(*left).or_else(|| self.top_level_id_eq(*right))
            }
            _ => None,
        }
    }

    /// If the root carries a top-level `id` range predicate not nested
    /// under an `Or`, return `(start_key, forward)` per spec §4.7.
    pub fn top_level_id_range(&self, root: u32) -> Option<(u32, bool)> {
        match self.get(root) {
            ExprNode::Basic {
                field: Field::Id,
                op,
                value: Value::Int(k),
            } => match op {
                Op::Ge => Some((*k, true)),
                Op::Gt => Some((k.saturating_add(1), true)),
                Op::Le | Op::Lt => Some((0, true)),
                _ => None,
            },
            ExprNode::And { left, right } => self
                .top_level_id_range(*left)
                .or_else(|| self.top_level_id_range(*right)),
            _ => None,
        }
    }
}

fn eval_basic(row: &Row, field: Field, op: Op, value: &Value) -> bool {
    match field {
        Field::Id => {
            let Value::Int(v) = value else { return false };
            compare(row.id, *v, op)
        }
        Field::Username => {
            let Value::Text(v) = value else { return false };
            compare_str(&row.username, v, op)
        }
        Field::Email => {
            let Value::Text(v) = value else { return false };
            compare_str(&row.email, v, op)
        }
    }
}

fn compare<T: PartialOrd + PartialEq>(lhs: T, rhs: T, op: Op) -> bool {
    match op {
        Op::Eq => lhs == rhs,
        Op::Ne => lhs != rhs,
        Op::Lt => lhs < rhs,
        Op::Le => lhs <= rhs,
        Op::Gt => lhs > rhs,
        Op::Ge => lhs >= rhs,
    }
}

fn compare_str(lhs: &str, rhs: &str, op: Op) -> bool {
    compare(lhs.as_bytes(), rhs.as_bytes(), op)
}

/// Recursive-descent parser over the grammar in spec §4.6:
/// `or := and ("or" and)*`, `and := prim ("and" prim)*`,
/// `prim := "(" or ")" | basic`, keywords case-insensitive.
pub struct Parser<'a> {
    tokens: Vec<&'a str>,
    pos: usize,
    arena: ExprArena,
}

impl<'a> Parser<'a> {
    pub fn parse(input: &'a str) -> Result<(ExprArena, u32), Error> {
        let tokens = tokenize(input);
        let mut parser = Parser {
            tokens,
            pos: 0,
            arena: ExprArena::new(),
        };
        let root = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(Error::PrepareSyntaxError(format!(
                "unexpected trailing token '{}'",
                parser.tokens[parser.pos]
            )));
        }
        Ok((parser.arena, root))
    }

    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<&'a str> {
        let tok = self.peek();
        self.pos += 1;
        tok
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.peek().is_some_and(|t| t.eq_ignore_ascii_case(kw)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<u32, Error> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("or") {
            let right = self.parse_and()?;
            left = self.arena.push(ExprNode::Or { left, right })?;
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<u32, Error> {
        let mut left = self.parse_prim()?;
        while self.eat_keyword("and") {
            let right = self.parse_prim()?;
            left = self.arena.push(ExprNode::And { left, right })?;
        }
        Ok(left)
    }

    fn parse_prim(&mut self) -> Result<u32, Error> {
        if self.peek() == Some("(") {
            self.advance();
            let inner = self.parse_or()?;
            if self.advance() != Some(")") {
                return Err(Error::PrepareSyntaxError("expected ')'".into()));
            }
            return Ok(inner);
        }
        self.parse_basic()
    }

    fn parse_basic(&mut self) -> Result<u32, Error> {
        let field = match self.advance() {
            Some(tok) if tok.eq_ignore_ascii_case("id") => Field::Id,
            Some(tok) if tok.eq_ignore_ascii_case("username") => Field::Username,
            Some(tok) if tok.eq_ignore_ascii_case("email") => Field::Email,
            Some(tok) => {
                return Err(Error::PrepareSyntaxError(format!(
                    "expected field name, got '{tok}'"
                )))
            }
            None => return Err(Error::PrepareSyntaxError("expected field name".into())),
        };
        let op = match self.advance() {
            Some("=") => Op::Eq,
            Some("!=") | Some("<>") => Op::Ne,
            Some(">=") => Op::Ge,
            Some("<=") => Op::Le,
            Some(">") => Op::Gt,
            Some("<") => Op::Lt,
            Some(tok) => {
                return Err(Error::PrepareSyntaxError(format!(
                    "expected comparison operator, got '{tok}'"
                )))
            }
            None => return Err(Error::PrepareSyntaxError("expected operator".into())),
        };
        let raw = self
            .advance()
            .ok_or_else(|| Error::PrepareSyntaxError("expected value".into()))?;
        let value = if field == Field::Id {
            let n: i64 = raw
                .parse()
                .map_err(|_| Error::PrepareSyntaxError(format!("'{raw}' is not an integer")))?;
            if n < 0 {
                return Err(Error::NegativeId);
            }
            Value::Int(n as u32)
        } else {
            let text = raw.trim_matches('"').to_string();
            if text.as_bytes().len() > 255 {
                return Err(Error::StringTooLong);
            }
            Value::Text(text)
        };
        self.arena.push(ExprNode::Basic { field, op, value })
    }
}

/// Whitespace-insensitive tokenizer: words, parens, and multi-char
/// operators (`!=`, `<=`, `>=`, `<>`) as distinct tokens; quoted strings
/// kept intact with their quotes (stripped later in `parse_basic`).
fn tokenize(input: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '(' || c == ')' {
            tokens.push(&input[i..i + 1]);
            i += 1;
            continue;
        }
        if c == '"' {
            let start = i;
            i += 1;
            while i < bytes.len() && bytes[i] as char != '"' {
                i += 1;
            }
            i = (i + 1).min(bytes.len());
            tokens.push(&input[start..i]);
            continue;
        }
        if matches!(c, '!' | '<' | '>' | '=') {
            let start = i;
            i += 1;
            if i < bytes.len() && bytes[i] as char == '=' {
                i += 1;
            }
            tokens.push(&input[start..i]);
            continue;
        }
        let start = i;
        while i < bytes.len() {
            let c = bytes[i] as char;
            if c.is_whitespace() || c == '(' || c == ')' || matches!(c, '!' | '<' | '>' | '=') {
                break;
            }
            i += 1;
        }
        tokens.push(&input[start..i]);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: u32, username: &str, email: &str) -> Row {
        Row::new(id, username, email).unwrap()
    }

    #[test]
    fn parses_and_evaluates_basic_equality() {
        let (arena, root) = Parser::parse("id = 5").unwrap();
        assert!(arena.eval(root, &row(5, "a", "b")));
        assert!(!arena.eval(root, &row(6, "a", "b")));
    }

    #[test]
    fn and_short_circuits_correctly() {
        let (arena, root) = Parser::parse("id >= 10 and id < 13").unwrap();
        assert!(arena.eval(root, &row(11, "a", "b")));
        assert!(!arena.eval(root, &row(13, "a", "b")));
    }

    #[test]
    fn or_binds_looser_than_and() {
        let (arena, root) = Parser::parse("id = 1 and username = \"a\" or id = 2").unwrap();
        assert!(arena.eval(root, &row(2, "z", "z")));
        assert!(arena.eval(root, &row(1, "a", "z")));
        assert!(!arena.eval(root, &row(1, "b", "z")));
    }

    #[test]
    fn parens_override_precedence() {
        let (arena, root) = Parser::parse("id = 1 and (username = \"a\" or id = 2)").unwrap();
        assert!(!arena.eval(root, &row(2, "z", "z")));
    }

    #[test]
    fn negative_id_value_is_rejected() {
        assert!(matches!(Parser::parse("id = -1"), Err(Error::NegativeId)));
    }

    #[test]
    fn oversized_string_value_is_rejected() {
        let long = "x".repeat(256);
        assert!(matches!(
            Parser::parse(&format!("username = {long}")),
            Err(Error::StringTooLong)
        ));
    }

    #[test]
    fn top_level_id_eq_is_detected_for_planner() {
        let (arena, root) = Parser::parse("id = 500").unwrap();
        assert_eq!(arena.top_level_id_eq(root), Some(500));
        let (arena, root) = Parser::parse("username = \"x\"").unwrap();
        assert_eq!(arena.top_level_id_eq(root), None);
    }

    #[test]
    fn top_level_id_eq_is_not_detected_under_or() {
        let (arena, root) = Parser::parse("id = 1 or id = 2").unwrap();
        assert_eq!(arena.top_level_id_eq(root), None);
    }
}
