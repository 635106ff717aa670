//! Statement prepare: tokenise INSERT/SELECT/UPDATE/DELETE, bind the row
//! or update targets, and attach a parsed WHERE tree (spec §2 "Statement
//! prepare", §6 "SQL verbs"). SQL keywords are matched lowercase-only —
//! spec.md §9 calls this out as the canonical rule, unlike meta-commands
//! and transaction verbs, which are case-insensitive (handled in
//! `main.rs`, not here).
use crate::errors::Error;
use crate::row::Row;
use crate::sql::where_expr::{ExprArena, Parser};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Insert,
    Select,
    Update,
    Delete,
}

/// `update <username|-> <email|-> where <expr>` or its legacy
/// `update <id> <username|-> <email|->` form; `-` means leave unchanged
/// (spec §4.7 "Update executor").
#[derive(Debug, Clone)]
pub struct UpdateSpec {
    pub legacy_id: Option<u32>,
    pub new_username: Option<String>,
    pub new_email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    pub row: Option<Row>,
    pub where_expr: Option<(ExprArena, u32)>,
    pub update: Option<UpdateSpec>,
    pub delete_id: Option<u32>,
}

impl Statement {
    pub fn prepare(input: &str) -> Result<Statement, Error> {
        let trimmed = input.trim();
        let (keyword, rest) = trimmed
            .split_once(char::is_whitespace)
            .unwrap_or((trimmed, ""));
        match keyword {
            "insert" => Self::prepare_insert(rest),
            "select" => Self::prepare_select(rest),
            "update" => Self::prepare_update(rest),
            "delete" => Self::prepare_delete(rest),
            _ => Err(Error::UnrecognizedStatement(trimmed.to_string())),
        }
    }

    fn prepare_insert(rest: &str) -> Result<Statement, Error> {
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        let [id_tok, username, email] = tokens[..] else {
            return Err(Error::PrepareSyntaxError(
                "usage: insert <id> <username> <email>".into(),
            ));
        };
        let id: i64 = id_tok
            .parse()
            .map_err(|_| Error::PrepareSyntaxError(format!("'{id_tok}' is not an integer")))?;
        if id < 0 {
            return Err(Error::NegativeId);
        }
        let row = Row::new(id as u32, username, email)?;
        Ok(Statement {
            kind: StatementKind::Insert,
            row: Some(row),
            where_expr: None,
            update: None,
            delete_id: None,
        })
    }

    fn prepare_select(rest: &str) -> Result<Statement, Error> {
        let rest = rest.trim();
        let where_expr = if rest.is_empty() {
            None
        } else if let Some(expr) = strip_where(rest) {
            Some(Parser::parse(expr.trim())?)
        } else {
            return Err(Error::PrepareSyntaxError(
                "usage: select [where <expr>]".into(),
            ));
        };
        Ok(Statement {
            kind: StatementKind::Select,
            row: None,
            where_expr,
            update: None,
            delete_id: None,
        })
    }

    fn prepare_update(rest: &str) -> Result<Statement, Error> {
        let rest = rest.trim();
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        if tokens.len() >= 3 && tokens[2] == "where" {
            let username = field_update(tokens[0])?;
            let email = field_update(tokens[1])?;
            let expr_text = tokens[3..].join(" ");
            let (arena, root) = Parser::parse(&expr_text)?;
            return Ok(Statement {
                kind: StatementKind::Update,
                row: None,
                where_expr: Some((arena, root)),
                update: Some(UpdateSpec {
                    legacy_id: None,
                    new_username: username,
                    new_email: email,
                }),
                delete_id: None,
            });
        }
        let [id_tok, username, email] = tokens[..] else {
            return Err(Error::PrepareSyntaxError(
                "usage: update <id> <username|-> <email|-> or update <username|-> <email|-> where <expr>".into(),
            ));
        };
        let id: i64 = id_tok
            .parse()
            .map_err(|_| Error::PrepareSyntaxError(format!("'{id_tok}' is not an integer")))?;
        if id < 0 {
            return Err(Error::NegativeId);
        }
        Ok(Statement {
            kind: StatementKind::Update,
            row: None,
            where_expr: None,
            update: Some(UpdateSpec {
                legacy_id: Some(id as u32),
                new_username: field_update(username)?,
                new_email: field_update(email)?,
            }),
            delete_id: None,
        })
    }

    fn prepare_delete(rest: &str) -> Result<Statement, Error> {
        let rest = rest.trim();
        if let Some(expr) = strip_where(rest) {
            let (arena, root) = Parser::parse(expr.trim())?;
            return Ok(Statement {
                kind: StatementKind::Delete,
                row: None,
                where_expr: Some((arena, root)),
                update: None,
                delete_id: None,
            });
        }
        let id: i64 = rest
            .parse()
            .map_err(|_| Error::PrepareSyntaxError("usage: delete <id> or delete where <expr>".into()))?;
        if id < 0 {
            return Err(Error::NegativeId);
        }
        Ok(Statement {
            kind: StatementKind::Delete,
            row: None,
            where_expr: None,
            update: None,
            delete_id: Some(id as u32),
        })
    }
}

/// Strips a leading `where` keyword, requiring a word boundary after it
/// so `whereabouts = 1` is rejected rather than parsed as `abouts = 1`.
fn strip_where(rest: &str) -> Option<&str> {
    let tail = rest.strip_prefix("where")?;
    if tail.is_empty() || tail.starts_with(char::is_whitespace) {
        Some(tail)
    } else {
        None
    }
}

fn field_update(token: &str) -> Result<Option<String>, Error> {
    if token == "-" {
        Ok(None)
    } else {
        if token.as_bytes().len() > 255 {
            return Err(Error::StringTooLong);
        }
        Ok(Some(token.to_string()))
    }
}
