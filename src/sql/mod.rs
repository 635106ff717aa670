pub mod statement;
pub mod where_expr;

pub use statement::{Statement, StatementKind, UpdateSpec};
pub use where_expr::{ExprArena, ExprNode, Field, Op, Value, MAX_EXPR_NODES};
