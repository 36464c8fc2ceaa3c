//! Compiles the expression AST into a flat bytecode list for the stack VM.
//!
//! The restricted grammar only ever needs numeric and boolean literals; a
//! string or null literal reaching this stage is a compile error, not a
//! runtime one.

use crate::ast::{BinaryOp, Expr, Literal, UnaryOp};
use crate::builtins;
use crate::error::{ExprError, ExprResult};
use crate::vm::{CompiledExpr, Op};

pub fn compile(expr: &Expr) -> ExprResult<CompiledExpr> {
    let mut ops = Vec::new();
    emit(expr, &mut ops)?;
    Ok(CompiledExpr { ops })
}

fn emit(expr: &Expr, ops: &mut Vec<Op>) -> ExprResult<()> {
    match expr {
        Expr::Literal(Literal::Number(n), _) => ops.push(Op::PushNumber(*n)),
        Expr::Literal(Literal::Bool(b), _) => ops.push(Op::PushBool(*b)),
        Expr::Literal(Literal::String(s), span) => {
            return Err(ExprError::UnexpectedToken {
                found: format!("string literal \"{s}\""),
                position: span.start,
            })
        }
        Expr::Literal(Literal::Null, span) => {
            return Err(ExprError::UnexpectedToken {
                found: "null literal".to_string(),
                position: span.start,
            })
        }
        Expr::Var(name, _) => ops.push(Op::LoadVar(name.clone())),
        Expr::Unary(op, inner, _) => {
            emit(inner, ops)?;
            ops.push(match op {
                UnaryOp::Not => Op::Not,
                UnaryOp::Neg => Op::Neg,
            });
        }
        Expr::Binary(op, lhs, rhs, _) => {
            emit(lhs, ops)?;
            emit(rhs, ops)?;
            ops.push(match op {
                BinaryOp::Add => Op::Add,
                BinaryOp::Sub => Op::Sub,
                BinaryOp::Mul => Op::Mul,
                BinaryOp::Div => Op::Div,
                BinaryOp::Mod => Op::Mod,
                BinaryOp::Eq => Op::Eq,
                BinaryOp::NotEq => Op::NotEq,
                BinaryOp::Lt => Op::Lt,
                BinaryOp::Gt => Op::Gt,
                BinaryOp::LtEq => Op::LtEq,
                BinaryOp::GtEq => Op::GtEq,
                BinaryOp::And => Op::And,
                BinaryOp::Or => Op::Or,
            });
        }
        Expr::Call(name, args, span) => {
            let builtin = builtins::lookup(name).ok_or_else(|| ExprError::UnknownFunction(name.clone()))?;
            if args.len() != builtin.arity {
                return Err(ExprError::ArityMismatch {
                    name: name.clone(),
                    expected: builtin.arity,
                    actual: args.len(),
                });
            }
            let _ = span;
            for arg in args {
                emit(arg, ops)?;
            }
            ops.push(Op::Call {
                name: builtin.name,
                arity: builtin.arity,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn compile_src(src: &str) -> ExprResult<CompiledExpr> {
        compile(&Parser::parse(src).unwrap())
    }

    #[test]
    fn compiles_arithmetic_to_postfix_order() {
        let compiled = compile_src("1 + 2").unwrap();
        assert_eq!(
            compiled.ops,
            vec![Op::PushNumber(1.0), Op::PushNumber(2.0), Op::Add]
        );
    }

    #[test]
    fn rejects_unknown_function() {
        assert!(compile_src("bogus(1)").is_err());
    }

    #[test]
    fn rejects_wrong_arity() {
        assert!(compile_src("abs(1, 2)").is_err());
        assert!(compile_src("pow(1)").is_err());
    }

    #[test]
    fn rejects_string_literal() {
        assert!(compile_src("\"on\"").is_err());
    }

    #[test]
    fn accepts_nested_builtin_calls() {
        let compiled = compile_src("max(abs(-1), sqrt(4))").unwrap();
        assert!(compiled.ops.iter().any(|op| matches!(op, Op::Call { name: "max", .. })));
    }
}
