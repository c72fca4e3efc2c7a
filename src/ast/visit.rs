//! Pre-order traversal with a post-visit callback.

use crate::ast::{Expr, ExprKind, File, Pipeline, Stage, Stmt};

#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    File(&'a File),
    Pipeline(&'a Pipeline),
    Stage(&'a Stage),
    Stmt(&'a Stmt),
    Expr(&'a Expr),
}

pub trait Visitor<'a> {
    /// Called before the children of `node`. Returning `false` skips the
    /// children and the matching [`Visitor::leave`].
    fn visit(&mut self, _node: Node<'a>) -> bool {
        true
    }

    /// Called after every child of `node` has been walked.
    fn leave(&mut self, _node: Node<'a>) {}
}

pub fn walk<'a, V: Visitor<'a> + ?Sized>(visitor: &mut V, node: Node<'a>) {
    if !visitor.visit(node) {
        return;
    }

    match node {
        Node::File(file) => {
            for pipeline in &file.pipelines {
                walk(visitor, Node::Pipeline(pipeline));
            }
        }
        Node::Pipeline(pipeline) => {
            if let Some(vars) = &pipeline.vars {
                for spec in &vars.specs {
                    walk(visitor, Node::Stmt(spec));
                }
            }
            for stage in &pipeline.stages {
                walk(visitor, Node::Stage(stage));
            }
        }
        Node::Stage(stage) => {
            if let Some(when) = &stage.when {
                walk(visitor, Node::Expr(when));
            }
            for stmt in &stage.steps.stmts {
                walk(visitor, Node::Stmt(stmt));
            }
        }
        Node::Stmt(stmt) => match stmt {
            Stmt::Assign(assign) => {
                walk(visitor, Node::Expr(&assign.lhs));
                walk(visitor, Node::Expr(&assign.rhs));
            }
            Stmt::Expr(expr) => walk(visitor, Node::Expr(expr)),
            Stmt::Decl(decl) => {
                if let Some(value) = &decl.value {
                    walk(visitor, Node::Expr(value));
                }
            }
        },
        Node::Expr(expr) => walk_expr(visitor, expr),
    }

    visitor.leave(node);
}

fn walk_expr<'a, V: Visitor<'a> + ?Sized>(visitor: &mut V, expr: &'a Expr) {
    match &expr.kind {
        ExprKind::Ident(_) | ExprKind::Literal(_) => {}
        ExprKind::Binary { left, right, .. } => {
            walk(visitor, Node::Expr(left));
            walk(visitor, Node::Expr(right));
        }
        ExprKind::Unary { operand, .. } => walk(visitor, Node::Expr(operand)),
        ExprKind::Call { func, args } => {
            walk(visitor, Node::Expr(func));
            for arg in args {
                walk(visitor, Node::Expr(&arg.value));
            }
        }
        ExprKind::Index { object, index } => {
            walk(visitor, Node::Expr(object));
            walk(visitor, Node::Expr(index));
        }
        ExprKind::Path(path) => {
            walk(visitor, Node::Expr(&path.object));
            for arg in path.args.iter().flatten() {
                walk(visitor, Node::Expr(&arg.value));
            }
        }
        ExprKind::Paren(inner) => walk(visitor, Node::Expr(inner)),
        ExprKind::Closure(closure) => {
            for stmt in &closure.body.stmts {
                walk(visitor, Node::Stmt(stmt));
            }
        }
        ExprKind::Sequence { values, .. } => {
            for value in values {
                walk(visitor, Node::Expr(value));
            }
        }
        ExprKind::KeyValue { value, .. } => walk(visitor, Node::Expr(value)),
        ExprKind::Range { start, end } => {
            walk(visitor, Node::Expr(start));
            walk(visitor, Node::Expr(end));
        }
    }
}
