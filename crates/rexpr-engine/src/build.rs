//! AST to unbound node tree.
//!
//! Member chains are flattened into one `Member` node per chain. Forms the
//! engine refuses to evaluate (assignment, update, `delete`, `void`,
//! `instanceof`, `this`) fail here rather than at evaluation time.

use std::rc::Rc;

use rexpr_types::ast::{
    Argument, ArrayElement, Expr, ExprKind, MemberProperty, ObjectMember, PropertyKey,
    UnaryOp,
};

use crate::error::BuildError;
use crate::member::{Segment, SegmentKey};
use crate::node::{self, ExprNode, NodeKind};
use crate::value::Value;

/// Parse `source` and build its unbound tree.
pub(crate) fn build(source: &str) -> Result<Rc<ExprNode>, BuildError> {
    let expr = rexpr_parser::parse(source)?;
    TreeBuilder { source }.node(&expr)
}

struct TreeBuilder<'a> {
    source: &'a str,
}

impl TreeBuilder<'_> {
    fn text(&self, expr: &Expr) -> &str {
        expr.span.slice(self.source)
    }

    fn unsupported(&self, construct: &'static str, expr: &Expr) -> BuildError {
        BuildError::Unsupported {
            construct,
            expression: self.text(expr).to_string(),
        }
    }

    fn leaf(&self, kind: NodeKind, expr: &Expr) -> Rc<ExprNode> {
        ExprNode::new(kind, self.text(expr), vec![])
    }

    fn node(&self, expr: &Expr) -> Result<Rc<ExprNode>, BuildError> {
        let text = self.text(expr);
        let node = match &expr.kind {
            // ── Literals ──
            ExprKind::Number(n) => self.leaf(NodeKind::Literal(Value::Number(*n)), expr),
            ExprKind::String(s) => self.leaf(NodeKind::Literal(Value::string(s.as_str())), expr),
            ExprKind::Boolean(b) => self.leaf(NodeKind::Literal(Value::Bool(*b)), expr),
            ExprKind::Null => self.leaf(NodeKind::Literal(Value::Null), expr),
            ExprKind::Undefined => self.leaf(NodeKind::Literal(Value::Undefined), expr),
            ExprKind::Template {
                quasis,
                expressions,
            } => {
                let children = self.nodes(expressions)?;
                let quasis = quasis.iter().map(|q| Rc::from(q.as_str())).collect();
                ExprNode::new(NodeKind::Template { quasis }, text, children)
            }
            ExprKind::Array(elements) => {
                let mut children = Vec::with_capacity(elements.len());
                for element in elements {
                    children.push(match element {
                        ArrayElement::Item(item) => self.node(item)?,
                        ArrayElement::Spread(inner) => self.spread(inner)?,
                        ArrayElement::Hole(_) => ExprNode::new(NodeKind::Literal(Value::Undefined), "", vec![]),
                    });
                }
                ExprNode::new(NodeKind::Array, text, children)
            }
            ExprKind::Object(members) => {
                let mut children = Vec::with_capacity(members.len());
                for member in members {
                    children.push(self.object_member(member)?);
                }
                ExprNode::new(NodeKind::Object, text, children)
            }

            // ── References ──
            ExprKind::Identifier(name) => self.leaf(
                NodeKind::Identifier {
                    name: Rc::from(name.as_str()),
                },
                expr,
            ),
            ExprKind::This => return Err(self.unsupported("this", expr)),
            ExprKind::Member { .. } => self.member_chain(expr)?,

            // ── Calls ──
            ExprKind::Call {
                callee,
                args,
                optional,
            } => {
                let mut children = vec![self.node(callee)?];
                children.extend(self.arguments(args)?);
                ExprNode::new(NodeKind::Call { optional: *optional }, text, children)
            }
            ExprKind::New { callee, args } => {
                let mut children = vec![self.node(callee)?];
                children.extend(self.arguments(args)?);
                ExprNode::new(NodeKind::New, text, children)
            }

            // ── Operators ──
            ExprKind::Unary { op, operand } => {
                let Some(kind) = NodeKind::unary(*op) else {
                    let construct = if *op == UnaryOp::Void { "void" } else { "delete" };
                    return Err(self.unsupported(construct, expr));
                };
                ExprNode::new(kind, text, vec![self.node(operand)?])
            }
            ExprKind::Update { .. } => return Err(self.unsupported("update", expr)),
            ExprKind::Assign { .. } => return Err(self.unsupported("assignment", expr)),
            ExprKind::Binary { op, left, right } => {
                let Some(kind) = NodeKind::binary(*op) else {
                    return Err(self.unsupported("instanceof", expr));
                };
                ExprNode::new(kind, text, vec![self.node(left)?, self.node(right)?])
            }
            ExprKind::Logical { op, left, right } => ExprNode::new(
                NodeKind::Logical(*op),
                text,
                vec![self.node(left)?, self.node(right)?],
            ),
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => ExprNode::new(
                NodeKind::Conditional,
                text,
                vec![self.node(test)?, self.node(consequent)?, self.node(alternate)?],
            ),
            ExprKind::Sequence(items) => ExprNode::new(NodeKind::Sequence, text, self.nodes(items)?),
        };
        Ok(node)
    }

    fn nodes(&self, exprs: &[Expr]) -> Result<Vec<Rc<ExprNode>>, BuildError> {
        exprs.iter().map(|e| self.node(e)).collect()
    }

    fn spread(&self, inner: &Expr) -> Result<Rc<ExprNode>, BuildError> {
        let text = format!("...{}", self.text(inner));
        Ok(ExprNode::new(NodeKind::Spread, text, vec![self.node(inner)?]))
    }

    fn arguments(&self, args: &[Argument]) -> Result<Vec<Rc<ExprNode>>, BuildError> {
        args.iter()
            .map(|arg| match arg {
                Argument::Item(item) => self.node(item),
                Argument::Spread(inner) => self.spread(inner),
            })
            .collect()
    }

    fn object_member(&self, member: &ObjectMember) -> Result<Rc<ExprNode>, BuildError> {
        match member {
            ObjectMember::Spread(inner) => self.spread(inner),
            ObjectMember::Property {
                key, value, span, ..
            } => {
                let text = span.slice(self.source);
                let node = match key {
                    PropertyKey::Named(name) => ExprNode::new(
                        NodeKind::Property(node::PropertyKey::Static(Rc::from(name.as_str()))),
                        text,
                        vec![self.node(value)?],
                    ),
                    PropertyKey::Computed(key) => ExprNode::new(
                        NodeKind::Property(node::PropertyKey::Computed),
                        text,
                        vec![self.node(key)?, self.node(value)?],
                    ),
                };
                Ok(node)
            }
        }
    }

    /// Flatten `a.b[c]?.d` into one member node over base `a`.
    ///
    /// `?.` needs no segment of its own: every member read of a nullish
    /// value is `undefined`.
    fn member_chain(&self, expr: &Expr) -> Result<Rc<ExprNode>, BuildError> {
        let mut links = Vec::new();
        let mut base = expr;
        while let ExprKind::Member {
            object, property, ..
        } = &base.kind
        {
            links.push(property);
            base = object;
        }
        links.reverse();

        let mut children = vec![self.node(base)?];
        let mut segments = Vec::with_capacity(links.len());
        for property in links {
            let key = match property {
                MemberProperty::Named(name) => SegmentKey::Static(Rc::from(name.as_str())),
                MemberProperty::Computed(index) => {
                    let index_node =
                        ExprNode::new(NodeKind::Index, self.text(index), vec![self.node(index)?]);
                    children.push(index_node);
                    SegmentKey::Computed(children.len() - 1)
                }
            };
            segments.push(Segment { key });
        }
        Ok(ExprNode::new(
            NodeKind::Member { segments },
            self.text(expr),
            children,
        ))
    }
}
