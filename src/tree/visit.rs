//! A generic read-only visitor over the template tree, in the style of
//! `wikitext::visit::Visitor` in the teacher repo: a trait with default
//! method bodies that delegate to free `walk_*` functions, so a visitor only
//! needs to override the node kinds it actually cares about.
//!
//! The inference engine (C4) does not use this trait directly — threading a
//! [`crate::context::Context`] in and out of every node needs more than a
//! `()`-returning walk can express — but the rewrite applier and smaller
//! read-only passes (collecting call sites, finding a slice by predicate)
//! build on it.

use super::{Branch, Case, Node};

/// Visits a template tree, one node kind at a time.
///
/// Every method has a default body that walks into the node's children via
/// the matching `walk_*` free function, so overriding `visit_print` alone is
/// enough to, say, collect every print expression in a tree.
pub(crate) trait Visitor<'tt, E> {
    fn visit_node(&mut self, node: &'tt Node) -> Result<(), E> {
        walk_node(self, node)
    }

    fn visit_nodes(&mut self, nodes: &'tt [Node]) -> Result<(), E> {
        walk_nodes(self, nodes)
    }

    fn visit_template(&mut self, node: &'tt Node) -> Result<(), E> {
        walk_template(self, node)
    }

    fn visit_raw_text(&mut self, _text: &'tt str) -> Result<(), E> {
        Ok(())
    }

    fn visit_literal(&mut self, _text: &'tt str) -> Result<(), E> {
        Ok(())
    }

    fn visit_print(&mut self, _expr: &'tt str, _directives: &'tt [String]) -> Result<(), E> {
        Ok(())
    }

    fn visit_if(&mut self, node: &'tt Node) -> Result<(), E> {
        walk_if(self, node)
    }

    fn visit_switch(&mut self, node: &'tt Node) -> Result<(), E> {
        walk_switch(self, node)
    }

    fn visit_for(&mut self, node: &'tt Node) -> Result<(), E> {
        walk_for(self, node)
    }

    fn visit_let(&mut self, node: &'tt Node) -> Result<(), E> {
        walk_let(self, node)
    }

    fn visit_call(&mut self, node: &'tt Node) -> Result<(), E> {
        walk_call(self, node)
    }

    fn visit_message(&mut self, node: &'tt Node) -> Result<(), E> {
        walk_message(self, node)
    }
}

pub(crate) fn walk_nodes<'tt, E, V: Visitor<'tt, E> + ?Sized>(
    visitor: &mut V,
    nodes: &'tt [Node],
) -> Result<(), E> {
    for node in nodes {
        visitor.visit_node(node)?;
    }
    Ok(())
}

pub(crate) fn walk_node<'tt, E, V: Visitor<'tt, E> + ?Sized>(
    visitor: &mut V,
    node: &'tt Node,
) -> Result<(), E> {
    match node {
        Node::RawText(s) => visitor.visit_raw_text(&s.node),
        Node::Literal(s) => visitor.visit_literal(&s.node),
        Node::Print { expr, directives, .. } => visitor.visit_print(&expr.node, directives),
        Node::If { .. } => visitor.visit_if(node),
        Node::Switch { .. } => visitor.visit_switch(node),
        Node::For { .. } => visitor.visit_for(node),
        Node::Let(_) => visitor.visit_let(node),
        Node::Call { .. } => visitor.visit_call(node),
        Node::Message { .. } => visitor.visit_message(node),
        Node::Template { .. } => visitor.visit_template(node),
    }
}

pub(crate) fn walk_template<'tt, E, V: Visitor<'tt, E> + ?Sized>(
    visitor: &mut V,
    node: &'tt Node,
) -> Result<(), E> {
    if let Node::Template { body, .. } = node {
        visitor.visit_nodes(body)
    } else {
        Ok(())
    }
}

pub(crate) fn walk_if<'tt, E, V: Visitor<'tt, E> + ?Sized>(
    visitor: &mut V,
    node: &'tt Node,
) -> Result<(), E> {
    if let Node::If { branches, else_body, .. } = node {
        for Branch { body, .. } in branches {
            visitor.visit_nodes(body)?;
        }
        if let Some(body) = else_body {
            visitor.visit_nodes(body)?;
        }
    }
    Ok(())
}

pub(crate) fn walk_switch<'tt, E, V: Visitor<'tt, E> + ?Sized>(
    visitor: &mut V,
    node: &'tt Node,
) -> Result<(), E> {
    if let Node::Switch { cases, default, .. } = node {
        for Case { body, .. } in cases {
            visitor.visit_nodes(body)?;
        }
        if let Some(body) = default {
            visitor.visit_nodes(body)?;
        }
    }
    Ok(())
}

pub(crate) fn walk_for<'tt, E, V: Visitor<'tt, E> + ?Sized>(
    visitor: &mut V,
    node: &'tt Node,
) -> Result<(), E> {
    if let Node::For { body, .. } = node {
        visitor.visit_nodes(body)?;
    }
    Ok(())
}

pub(crate) fn walk_let<'tt, E, V: Visitor<'tt, E> + ?Sized>(
    visitor: &mut V,
    node: &'tt Node,
) -> Result<(), E> {
    if let Node::Let(binding) = node {
        if let super::ValueSource::Block(body) = &binding.value {
            visitor.visit_nodes(body)?;
        }
    }
    Ok(())
}

pub(crate) fn walk_call<'tt, E, V: Visitor<'tt, E> + ?Sized>(
    visitor: &mut V,
    node: &'tt Node,
) -> Result<(), E> {
    if let Node::Call { params, .. } = node {
        for param in params {
            if let super::ValueSource::Block(body) = &param.value {
                visitor.visit_nodes(body)?;
            }
        }
    }
    Ok(())
}

pub(crate) fn walk_message<'tt, E, V: Visitor<'tt, E> + ?Sized>(
    visitor: &mut V,
    node: &'tt Node,
) -> Result<(), E> {
    if let Node::Message { body, .. } = node {
        visitor.visit_nodes(body)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{Span, Spanned};

    struct PrintCollector<'tt> {
        exprs: Vec<&'tt str>,
    }

    impl<'tt> Visitor<'tt, ()> for PrintCollector<'tt> {
        fn visit_print(&mut self, expr: &'tt str, _directives: &'tt [String]) -> Result<(), ()> {
            self.exprs.push(expr);
            Ok(())
        }
    }

    #[test]
    fn collects_nested_prints() {
        let tree = Node::Template {
            id: "t".into(),
            declared_kind: None,
            visibility: super::super::Visibility::Public,
            body: vec![Node::If {
                branches: vec![Branch {
                    condition: Spanned::new("cond".to_owned(), 0, 4),
                    body: vec![Node::Print {
                        expr: Spanned::new("x".to_owned(), 0, 1),
                        directives: vec![],
                        span: Span::new(0, 1),
                    }],
                }],
                else_body: None,
                span: Span::new(0, 1),
            }],
        };

        let mut collector = PrintCollector { exprs: vec![] };
        collector.visit_template(&tree).unwrap();
        assert_eq!(collector.exprs, vec!["x"]);
    }
}
