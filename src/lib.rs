//! A static contextual autoescaper for a server-side HTML templating
//! system: given a template tree and a registry of known directives and
//! declared content kinds, infers the HTML/CSS/JS/URI context of every
//! dynamic print site and rewrites it with the escaping directive pipeline
//! that makes it safe, synthesizing per-context template clones where a
//! shared (non-strict) template is called from more than one context.
//!
//! This crate implements the analysis pass only (spec §1 Non-goals): it
//! does not parse template source text, does not render output, and does
//! not implement the escaping/filter functions the directive names refer
//! to — those are supplied by the caller's runtime.

mod context;
mod directives;
mod infer;
mod lexer;
mod registry;
mod rewrite;
mod span;
mod tree;
mod validate;

pub use context::Kind;
pub use lexer::{Slice, Slices};
pub use registry::Registry;
pub use rewrite::RewriteOutput;
pub use span::{Span, Spanned};
pub use tree::{
    Binding, Branch, Case, Node, Param, TemplateId, TemplateTree, ValueSource, Visibility,
};
pub use validate::{Error, FatalError, Location};

pub use registry::{is_special_tag, uri_attribute_category};
pub use validate::validate_registry;

/// Runs the contextual autoescaper over `tree` (spec §6.3).
///
/// `file` is the logical name used in located errors; `source` is the full
/// template source text the tree's spans are relative to (used only to
/// recover line/column/excerpt information, never reparsed).
///
/// Errors are collected rather than propagated: a single call can surface
/// every contextual-escaping problem in the tree at once, matching the
/// engine's single-pass, synchronous design (spec §5, §7).
pub fn rewrite(tree: &TemplateTree, registry: &Registry, file: &str, source: &str) -> RewriteOutput {
    rewrite::rewrite(tree, registry, file, source)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn end_to_end_html_escape() {
        init_logger();
        let tree = TemplateTree {
            templates: vec![Node::Template {
                id: "greeting".into(),
                declared_kind: Some(Kind::Html),
                visibility: Visibility::Public,
                body: vec![
                    Node::RawText(Spanned::new("<p>Hello, ".to_owned(), 0, 10)),
                    Node::Print {
                        expr: Spanned::new("$name".to_owned(), 10, 15),
                        directives: vec![],
                        span: Span::new(10, 15),
                    },
                    Node::RawText(Spanned::new("!</p>".to_owned(), 15, 20)),
                ],
            }],
        };
        let registry = Registry::new();
        let out = rewrite(&tree, &registry, "greeting.soy", "<p>Hello, {$name}!</p>");
        assert!(out.errors.is_empty());
        assert!(out.synthesized.is_empty());
        let Node::Template { body, .. } = &out.tree.templates[0] else {
            panic!("expected template root");
        };
        let Node::Print { directives, .. } = &body[1] else {
            panic!("expected print node");
        };
        assert_eq!(directives, &vec!["escapeHtml".to_owned()]);
    }
}
