//! The external template tree (spec §3.2): a concrete, minimal
//! representation of the node kinds the engine consumes. Parsing a template
//! source language into this tree is out of scope (spec §1 Non-goals); the
//! tree is the engine's *input* shape.

pub(crate) mod visit;

use crate::context::Kind;
use crate::span::Span;
use std::fmt;

/// Identifies a template by its fully-qualified name.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, serde::Serialize, serde::Deserialize)]
pub struct TemplateId(pub String);

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TemplateId {
    fn from(s: &str) -> Self {
        TemplateId(s.to_owned())
    }
}

/// Whether a template may be called from outside its own file (affects
/// whether the planner must treat all entry contexts as possible, per spec
/// §4.3 "public templates are analyzed from every kind their callers use").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Visibility {
    Public,
    Private,
}

/// Whether a `{let}`/`{param}` carries an inline expression or a block body.
#[derive(Clone, Debug)]
pub enum ValueSource {
    Expr(Spanned<String>),
    Block(Vec<Node>),
}

/// A spanned piece of text, reused for raw text runs and bare expressions
/// whose own grammar is out of scope.
pub use crate::span::Spanned;

/// A single named value bound by `{let $x: ...}` or passed as `{param foo:
/// ...}`.
#[derive(Clone, Debug)]
pub struct Binding {
    pub name: String,
    /// A declared content kind (`{let $x kind="html"}`) forces the engine to
    /// validate the binding's inferred exit context against that kind
    /// rather than inferring it fresh (spec §4.3).
    pub declared_kind: Option<Kind>,
    pub value: ValueSource,
    pub span: Span,
}

/// A template parameter passed at a call site.
#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
    pub value: ValueSource,
    pub span: Span,
}

/// One conditional arm: a guard expression plus its body.
#[derive(Clone, Debug)]
pub struct Branch {
    pub condition: Spanned<String>,
    pub body: Vec<Node>,
}

/// One `{case}` arm of a `{switch}`.
#[derive(Clone, Debug)]
pub struct Case {
    pub values: Spanned<String>,
    pub body: Vec<Node>,
}

/// A node of the external template tree (spec §3.2).
#[derive(Clone, Debug)]
pub enum Node {
    /// Literal source text, opaque to the template language itself (the
    /// unit the raw-text lexer advances over).
    RawText(Spanned<String>),

    /// `{literal}...{/literal}`: text that bypasses further template
    /// processing but is still lexed for contextual escaping, since its
    /// surrounding HTML/JS/CSS structure still matters.
    Literal(Spanned<String>),

    /// `{$expr}` or `{$expr |directive}`: the hole the rewrite applier
    /// fills in with the inferred escaping pipeline. `directives` starts
    /// empty (or with author-specified directives) and is appended to by
    /// the rewrite applier (C7).
    Print {
        expr: Spanned<String>,
        directives: Vec<String>,
        span: Span,
    },

    If {
        branches: Vec<Branch>,
        else_body: Option<Vec<Node>>,
        span: Span,
    },

    Switch {
        expr: Spanned<String>,
        cases: Vec<Case>,
        default: Option<Vec<Node>>,
        span: Span,
    },

    /// `{for $x in $xs}...{/for}`. Spec §4.3 requires reentrant contexts to
    /// reach a fixed point before the loop's exit context is trusted.
    For {
        var: String,
        collection: Spanned<String>,
        body: Vec<Node>,
        span: Span,
    },

    Let(Binding),

    /// A call to another template, optionally introducing a new `kind`
    /// nesting boundary if the callee's declared kind differs from the
    /// context it is called in (spec §4.3 "contextual calls").
    Call {
        callee: TemplateId,
        params: Vec<Param>,
        /// `strict` calls require the callee to have a fully-inferred,
        /// non-`Text` content kind (spec §7 `StrictCallOfNonStrict`).
        strict: bool,
        /// The single-step transformer the rewrite applier attaches when
        /// the callee's declared kind differs from the call site's context
        /// (spec §4.4, §4.6); empty when the callee's kind matches exactly
        /// or the callee is contextual (re-contextualized instead).
        directives: Vec<String>,
        span: Span,
    },

    /// A localizable message block. Escaping-wise it behaves like its
    /// content kind's normal body, but only a fixed allow-list of contexts
    /// may directly contain one (spec §7 `MessageInDisallowedContext`).
    Message { body: Vec<Node>, span: Span },

    /// The root of a single template definition.
    Template {
        id: TemplateId,
        /// `None` means the kind must be inferred bottom-up from the
        /// template's own body (a `deduced`/`strict-html`-style template);
        /// `Some` means the author declared it and the inferred exit
        /// context must match (spec §4.3, §7 `KindExitMismatch`).
        declared_kind: Option<Kind>,
        visibility: Visibility,
        body: Vec<Node>,
    },
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::RawText(s) | Node::Literal(s) => s.span,
            Node::Print { span, .. }
            | Node::If { span, .. }
            | Node::Switch { span, .. }
            | Node::For { span, .. }
            | Node::Call { span, .. }
            | Node::Message { span, .. } => *span,
            Node::Let(b) => b.span,
            Node::Template { body, .. } => body
                .first()
                .map(Node::span)
                .unwrap_or(Span::new(0, 0)),
        }
    }
}

/// A full compilation unit: every template the engine is asked to analyze
/// together, so that calls can be resolved and cloned against each other.
#[derive(Clone, Debug, Default)]
pub struct TemplateTree {
    pub templates: Vec<Node>,
}

impl TemplateTree {
    pub fn find(&self, id: &TemplateId) -> Option<&Node> {
        self.templates.iter().find(|n| match n {
            Node::Template { id: tid, .. } => tid == id,
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_id_display() {
        let id = TemplateId::from("foo.bar");
        assert_eq!(id.to_string(), "foo.bar");
    }

    #[test]
    fn tree_find_by_id() {
        let tree = TemplateTree {
            templates: vec![Node::Template {
                id: "a".into(),
                declared_kind: None,
                visibility: Visibility::Public,
                body: vec![],
            }],
        };
        assert!(tree.find(&TemplateId::from("a")).is_some());
        assert!(tree.find(&TemplateId::from("b")).is_none());
    }
}
