//! The rewrite applier (C7): turns an [`crate::infer::InferenceOutput`] into
//! a new template tree with print directives filled in and per-context
//! template clones synthesized with deterministic names (spec §4.6, §6.3).

use crate::context::Context;
use crate::infer::{self, InferenceOutput};
use crate::lexer::Slices;
use crate::registry::Registry;
use crate::span::Span;
use crate::tree::{Node, TemplateId, TemplateTree, ValueSource, Visibility};
use crate::validate::Error;
use indexmap::IndexMap;

/// The result of [`rewrite`]: the rewritten tree, the ids of every clone
/// template that was synthesized, any errors collected along the way, and
/// the raw-text lexer slices for every text-bearing node (spec §6.3, §9).
pub struct RewriteOutput {
    pub tree: TemplateTree,
    pub synthesized: Vec<TemplateId>,
    pub errors: Vec<Error>,
    pub slices: IndexMap<Span, Slices>,
}

/// `rewrite(tree, registry) -> (tree', synthesized_templates, errors)`
/// (spec §6.3). `file`/`source` are the template's logical filename and
/// full text, used only to build located errors.
pub(crate) fn rewrite(tree: &TemplateTree, registry: &Registry, file: &str, source: &str) -> RewriteOutput {
    let out = infer::infer(tree, registry, file, source);

    let mut templates: Vec<Node> = tree.templates.iter().map(|n| rewrite_node(n, &out)).collect();
    let mut synthesized = Vec::new();

    for (base_id, ctx) in out.clone_exits.keys() {
        let Some(Node::Template { body, .. }) = tree.find(base_id) else {
            continue;
        };
        let clone_id = synthesize_clone_id(base_id, *ctx);
        let cloned_body = body.iter().map(|n| rewrite_node(n, &out)).collect();
        templates.push(Node::Template {
            id: clone_id.clone(),
            declared_kind: None,
            visibility: Visibility::Private,
            body: cloned_body,
        });
        synthesized.push(clone_id);
    }

    RewriteOutput {
        tree: TemplateTree { templates },
        synthesized,
        errors: out.errors,
        slices: out.slices,
    }
}

fn rewrite_node(node: &Node, out: &InferenceOutput) -> Node {
    match node {
        Node::RawText(s) => Node::RawText(s.clone()),
        Node::Literal(s) => Node::Literal(s.clone()),
        Node::Print { expr, directives, span } => Node::Print {
            expr: expr.clone(),
            directives: out
                .print_directives
                .get(span)
                .cloned()
                .unwrap_or_else(|| directives.clone()),
            span: *span,
        },
        Node::If { branches, else_body, span } => Node::If {
            branches: branches
                .iter()
                .map(|b| crate::tree::Branch {
                    condition: b.condition.clone(),
                    body: b.body.iter().map(|n| rewrite_node(n, out)).collect(),
                })
                .collect(),
            else_body: else_body
                .as_ref()
                .map(|body| body.iter().map(|n| rewrite_node(n, out)).collect()),
            span: *span,
        },
        Node::Switch { expr, cases, default, span } => Node::Switch {
            expr: expr.clone(),
            cases: cases
                .iter()
                .map(|c| crate::tree::Case {
                    values: c.values.clone(),
                    body: c.body.iter().map(|n| rewrite_node(n, out)).collect(),
                })
                .collect(),
            default: default
                .as_ref()
                .map(|body| body.iter().map(|n| rewrite_node(n, out)).collect()),
            span: *span,
        },
        Node::For { var, collection, body, span } => Node::For {
            var: var.clone(),
            collection: collection.clone(),
            body: body.iter().map(|n| rewrite_node(n, out)).collect(),
            span: *span,
        },
        Node::Let(binding) => Node::Let(crate::tree::Binding {
            name: binding.name.clone(),
            declared_kind: binding.declared_kind,
            value: rewrite_value(&binding.value, out),
            span: binding.span,
        }),
        Node::Call { callee, params, strict, span, .. } => Node::Call {
            callee: out.call_targets.get(span).cloned().unwrap_or_else(|| callee.clone()),
            params: params
                .iter()
                .map(|p| crate::tree::Param {
                    name: p.name.clone(),
                    value: rewrite_value(&p.value, out),
                    span: p.span,
                })
                .collect(),
            strict: *strict,
            directives: out
                .call_directives
                .get(span)
                .map(|d| vec![d.to_string()])
                .unwrap_or_default(),
            span: *span,
        },
        Node::Message { body, span } => Node::Message {
            body: body.iter().map(|n| rewrite_node(n, out)).collect(),
            span: *span,
        },
        Node::Template { id, declared_kind, visibility, body } => Node::Template {
            id: id.clone(),
            declared_kind: *declared_kind,
            visibility: *visibility,
            body: body.iter().map(|n| rewrite_node(n, out)).collect(),
        },
    }
}

fn rewrite_value(value: &ValueSource, out: &InferenceOutput) -> ValueSource {
    match value {
        ValueSource::Expr(e) => ValueSource::Expr(e.clone()),
        ValueSource::Block(body) => ValueSource::Block(body.iter().map(|n| rewrite_node(n, out)).collect()),
    }
}

/// Deterministic clone name: `name__C<hash>`, where `hash` is FNV-1a over
/// the context's canonical `Debug` string (spec §4.6, §9). Using the debug
/// string rather than hashing the struct's bytes directly keeps the name
/// stable across field reordering and keeps it legible when inspecting the
/// synthesized templates.
pub(crate) fn synthesize_clone_id(base: &TemplateId, ctx: Context) -> TemplateId {
    let hash = fnv1a(format!("{ctx:?}").as_bytes());
    TemplateId(format!("{base}__C{hash:x}"))
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    bytes.iter().fold(OFFSET_BASIS, |hash, &b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_naming_is_deterministic_and_context_sensitive() {
        let id = TemplateId::from("foo");
        let a = synthesize_clone_id(&id, Context::html_pcdata());
        let b = synthesize_clone_id(&id, Context::html_pcdata());
        let c = synthesize_clone_id(&id, Context::js());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.0.starts_with("foo__C"));
    }
}
