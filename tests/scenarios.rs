//! End-to-end scenarios from spec §8, plus the cross-cutting properties the
//! same section calls out (idempotence, kind-matched calls needing no
//! escaping). Each scenario builds the literal-text tree the spec's inline
//! template source would produce, since parsing template source is out of
//! scope for this crate.

use contextual_autoescape::{
    rewrite, Error, Kind, Node, Param, Registry, Span, Spanned, TemplateTree, ValueSource,
    Visibility,
};

fn raw(s: &str, at: usize) -> Node {
    Node::RawText(Spanned::new(s.to_owned(), at, at + s.len()))
}

fn print_at(at: usize, len: usize) -> Node {
    Node::Print {
        expr: Spanned::new("expr".to_owned(), at, at + len),
        directives: vec![],
        span: Span::new(at, at + len),
    }
}

fn single_template(kind: Option<Kind>, body: Vec<Node>) -> TemplateTree {
    TemplateTree {
        templates: vec![Node::Template {
            id: "t".into(),
            declared_kind: kind,
            visibility: Visibility::Public,
            body,
        }],
    }
}

fn print_directives(tree: &TemplateTree) -> Vec<String> {
    let Node::Template { body, .. } = &tree.templates[0] else {
        panic!("expected template root");
    };
    for node in body {
        if let Node::Print { directives, .. } = node {
            if !directives.is_empty() {
                return directives.clone();
            }
        }
    }
    Vec::new()
}

/// S1: `Hello, {$world}!` in `HtmlPcdata`.
#[test]
fn s1_pcdata_gets_escape_html() {
    let tree = single_template(
        Some(Kind::Html),
        vec![raw("Hello, ", 0), print_at(7, 1), raw("!", 8)],
    );
    let out = rewrite(&tree, &Registry::new(), "s1.tpl", "ignored");
    assert!(out.errors.is_empty(), "unexpected errors: {:?}", out.errors);
    assert_eq!(print_directives(&out.tree), vec!["escapeHtml"]);
}

/// S2: `<a href="{$u}">` — Uri-start inside a quoted HTML attribute.
#[test]
fn s2_uri_attribute_start_gets_filter_and_trailing_escaper() {
    let tree = single_template(
        Some(Kind::Html),
        vec![raw(r#"<a href=""#, 0), print_at(9, 1), raw(r#"">"#, 10)],
    );
    let out = rewrite(&tree, &Registry::new(), "s2.tpl", "ignored");
    assert!(out.errors.is_empty(), "unexpected errors: {:?}", out.errors);
    assert_eq!(
        print_directives(&out.tree),
        vec!["filterNormalizeUri", "escapeHtmlAttribute"]
    );
}

/// S3: `<script>foo({$x})</script>` — JS value inside a literal script body.
#[test]
fn s3_script_body_value_gets_js_and_phrasing_filter() {
    let tree = single_template(
        Some(Kind::Html),
        vec![raw("<script>foo(", 0), print_at(12, 1), raw(")</script>", 13)],
    );
    let out = rewrite(&tree, &Registry::new(), "s3.tpl", "ignored");
    assert!(out.errors.is_empty(), "unexpected errors: {:?}", out.errors);
    assert_eq!(
        print_directives(&out.tree),
        vec!["escapeJsValue", "filterHtmlScriptPhrasingData"]
    );
}

/// S4: `<a href="{$x}:foo()">` — the dynamic value covers the scheme itself,
/// so no static scheme can be determined.
#[test]
fn s4_dynamic_scheme_is_ambiguous() {
    let tree = single_template(
        Some(Kind::Html),
        vec![raw(r#"<a href=""#, 0), print_at(9, 1), raw(r#":foo()">"#, 10)],
    );
    let out = rewrite(&tree, &Registry::new(), "s4.tpl", "ignored");
    assert!(out
        .errors
        .iter()
        .any(|e| matches!(e, Error::AmbiguousScheme { .. })));
}

/// S5: `<a href="javascript:{$x}">` — a statically known dangerous scheme.
#[test]
fn s5_javascript_scheme_is_unsafe() {
    let tree = single_template(
        Some(Kind::Html),
        vec![
            raw(r#"<a href="javascript:"#, 0),
            print_at(21, 1),
            raw(r#"">"#, 22),
        ],
    );
    let out = rewrite(&tree, &Registry::new(), "s5.tpl", "ignored");
    assert!(out
        .errors
        .iter()
        .any(|e| matches!(e, Error::UnsafeScheme { .. })));
}

/// S6: `<style>body{background:url('{$u}')}</style>` — a bare CSS `url(...)`
/// with no enclosing HTML attribute defaults to the media filter alone.
#[test]
fn s6_bare_css_url_gets_media_filter_only() {
    let tree = single_template(
        Some(Kind::Html),
        vec![
            raw("<style>body{background:url('", 0),
            print_at(29, 1),
            raw("')}</style>", 30),
        ],
    );
    let out = rewrite(&tree, &Registry::new(), "s6.tpl", "ignored");
    assert!(out.errors.is_empty(), "unexpected errors: {:?}", out.errors);
    assert_eq!(print_directives(&out.tree), vec!["filterNormalizeMediaUri"]);
}

/// S7: `<script src='/x?q={$q}'></script>` — a trusted-resource-uri
/// attribute, but once past the scheme into the query phase, only the
/// ordinary URI escaper is needed.
#[test]
fn s7_query_phase_of_trusted_resource_uri_escapes_uri_only() {
    let tree = single_template(
        Some(Kind::Html),
        vec![
            raw("<script src='/x?q=", 0),
            print_at(19, 1),
            raw("'></script>", 20),
        ],
    );
    let out = rewrite(&tree, &Registry::new(), "s7.tpl", "ignored");
    assert!(out.errors.is_empty(), "unexpected errors: {:?}", out.errors);
    assert_eq!(print_directives(&out.tree), vec!["escapeUri"]);
}

/// Property 4: re-running the pass on an already-rewritten tree is a no-op.
#[test]
fn idempotence_rewriting_a_rewritten_tree_does_not_duplicate_directives() {
    let tree = single_template(
        Some(Kind::Html),
        vec![raw("<p>", 0), print_at(3, 1), raw("</p>", 4)],
    );
    let registry = Registry::new();
    let first = rewrite(&tree, &registry, "idempotent.tpl", "ignored");
    assert!(first.errors.is_empty());
    let second = rewrite(&first.tree, &registry, "idempotent.tpl", "ignored");
    assert!(second.errors.is_empty());
    assert_eq!(print_directives(&first.tree), print_directives(&second.tree));
}

/// Property 6: a call from context `C` to a template declared `kind=K` whose
/// start context equals `C` receives no appended directive.
#[test]
fn kind_matched_call_needs_no_directive() {
    let tree = TemplateTree {
        templates: vec![
            Node::Template {
                id: "caller".into(),
                declared_kind: Some(Kind::Html),
                visibility: Visibility::Public,
                body: vec![Node::Call {
                    callee: "callee".into(),
                    params: vec![],
                    strict: true,
                    directives: vec![],
                    span: Span::new(0, 1),
                }],
            },
            Node::Template {
                id: "callee".into(),
                declared_kind: Some(Kind::Html),
                visibility: Visibility::Public,
                body: vec![raw("x", 0)],
            },
        ],
    };
    let out = rewrite(&tree, &Registry::new(), "calls.tpl", "ignored");
    assert!(out.errors.is_empty(), "unexpected errors: {:?}", out.errors);
    let Node::Template { body, .. } = &out.tree.templates[0] else {
        panic!("expected caller template");
    };
    let Node::Call { directives, .. } = &body[0] else {
        panic!("expected call node");
    };
    assert!(directives.is_empty());
}

/// A call whose callee's declared kind differs from the call site's context
/// gets exactly the single-step transformer the planner names, not a full
/// re-contextualization (spec §4.4, §4.6).
#[test]
fn mismatched_kind_call_gets_single_step_transformer() {
    let tree = TemplateTree {
        templates: vec![
            Node::Template {
                id: "caller".into(),
                declared_kind: Some(Kind::Html),
                visibility: Visibility::Public,
                body: vec![Node::Call {
                    callee: "snippet".into(),
                    params: vec![Param {
                        name: "unused".to_owned(),
                        value: ValueSource::Expr(Spanned::new("$x".to_owned(), 0, 2)),
                        span: Span::new(0, 2),
                    }],
                    strict: true,
                    directives: vec![],
                    span: Span::new(0, 1),
                }],
            },
            Node::Template {
                id: "snippet".into(),
                declared_kind: Some(Kind::Js),
                visibility: Visibility::Public,
                body: vec![raw("1", 0)],
            },
        ],
    };
    let out = rewrite(&tree, &Registry::new(), "calls.tpl", "ignored");
    assert!(out.errors.is_empty(), "unexpected errors: {:?}", out.errors);
    let Node::Template { body, .. } = &out.tree.templates[0] else {
        panic!("expected caller template");
    };
    let Node::Call { directives, .. } = &body[0] else {
        panic!("expected call node");
    };
    assert_eq!(directives, &vec!["escapeHtml".to_owned()]);
}
