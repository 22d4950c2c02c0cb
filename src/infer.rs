//! The inference engine (C4): a forward, fixed-point dataflow pass that
//! threads a [`Context`] through a template tree, consulting the directive
//! planner (C5) at every print site and the validator (C6) at every
//! context-sensitive placement, and collecting [`Error`]s rather than
//! aborting on the first one (spec §4.3, §7, §9).

use crate::context::{union, AttributeType, Context, Kind, State, UnionResult, UriPart};
use crate::directives::{self, PlanError};
use crate::lexer::{self, Slices};
use crate::registry::Registry;
use crate::span::{FileMap, Span};
use crate::tree::{Binding, Branch, Case, Node, Param, TemplateId, TemplateTree, ValueSource};
use crate::validate::{self, Error, Location};
use indexmap::{IndexMap, IndexSet};

/// Everything the rewrite applier (C7) needs to turn inference results into
/// a rewritten tree.
pub(crate) struct InferenceOutput {
    pub errors: Vec<Error>,
    /// The final directive list for each print site (the print's own
    /// author-specified directives with the planned pipeline appended,
    /// reordered, and short-circuited per spec §4.4), keyed by the print
    /// node's span.
    pub print_directives: IndexMap<Span, Vec<String>>,
    /// Raw-text lexer slices for each text-bearing node, keyed by its span;
    /// consumed by callers that need to find a sub-run by predicate (spec
    /// §9, e.g. CSP nonce injection).
    pub slices: IndexMap<Span, Slices>,
    /// The exit context computed for each `(callee, entry context)` pair a
    /// contextual (non-strict) call required — the set of clones the
    /// rewrite applier must synthesize (spec §4.6).
    pub clone_exits: IndexMap<(TemplateId, Context), Context>,
    /// For each contextual call site, the id of the clone it must be
    /// rewritten to target.
    pub call_targets: IndexMap<Span, TemplateId>,
    /// For each call site to a strict (declared-kind) callee whose kind
    /// differs from the call site's context, the single-step transformer
    /// to attach (spec §4.4, §4.6).
    pub call_directives: IndexMap<Span, &'static str>,
}

pub(crate) fn infer(tree: &TemplateTree, registry: &Registry, file: &str, source: &str) -> InferenceOutput {
    let map = FileMap::new(source);
    let mut engine = Engine {
        tree,
        registry,
        file,
        map: &map,
        errors: Vec::new(),
        print_directives: IndexMap::new(),
        slices: IndexMap::new(),
        clone_exits: IndexMap::new(),
        call_targets: IndexMap::new(),
        call_directives: IndexMap::new(),
        in_progress: IndexSet::new(),
        recursed: IndexSet::new(),
        current_kind: Kind::Html,
    };

    for node in &tree.templates {
        if let Node::Template { declared_kind, body, visibility: _, id: _ } = node {
            let kind = declared_kind.unwrap_or(Kind::Html);
            engine.current_kind = kind;
            let exit = engine.infer_nodes(body, kind.start_context());
            if let Some(k) = declared_kind {
                if !k.accepts_exit(exit) {
                    engine.errors.push(Error::KindExitMismatch {
                        location: engine.loc(node.span()),
                        declared: *k,
                        inferred: format!("{exit:?}"),
                    });
                }
            }
        }
    }

    InferenceOutput {
        errors: engine.errors,
        print_directives: engine.print_directives,
        slices: engine.slices,
        clone_exits: engine.clone_exits,
        call_targets: engine.call_targets,
        call_directives: engine.call_directives,
    }
}

struct Engine<'a> {
    tree: &'a TemplateTree,
    registry: &'a Registry,
    file: &'a str,
    map: &'a FileMap<'a>,
    errors: Vec<Error>,
    print_directives: IndexMap<Span, Vec<String>>,
    slices: IndexMap<Span, Slices>,
    clone_exits: IndexMap<(TemplateId, Context), Context>,
    call_targets: IndexMap<Span, TemplateId>,
    call_directives: IndexMap<Span, &'static str>,
    /// `(callee, entry context)` pairs whose contextual-call analysis is
    /// currently on the call stack, so a self- or mutually-recursive call
    /// back into the same pair can be recognized before it recurses
    /// unboundedly (spec §4.3 "recursive templates").
    in_progress: IndexSet<(TemplateId, Context)>,
    /// `(callee, entry context)` pairs whose first analysis pass actually
    /// hit the `in_progress` case above — the signal that the result needs
    /// fixed-point re-verification rather than being trusted outright.
    recursed: IndexSet<(TemplateId, Context)>,
    /// The declared kind of the nearest enclosing typed scope (a
    /// template's own declared kind, or a `{let}`/`{param}` block's),
    /// consulted when validating that a print's author-specified
    /// directives are allowed here (spec §4.5).
    current_kind: Kind,
}

impl<'a> Engine<'a> {
    fn loc(&self, span: Span) -> Location {
        Location::new(self.file, self.map, span)
    }

    /// Runs `f` with `current_kind` temporarily set to `kind`, for the
    /// duration of analyzing a nested typed scope.
    fn with_kind<T>(&mut self, kind: Kind, f: impl FnOnce(&mut Self) -> T) -> T {
        let previous = self.current_kind;
        self.current_kind = kind;
        let result = f(self);
        self.current_kind = previous;
        result
    }

    fn infer_nodes(&mut self, nodes: &[Node], ctx: Context) -> Context {
        let mut ctx = ctx;
        for i in 0..nodes.len() {
            ctx = self.infer_node(&nodes[i], ctx, nodes.get(i + 1));
        }
        ctx
    }

    fn infer_node(&mut self, node: &Node, ctx: Context, next: Option<&Node>) -> Context {
        match node {
            Node::RawText(text) | Node::Literal(text) => {
                let (end, slices) = lexer::advance(ctx, &text.node);
                self.slices.insert(text.span, Slices::from(slices));
                end
            }
            Node::Print { expr: _, directives, span } => self.infer_print(ctx, *span, directives, next),
            Node::If { branches, else_body, span } => self.infer_if(branches, else_body.as_deref(), *span, ctx),
            Node::Switch { expr: _, cases, default, span } => {
                self.infer_switch(cases, default.as_deref(), *span, ctx)
            }
            Node::For { body, span, .. } => self.infer_for(body, *span, ctx),
            Node::Let(binding) => self.infer_let(binding, ctx),
            Node::Call { callee, params, strict, span, .. } => {
                self.infer_call(callee, params, *strict, *span, ctx)
            }
            Node::Message { body, span } => self.infer_message(body, *span, ctx),
            Node::Template { body, .. } => self.infer_nodes(body, ctx),
        }
    }

    fn infer_print(&mut self, ctx: Context, span: Span, directives: &[String], next: Option<&Node>) -> Context {
        if !validate::print_allowed_in(ctx) {
            self.errors.push(Error::PrintInDisallowedContext {
                location: self.loc(span),
                context: format!("{ctx:?}"),
            });
            return ctx;
        }

        for directive in directives {
            if directives::cancels_autoescape(directive) && self.current_kind != Kind::Text {
                self.errors.push(Error::DirectiveNotAllowed {
                    location: self.loc(span),
                    directive: directive.clone(),
                });
            }
        }

        match directives::plan(ctx) {
            Ok(pipeline) => {
                self.print_directives.insert(span, directives::combine(directives, &pipeline));
            }
            Err(PlanError::UnsafeScheme { .. }) => {
                self.errors.push(Error::UnsafeScheme {
                    location: self.loc(span),
                    scheme: "(statically dangerous)".to_owned(),
                });
                return ctx;
            }
            Err(PlanError::AmbiguousScheme) => {
                self.errors.push(Error::AmbiguousScheme {
                    location: self.loc(span),
                });
                return ctx;
            }
            Err(PlanError::NoPipelineForContext) => {
                self.errors.push(Error::PrintInDisallowedContext {
                    location: self.loc(span),
                    context: format!("{ctx:?}"),
                });
                return ctx;
            }
        }

        // A dynamic value sitting where a URI scheme could still be
        // starting (`Start`/`MaybeScheme`) may itself have supplied part or
        // all of the scheme text; a literal `:` later in the attribute can
        // no longer be trusted to end a statically-known scheme. Peek at
        // the immediately following literal run (spec §9's bounded
        // "two-phase tag scan") and flag the ambiguity this print opened up
        // if that run's colon would otherwise slip past unnoticed.
        if self.uri_scheme_becomes_ambiguous(ctx, next) {
            self.errors.push(Error::AmbiguousScheme {
                location: self.loc(span),
            });
            return Context::error();
        }
        ctx
    }

    fn uri_scheme_becomes_ambiguous(&self, ctx: Context, next: Option<&Node>) -> bool {
        let poisonable = matches!(ctx.attribute_type, AttributeType::Uri | AttributeType::Media)
            && matches!(
                ctx.state,
                State::Uri | State::CssUri | State::CssDqUri | State::CssSqUri
            )
            && matches!(ctx.uri_part, UriPart::Start | UriPart::MaybeScheme);
        if !poisonable {
            return false;
        }
        let Some(Node::RawText(text) | Node::Literal(text)) = next else {
            return false;
        };
        let poisoned = Context {
            uri_part: UriPart::MaybeVariableScheme,
            ..ctx
        };
        let (end, _) = lexer::advance(poisoned, &text.node);
        matches!(end.uri_part, UriPart::Unknown | UriPart::UnknownPreFragment)
    }

    fn infer_if(&mut self, branches: &[Branch], else_body: Option<&[Node]>, span: Span, ctx: Context) -> Context {
        let mut exits: Vec<Context> = branches
            .iter()
            .map(|b| self.infer_nodes(&b.body, ctx))
            .collect();
        exits.push(match else_body {
            Some(body) => self.infer_nodes(body, ctx),
            None => ctx,
        });
        self.join_all(&exits, span)
    }

    fn infer_switch(&mut self, cases: &[Case], default: Option<&[Node]>, span: Span, ctx: Context) -> Context {
        let mut exits: Vec<Context> = cases
            .iter()
            .map(|c| self.infer_nodes(&c.body, ctx))
            .collect();
        exits.push(match default {
            Some(body) => self.infer_nodes(body, ctx),
            None => ctx,
        });
        self.join_all(&exits, span)
    }

    fn join_all(&mut self, exits: &[Context], span: Span) -> Context {
        let mut acc = exits[0];
        for &next in &exits[1..] {
            match union(acc, next) {
                UnionResult::Ok(joined) => acc = joined,
                UnionResult::Incompatible => {
                    self.errors.push(Error::BranchMergeFailure {
                        location: self.loc(span),
                        a: format!("{acc:?}"),
                        b: format!("{next:?}"),
                    });
                    return Context::error();
                }
            }
        }
        acc
    }

    /// Runs the loop body to a fixed point: the context after zero
    /// iterations (`ctx`) and after one iteration must union to the same
    /// context the next iteration starts from, within a small bound (spec
    /// §4.3 "reentrancy").
    fn infer_for(&mut self, body: &[Node], span: Span, ctx: Context) -> Context {
        let mut candidate = ctx;
        for _ in 0..4 {
            let exit = self.infer_nodes(body, candidate);
            match union(candidate, exit) {
                UnionResult::Ok(joined) if joined == candidate => return candidate,
                UnionResult::Ok(joined) => candidate = joined,
                UnionResult::Incompatible => {
                    self.errors.push(Error::ReentryMismatch {
                        location: self.loc(span),
                    });
                    return Context::error();
                }
            }
        }
        self.errors.push(Error::ReentryMismatch {
            location: self.loc(span),
        });
        Context::error()
    }

    fn infer_let(&mut self, binding: &Binding, ctx: Context) -> Context {
        if let ValueSource::Block(body) = &binding.value {
            let kind = binding.declared_kind.unwrap_or(Kind::Text);
            let exit = self.with_kind(kind, |engine| engine.infer_nodes(body, kind.start_context()));
            if let Some(k) = binding.declared_kind {
                if !k.accepts_exit(exit) {
                    self.errors.push(Error::KindExitMismatch {
                        location: self.loc(binding.span),
                        declared: k,
                        inferred: format!("{exit:?}"),
                    });
                }
            }
        }
        // A `{let}` binds a value for later reference; it never changes the
        // context the surrounding body continues in.
        ctx
    }

    fn infer_params(&mut self, params: &[Param]) {
        for param in params {
            if let ValueSource::Block(body) = &param.value {
                self.with_kind(Kind::Html, |engine| engine.infer_nodes(body, Kind::Html.start_context()));
            }
        }
    }

    fn infer_call(&mut self, callee: &TemplateId, params: &[Param], strict: bool, span: Span, ctx: Context) -> Context {
        self.infer_params(params);

        let declared_kind = self
            .tree
            .find(callee)
            .and_then(|n| match n {
                Node::Template { declared_kind, .. } => Some(*declared_kind),
                _ => None,
            })
            .unwrap_or_else(|| self.registry.external_kind(callee));

        if strict && matches!(declared_kind, None | Some(Kind::Text)) {
            self.errors.push(Error::StrictCallOfNonStrict {
                location: self.loc(span),
                callee: callee.clone(),
            });
        }

        match declared_kind {
            Some(k) => {
                // A strict callee with a body in this tree is already
                // analyzed by the top-level per-template pass in `infer()`;
                // re-running it here would duplicate every error it
                // reports. Only a callee with no in-tree body (an
                // external/library template the registry vouches for) has
                // nothing else to validate.
                if let Some(directive) = directives::plan_call(ctx, k) {
                    self.call_directives.insert(span, directive);
                }
                // The callee's output already matches its declared kind, so
                // splicing it in does not change the surrounding context.
                ctx
            }
            None => self.infer_contextual_call(callee, span, ctx),
        }
    }

    /// Contextual (legacy, undeclared-kind) call: the callee is analyzed
    /// once per distinct entry context and memoized (spec §4.3, §4.6).
    ///
    /// A template that calls itself (directly, or mutually through
    /// `{if}`/`{for}`) in the same entry context would otherwise recurse
    /// into this function before its own memo entry exists. `in_progress`
    /// recognizes the reentry and answers with the entry context itself as
    /// a guess; once the outer call's first pass finishes, that guess is
    /// verified by re-analyzing the body until two successive passes agree
    /// (spec §4.3 "seed a guess... verify by fixed-point re-analysis"),
    /// bounded the same way `infer_for`'s reentrancy check is.
    fn infer_contextual_call(&mut self, callee: &TemplateId, span: Span, ctx: Context) -> Context {
        let key = (callee.clone(), ctx);
        self.call_targets
            .insert(span, crate::rewrite::synthesize_clone_id(callee, ctx));

        if let Some(&exit) = self.clone_exits.get(&key) {
            log::trace!("reusing memoized clone of {callee} at {ctx:?}");
            return exit;
        }

        if self.in_progress.contains(&key) {
            self.recursed.insert(key);
            return ctx;
        }

        let Some(Node::Template { body, .. }) = self.tree.find(callee) else {
            log::warn!("call to {callee} at {span:?} has no in-tree body and no registry entry");
            return ctx;
        };

        log::trace!("cloning {callee} for entry context {ctx:?}");
        self.in_progress.insert(key.clone());
        let first = self.infer_nodes(body, ctx);
        self.in_progress.shift_remove(&key);

        if !self.recursed.shift_remove(&key) {
            self.clone_exits.insert(key, first);
            return first;
        }

        log::trace!("re-contextualizing {callee} in {ctx:?} after recursive call");
        let mut guess = first;
        for _ in 0..4 {
            self.clone_exits.insert(key.clone(), guess);
            let errors_before = self.errors.len();
            let candidate = self.infer_nodes(body, ctx);
            if candidate == guess {
                self.clone_exits.insert(key, candidate);
                return candidate;
            }
            self.errors.truncate(errors_before);
            guess = candidate;
        }
        self.errors.push(Error::ReentryMismatch {
            location: self.loc(span),
        });
        self.clone_exits.insert(key, Context::error());
        Context::error()
    }

    fn infer_message(&mut self, body: &[Node], span: Span, ctx: Context) -> Context {
        if !validate::message_allowed_in(ctx) {
            self.errors.push(Error::MessageInDisallowedContext {
                location: self.loc(span),
                context: format!("{ctx:?}"),
            });
        }
        self.infer_nodes(body, ctx)
    }
}
