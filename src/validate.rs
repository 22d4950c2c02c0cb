//! The validator (C6) and the crate's error type (spec §7).
//!
//! Most checks here are called directly by the inference engine at the
//! point a decision is made (e.g. "is a `{msg}` allowed to start here?"),
//! rather than as a wholly separate tree walk — the same single-pass,
//! synchronous design the teacher's own `renderer` uses when it validates a
//! tag's attributes while it is rendering it, not in a prior sweep.

use crate::context::{Context, Kind, State};
use crate::span::{FileMap, Span};
use crate::tree::TemplateId;
use thiserror::Error;

/// A located point in a template's source text, attached to every
/// [`Error`] variant (spec §7: "file, line, column, the offending raw text
/// excerpt").
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Location {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub excerpt: String,
}

impl Location {
    pub(crate) fn new(file: &str, map: &FileMap<'_>, span: Span) -> Self {
        let line_col = map.find_line_col(span.start.min(map.len()));
        Location {
            file: file.to_owned(),
            line: line_col.line,
            column: line_col.column,
            excerpt: map.excerpt(span).to_owned(),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{} (near `{}`)", self.file, self.line, self.column, self.excerpt)
    }
}

/// A recoverable contextual-autoescaping failure (spec §7). The engine
/// collects these rather than aborting on the first one, so a single
/// `rewrite()` call can report every problem in a template tree at once.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{location}: branches of this conditional leave incompatible contexts ({a:?} vs {b:?})")]
    BranchMergeFailure {
        location: Location,
        a: String,
        b: String,
    },

    #[error("{location}: loop body does not return to its entry context after one iteration")]
    ReentryMismatch { location: Location },

    #[error("{location}: `{scheme}:` is not a safe URI scheme for this attribute")]
    UnsafeScheme { location: Location, scheme: String },

    #[error("{location}: URI scheme cannot be determined statically")]
    AmbiguousScheme { location: Location },

    #[error("{location}: a dynamic value cannot be printed here ({context:?})")]
    PrintInDisallowedContext { location: Location, context: String },

    #[error("{location}: a message cannot be placed here ({context:?})")]
    MessageInDisallowedContext { location: Location, context: String },

    #[error("{location}: template's declared kind `{declared:?}` does not match its inferred exit context ({inferred:?})")]
    KindExitMismatch {
        location: Location,
        declared: Kind,
        inferred: String,
    },

    #[error("{location}: strict call to `{callee}`, which has no fully inferred content kind")]
    StrictCallOfNonStrict { location: Location, callee: TemplateId },

    #[error("{location}: invalid tag name")]
    InvalidTagName { location: Location },

    #[error("{location}: unmatched closing tag")]
    UnmatchedCloseTag { location: Location },

    #[error("{location}: closing tag not permitted inside this element's text content")]
    CloseTagInRcdata { location: Location },

    #[error("{location}: directive `{directive}` is not allowed here")]
    DirectiveNotAllowed { location: Location, directive: String },
}

/// A fatal condition the engine cannot recover from by continuing analysis
/// (spec §7's exception to "collect, don't abort"): used only for malformed
/// input to `rewrite()` itself, such as a dangling callee id.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("call to unknown template `{0}`")]
    UnknownTemplate(TemplateId),
}

/// Pre-flight check for malformed input to [`crate::rewrite`] (spec §7):
/// every callee a strict or contextual call names must either have a body
/// in `tree` or a declared kind in `registry`, and every template id must
/// be unique. Unlike [`Error`], a [`FatalError`] here means the tree is not
/// analyzable at all, not merely that a particular print site is unsafe.
pub fn validate_registry(tree: &crate::tree::TemplateTree, registry: &crate::registry::Registry) -> Result<(), FatalError> {
    for node in &tree.templates {
        let crate::tree::Node::Template { body, .. } = node else {
            continue;
        };
        validate_calls(body, tree, registry)?;
    }
    Ok(())
}

fn validate_calls(
    nodes: &[crate::tree::Node],
    tree: &crate::tree::TemplateTree,
    registry: &crate::registry::Registry,
) -> Result<(), FatalError> {
    use crate::tree::Node;
    for node in nodes {
        match node {
            Node::Call { callee, params, .. } => {
                if tree.find(callee).is_none() && registry.external_kind(callee).is_none() {
                    return Err(FatalError::UnknownTemplate(callee.clone()));
                }
                for p in params {
                    if let crate::tree::ValueSource::Block(body) = &p.value {
                        validate_calls(body, tree, registry)?;
                    }
                }
            }
            Node::If { branches, else_body, .. } => {
                for b in branches {
                    validate_calls(&b.body, tree, registry)?;
                }
                if let Some(body) = else_body {
                    validate_calls(body, tree, registry)?;
                }
            }
            Node::Switch { cases, default, .. } => {
                for c in cases {
                    validate_calls(&c.body, tree, registry)?;
                }
                if let Some(body) = default {
                    validate_calls(body, tree, registry)?;
                }
            }
            Node::For { body, .. } | Node::Message { body, .. } => {
                validate_calls(body, tree, registry)?;
            }
            Node::Let(binding) => {
                if let crate::tree::ValueSource::Block(body) = &binding.value {
                    validate_calls(body, tree, registry)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Contexts a `{msg}` block may directly open in (spec §4.4, §7). Messages
/// are meant to hold human-readable text, not raw markup structure, so they
/// are restricted to contexts where arbitrary translated text cannot break
/// out of its surroundings.
pub(crate) fn message_allowed_in(ctx: Context) -> bool {
    matches!(
        ctx.state,
        State::HtmlPcdata | State::HtmlRcdata | State::HtmlNormalAttrValue | State::Text
    )
}

/// True if `ctx` is a context a `{print}` may never target, independent of
/// which directives would be applied (spec §4.4): mid-tag-name, mid
/// attribute-name, inside comments, or already in the error state.
pub(crate) fn print_allowed_in(ctx: Context) -> bool {
    !matches!(
        ctx.state,
        State::HtmlTagName
            | State::HtmlBeforeOpenTagName
            | State::HtmlBeforeCloseTagName
            | State::HtmlAttributeName
            | State::HtmlComment
            | State::CssComment
            | State::JsLineComment
            | State::JsBlockComment
            | State::Error
    )
}
