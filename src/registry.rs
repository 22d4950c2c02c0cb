//! The engine's configuration surface (spec §6.3's "registry" parameter),
//! grounded on `wikitext::Configuration`/`ConfigurationSource` in the
//! teacher: read-only input the caller assembles once and hands to
//! [`crate::rewrite`].

use crate::context::{AttributeType, Kind};
use crate::tree::TemplateId;
use indexmap::{IndexMap, IndexSet};

/// Special-handling tag names the raw-text lexer needs (spec §6.2). Built in
/// from the same literals the lexer's own classification uses, kept here so
/// callers can ask "is this a special tag" without reaching into the lexer.
static SPECIAL_TAGS: phf::Set<&'static str> = phf::phf_set! {
    "script", "style", "textarea", "title", "xmp", "template", "link",
};

/// The directive pipeline vocabulary the planner is allowed to emit (spec
/// §6.4), absent any caller extensions.
static BUILTIN_DIRECTIVES: &[&str] = &[
    "escapeHtml",
    "escapeHtmlRcdata",
    "filterHtmlAttributes",
    "whitespaceHtmlAttributes",
    "escapeHtmlAttribute",
    "escapeHtmlAttributeNospace",
    "filterNormalizeUri",
    "filterNormalizeMediaUri",
    "filterTrustedResourceUri",
    "normalizeUri",
    "escapeUri",
    "filterCssValue",
    "escapeCssString",
    "escapeJsValue",
    "filterHtmlScriptPhrasingData",
    "escapeJsString",
    "escapeJsRegex",
    "filterHtmlElementName",
    "bidiSpanWrap",
    "bidiUnicodeWrap",
    "noAutoescape",
];

/// Caller-supplied configuration for a single `rewrite()` call.
///
/// Built from the teacher's `ConfigurationSource` pattern: a small set of
/// static, built-in tables (tag names, directive vocabulary) plus
/// per-invocation data the caller fills in (declared content kinds for
/// templates whose body is not part of the tree being rewritten, and any
/// directive names the caller's escaping runtime adds beyond the built-in
/// vocabulary).
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Registry {
    /// Declared content kinds for templates outside the tree passed to
    /// `rewrite()` (e.g. templates in a separately-compiled library).
    external_kinds: IndexMap<TemplateId, Kind>,
    /// Directive names beyond [`BUILTIN_DIRECTIVES`] the caller's runtime
    /// understands; the planner never emits a name outside this union.
    extra_directives: IndexSet<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_external(&mut self, id: TemplateId, kind: Kind) -> &mut Self {
        self.external_kinds.insert(id, kind);
        self
    }

    pub fn add_directive(&mut self, name: impl Into<String>) -> &mut Self {
        self.extra_directives.insert(name.into());
        self
    }

    pub fn external_kind(&self, id: &TemplateId) -> Option<Kind> {
        self.external_kinds.get(id).copied()
    }

    pub fn knows_directive(&self, name: &str) -> bool {
        BUILTIN_DIRECTIVES.contains(&name) || self.extra_directives.contains(name)
    }
}

/// True if `name` is one of the tags the raw-text lexer gives special body
/// or element-type handling (spec §6.2).
pub fn is_special_tag(name: &str) -> bool {
    SPECIAL_TAGS.contains(name.to_ascii_lowercase().as_str())
}

/// Looks up the declared URI attribute category for `(tag, attribute)`
/// pairs that are meaningful regardless of a particular document's markup
/// (spec §6.1). This mirrors `lexer::classify_uri_attribute` but is exposed
/// for callers (e.g. validators reporting why a directive was chosen) that
/// want the category without re-deriving a `Context`.
pub fn uri_attribute_category(tag: &str, attr: &str) -> Option<AttributeType> {
    match (tag, attr) {
        ("script", "src") | ("iframe", "src") | ("base", "href") | ("object", "data")
        | ("embed", "src") => Some(AttributeType::TrustedResourceUri),
        ("a", "href") | ("area", "href") | ("button", "formaction") | ("form", "action") => {
            Some(AttributeType::Uri)
        }
        (_, "xlink:href") | (_, "poster") => Some(AttributeType::Media),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_tags_are_case_insensitive() {
        assert!(is_special_tag("SCRIPT"));
        assert!(is_special_tag("Style"));
        assert!(!is_special_tag("div"));
    }

    #[test]
    fn builtin_directives_are_known_without_caller_additions() {
        let registry = Registry::new();
        assert!(registry.knows_directive("escapeHtml"));
        assert!(!registry.knows_directive("myCustomDirective"));
    }

    #[test]
    fn caller_can_extend_directive_vocabulary() {
        let mut registry = Registry::new();
        registry.add_directive("myCustomDirective");
        assert!(registry.knows_directive("myCustomDirective"));
    }

    #[test]
    fn external_kind_roundtrip() {
        let mut registry = Registry::new();
        let id = TemplateId::from("lib.partial");
        registry.declare_external(id.clone(), Kind::Js);
        assert_eq!(registry.external_kind(&id), Some(Kind::Js));
    }

    #[test]
    fn registry_survives_a_json_roundtrip() {
        let mut registry = Registry::new();
        registry.declare_external(TemplateId::from("lib.partial"), Kind::Css);
        registry.add_directive("myCustomDirective");

        let json = serde_json::to_string(&registry).unwrap();
        let restored: Registry = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.external_kind(&TemplateId::from("lib.partial")), Some(Kind::Css));
        assert!(restored.knows_directive("myCustomDirective"));
    }
}
