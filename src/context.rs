//! Context values: the six-enum-plus-integer tuple the engine tracks at every
//! point in a template, and the partial join ([`union`]) used to merge
//! branch exits.
//!
//! Contexts are expressed as a plain value with structural equality, in the
//! style of [`crate::span::Span`] — there is no subtype polymorphism here,
//! just a tuple and a pure function over it.

use std::fmt;

/// Tokenizer state: the primary axis of a [`Context`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub(crate) enum State {
    HtmlPcdata,
    HtmlBeforeOpenTagName,
    HtmlBeforeCloseTagName,
    HtmlTagName,
    HtmlTag,
    HtmlAttributeName,
    HtmlBeforeAttributeValue,
    HtmlNormalAttrValue,
    HtmlComment,
    HtmlRcdata,
    Css,
    CssComment,
    CssDqString,
    CssSqString,
    CssUri,
    CssDqUri,
    CssSqUri,
    Js,
    JsLineComment,
    JsBlockComment,
    JsDqString,
    JsSqString,
    JsRegex,
    JsTemplateLiteral,
    Uri,
    Text,
    /// A state with no legal successors; propagates through every later
    /// operation and absorbs in [`union`].
    Error,
}

/// The kind of HTML element a tag context was opened for.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub(crate) enum ElementType {
    #[default]
    None,
    Normal,
    Script,
    Style,
    Textarea,
    Title,
    Xmp,
    /// A `<link>` whose `rel` value has not yet been observed.
    Link,
    /// A `<link>` whose `rel` value makes it capable of executing content
    /// (`stylesheet`, `import`, `preload`, `prefetch`).
    LinkExecutable,
    Media,
}

/// The category of value an HTML attribute expects.
///
/// `Media` is not listed as a separate axis anywhere else in the context
/// tuple; it is a refinement of `Uri` used only to pick between
/// `filterNormalizeUri` and `filterNormalizeMediaUri` in the directive
/// planner (spec §4.4, §6.1). See `DESIGN.md` for why it lives here rather
/// than as a seventh context field.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum AttributeType {
    #[default]
    None,
    PlainText,
    Script,
    Style,
    Uri,
    TrustedResourceUri,
    Media,
}

/// How an HTML attribute value is terminated.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub(crate) enum AttributeEndDelimiter {
    #[default]
    None,
    DoubleQuote,
    SingleQuote,
    SpaceOrTagEnd,
}

/// Whether a `/` encountered in JS source starts a regex literal or is the
/// division operator.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub(crate) enum JsFollowingSlash {
    #[default]
    None,
    Regex,
    DivOp,
    Unknown,
}

/// The phase of a URI being tokenized.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub(crate) enum UriPart {
    #[default]
    None,
    Start,
    MaybeScheme,
    /// The scheme seen so far could still be a dynamically-produced variable.
    MaybeVariableScheme,
    AuthorityOrPath,
    Query,
    Fragment,
    /// Ambiguous: could be in the authority, path, or query, but not the
    /// fragment.
    UnknownPreFragment,
    /// Ambiguous: could be anywhere, including the fragment.
    Unknown,
    /// A recognized attacker-controllable scheme (`javascript:`, `data:`,
    /// `blob:`, `filesystem:`, `vbscript:`). Sticky under [`union`].
    DangerousScheme,
}

/// A precise point in HTML/JS/CSS/URI tokenization.
///
/// See spec §3.1. Immutable, value-typed, structurally comparable.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub(crate) struct Context {
    pub state: State,
    pub element_type: ElementType,
    pub attribute_type: AttributeType,
    pub attribute_end_delimiter: AttributeEndDelimiter,
    pub js_following_slash: JsFollowingSlash,
    pub uri_part: UriPart,
    pub template_nest_depth: u32,
}

impl fmt::Debug for Context {
    /// Formats the context the way the engine's located errors quote it,
    /// e.g. `(Context URI NORMAL URI DOUBLE_QUOTE START NORMAL)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(Context {:?} {:?} {:?} {:?} {:?} {:?} depth={})",
            self.state,
            self.element_type,
            self.attribute_type,
            self.attribute_end_delimiter,
            self.js_following_slash,
            self.uri_part,
            self.template_nest_depth
        )
    }
}

impl Context {
    /// The plain-text context, with no HTML/JS/CSS/URI structure at all.
    pub const fn text() -> Self {
        Context {
            state: State::Text,
            element_type: ElementType::None,
            attribute_type: AttributeType::None,
            attribute_end_delimiter: AttributeEndDelimiter::None,
            js_following_slash: JsFollowingSlash::None,
            uri_part: UriPart::None,
            template_nest_depth: 0,
        }
    }

    /// The starting context for a template whose content kind is `html`.
    pub const fn html_pcdata() -> Self {
        Context {
            state: State::HtmlPcdata,
            ..Self::text()
        }
    }

    /// The starting context for a template whose content kind is `js`.
    pub const fn js() -> Self {
        Context {
            state: State::Js,
            js_following_slash: JsFollowingSlash::Regex,
            ..Self::text()
        }
    }

    /// The starting context for a template whose content kind is `css`.
    pub const fn css() -> Self {
        Context {
            state: State::Css,
            ..Self::text()
        }
    }

    /// The starting context for a template whose content kind is `uri` or
    /// `trusted_resource_uri`.
    pub const fn uri() -> Self {
        Context {
            state: State::Uri,
            uri_part: UriPart::Start,
            ..Self::text()
        }
    }

    /// The starting context for a template whose content kind is
    /// `attributes`.
    pub const fn attributes() -> Self {
        Context {
            state: State::HtmlTag,
            element_type: ElementType::Normal,
            ..Self::text()
        }
    }

    /// The bottom context: no legal successors, propagates through every
    /// later operation.
    pub const fn error() -> Self {
        Context {
            state: State::Error,
            ..Self::text()
        }
    }

    /// True if this context is the bottom/error context.
    pub fn is_error(self) -> bool {
        self.state == State::Error
    }
}

/// A template's declared output content type (spec §3.1, §4.3, GLOSSARY).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Kind {
    Html,
    Js,
    Css,
    Uri,
    TrustedResourceUri,
    Attributes,
    Text,
}

impl Kind {
    /// The canonical starting context for this kind (spec §3.1).
    pub(crate) fn start_context(self) -> Context {
        match self {
            Kind::Html => Context::html_pcdata(),
            Kind::Js => Context::js(),
            Kind::Css => Context::css(),
            Kind::Uri | Kind::TrustedResourceUri => Context::uri(),
            Kind::Attributes => Context::attributes(),
            Kind::Text => Context::text(),
        }
    }

    /// True if `exit` is an acceptable terminal context for a block or
    /// template declared this kind (spec §4.5). This is a *compatibility*
    /// check against the kind's terminal set, not bit-exact equality with
    /// [`Kind::start_context`]: a `kind=js` value block may legally end
    /// anywhere in plain JS source (after an identifier, a keyword, a
    /// branch rejoin that lands on `Unknown`) as long as it isn't left mid
    /// string, comment, regex literal, or template literal; a `kind=uri`
    /// block must have moved past the scheme; a `kind=attributes` block
    /// must be back between attributes, not mid unquoted value.
    pub(crate) fn accepts_exit(self, exit: Context) -> bool {
        match self {
            Kind::Html => exit == Context::html_pcdata(),
            Kind::Text => exit == Context::text(),
            Kind::Js => exit.state == State::Js,
            Kind::Css => exit.state == State::Css,
            Kind::Uri | Kind::TrustedResourceUri => {
                exit.state == State::Uri
                    && matches!(
                        exit.uri_part,
                        UriPart::AuthorityOrPath | UriPart::Query | UriPart::Fragment
                    )
            }
            Kind::Attributes => exit.state == State::HtmlTag,
        }
    }
}

/// The four URI phases that are well-formed and pre-fragment.
const URI_WELL_FORMED: [UriPart; 4] = [
    UriPart::Start,
    UriPart::MaybeScheme,
    UriPart::AuthorityOrPath,
    UriPart::Query,
];

/// Joins two [`UriPart`] values per spec §4.1's lattice.
fn union_uri_part(a: UriPart, b: UriPart) -> Option<UriPart> {
    if a == b {
        return Some(a);
    }

    // DangerousScheme is sticky: it absorbs anything.
    if a == UriPart::DangerousScheme || b == UriPart::DangerousScheme {
        return Some(UriPart::DangerousScheme);
    }

    // MaybeVariableScheme absorbs its four well-formed peers, but fails to
    // join with anything past them (Fragment and the ambiguous phases).
    if a == UriPart::MaybeVariableScheme || b == UriPart::MaybeVariableScheme {
        let other = if a == UriPart::MaybeVariableScheme { b } else { a };
        return URI_WELL_FORMED
            .contains(&other)
            .then_some(UriPart::MaybeVariableScheme);
    }

    let pre_fragment = |p: UriPart| URI_WELL_FORMED.contains(&p) || p == UriPart::UnknownPreFragment;

    if pre_fragment(a) && pre_fragment(b) {
        return Some(UriPart::UnknownPreFragment);
    }

    if (pre_fragment(a) && b == UriPart::Fragment) || (pre_fragment(b) && a == UriPart::Fragment) {
        return Some(UriPart::Unknown);
    }

    None
}

/// The outcome of joining two contexts at a conditional branch rejoin.
pub(crate) enum UnionResult {
    Ok(Context),
    /// The two contexts are fundamentally incompatible; the caller raises a
    /// `BranchMergeFailure` naming the two branches.
    Incompatible,
}

/// Joins two contexts for a conditional/switch branch rejoin or `for` loop
/// reentry check (spec §4.1, C2).
///
/// Commutative: `union(a, b) == union(b, a)` always holds (see tests).
pub(crate) fn union(a: Context, b: Context) -> UnionResult {
    if a == b {
        return UnionResult::Ok(a);
    }

    // Error is the bottom element: it absorbs under union so that one pass
    // can keep discovering independent errors (spec §9).
    if a.is_error() || b.is_error() {
        return UnionResult::Ok(Context::error());
    }

    // HtmlTag / HtmlTagName / HtmlAttributeName with the same ElementType
    // join to HtmlTag. This permits constructs like `<a{if …} class=…{/if}>`.
    let tag_like = |s: State| {
        matches!(
            s,
            State::HtmlTag | State::HtmlTagName | State::HtmlAttributeName
        )
    };
    if tag_like(a.state) && tag_like(b.state) && a.element_type == b.element_type {
        return UnionResult::Ok(Context {
            state: State::HtmlTag,
            element_type: a.element_type,
            attribute_type: AttributeType::None,
            attribute_end_delimiter: AttributeEndDelimiter::None,
            js_following_slash: JsFollowingSlash::None,
            uri_part: UriPart::None,
            template_nest_depth: a.template_nest_depth,
        });
    }

    // HtmlTag joins with HtmlNormalAttrValue iff the attribute ended in
    // SpaceOrTagEnd (i.e. the value was unquoted and therefore already
    // closed by the time the tag resumes).
    let as_tag_and_unquoted_value = |x: Context, y: Context| {
        x.state == State::HtmlTag
            && y.state == State::HtmlNormalAttrValue
            && y.attribute_end_delimiter == AttributeEndDelimiter::SpaceOrTagEnd
            && x.element_type == y.element_type
    };
    if as_tag_and_unquoted_value(a, b) {
        return UnionResult::Ok(a);
    }
    if as_tag_and_unquoted_value(b, a) {
        return UnionResult::Ok(b);
    }

    // Past this point, the two contexts must share the same primary state
    // for any further special-case joins to make sense.
    if a.state != b.state {
        return UnionResult::Incompatible;
    }

    if a.element_type != b.element_type || a.template_nest_depth != b.template_nest_depth {
        return UnionResult::Incompatible;
    }

    // Attribute delimiter mismatches (e.g. `'…` one branch, `"…` the other)
    // always fail.
    if a.attribute_end_delimiter != b.attribute_end_delimiter {
        return UnionResult::Incompatible;
    }

    if a.attribute_type != b.attribute_type {
        return UnionResult::Incompatible;
    }

    match a.state {
        State::Js | State::JsRegex => {
            // JS contexts with differing JsFollowingSlash join to Unknown.
            // Mixing JS-in-attribute with bare JS already failed above
            // because attribute_type would differ in that case.
            UnionResult::Ok(Context {
                js_following_slash: JsFollowingSlash::Unknown,
                ..a
            })
        }
        State::Uri | State::CssUri | State::CssDqUri | State::CssSqUri => {
            match union_uri_part(a.uri_part, b.uri_part) {
                Some(uri_part) => UnionResult::Ok(Context { uri_part, ..a }),
                None => UnionResult::Incompatible,
            }
        }
        _ => UnionResult::Incompatible,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_sample_contexts() -> Vec<Context> {
        let mut out = vec![
            Context::html_pcdata(),
            Context::js(),
            Context::css(),
            Context::uri(),
            Context::attributes(),
            Context::text(),
            Context::error(),
        ];
        out.push(Context {
            js_following_slash: JsFollowingSlash::DivOp,
            ..Context::js()
        });
        out.push(Context {
            uri_part: UriPart::Query,
            ..Context::uri()
        });
        out.push(Context {
            uri_part: UriPart::DangerousScheme,
            ..Context::uri()
        });
        out.push(Context {
            uri_part: UriPart::MaybeVariableScheme,
            ..Context::uri()
        });
        out.push(Context {
            state: State::HtmlTagName,
            element_type: ElementType::Normal,
            ..Context::text()
        });
        out.push(Context {
            state: State::HtmlNormalAttrValue,
            element_type: ElementType::Normal,
            attribute_type: AttributeType::PlainText,
            attribute_end_delimiter: AttributeEndDelimiter::SpaceOrTagEnd,
            ..Context::text()
        });
        out
    }

    #[test]
    fn union_commutative() {
        let samples = all_sample_contexts();
        for &a in &samples {
            for &b in &samples {
                let ab = match union(a, b) {
                    UnionResult::Ok(c) => Some(c),
                    UnionResult::Incompatible => None,
                };
                let ba = match union(b, a) {
                    UnionResult::Ok(c) => Some(c),
                    UnionResult::Incompatible => None,
                };
                assert_eq!(ab, ba, "union({a:?}, {b:?}) != union({b:?}, {a:?})");
            }
        }
    }

    #[test]
    fn union_identical_is_identity() {
        for &a in &all_sample_contexts() {
            match union(a, a) {
                UnionResult::Ok(c) => assert_eq!(c, a),
                UnionResult::Incompatible => panic!("identical contexts must union"),
            }
        }
    }

    #[test]
    fn error_absorbs() {
        match union(Context::error(), Context::html_pcdata()) {
            UnionResult::Ok(c) => assert!(c.is_error()),
            UnionResult::Incompatible => panic!("error must absorb, not fail"),
        }
    }

    #[test]
    fn uri_well_formed_phases_join_to_unknown_pre_fragment() {
        let start = Context::uri();
        let query = Context {
            uri_part: UriPart::Query,
            ..Context::uri()
        };
        match union(start, query) {
            UnionResult::Ok(c) => assert_eq!(c.uri_part, UriPart::UnknownPreFragment),
            UnionResult::Incompatible => panic!("well-formed URI phases must join"),
        }
    }

    #[test]
    fn uri_fragment_join_is_unknown() {
        let pre = Context {
            uri_part: UriPart::UnknownPreFragment,
            ..Context::uri()
        };
        let frag = Context {
            uri_part: UriPart::Fragment,
            ..Context::uri()
        };
        match union(pre, frag) {
            UnionResult::Ok(c) => assert_eq!(c.uri_part, UriPart::Unknown),
            UnionResult::Incompatible => panic!("pre-fragment + fragment must join to Unknown"),
        }
    }

    #[test]
    fn dangerous_scheme_is_sticky() {
        let dangerous = Context {
            uri_part: UriPart::DangerousScheme,
            ..Context::uri()
        };
        let query = Context {
            uri_part: UriPart::Query,
            ..Context::uri()
        };
        match union(dangerous, query) {
            UnionResult::Ok(c) => assert_eq!(c.uri_part, UriPart::DangerousScheme),
            UnionResult::Incompatible => panic!("dangerous scheme must absorb"),
        }
    }

    #[test]
    fn maybe_variable_scheme_rejects_post_colon_phase() {
        let mvs = Context {
            uri_part: UriPart::MaybeVariableScheme,
            ..Context::uri()
        };
        let frag = Context {
            uri_part: UriPart::Fragment,
            ..Context::uri()
        };
        assert!(matches!(union(mvs, frag), UnionResult::Incompatible));
    }

    #[test]
    fn attribute_delimiter_mismatch_fails() {
        let dq = Context {
            state: State::HtmlNormalAttrValue,
            attribute_type: AttributeType::PlainText,
            attribute_end_delimiter: AttributeEndDelimiter::DoubleQuote,
            ..Context::text()
        };
        let sq = Context {
            attribute_end_delimiter: AttributeEndDelimiter::SingleQuote,
            ..dq
        };
        assert!(matches!(union(dq, sq), UnionResult::Incompatible));
    }

    #[test]
    fn tag_name_and_attribute_name_join_to_tag() {
        let tag_name = Context {
            state: State::HtmlTagName,
            element_type: ElementType::Normal,
            ..Context::text()
        };
        let attr_name = Context {
            state: State::HtmlAttributeName,
            element_type: ElementType::Normal,
            ..Context::text()
        };
        match union(tag_name, attr_name) {
            UnionResult::Ok(c) => assert_eq!(c.state, State::HtmlTag),
            UnionResult::Incompatible => panic!("tag-like states with same element must join"),
        }
    }

    #[test]
    fn unquoted_attribute_value_joins_with_tag() {
        let tag = Context {
            state: State::HtmlTag,
            element_type: ElementType::Normal,
            ..Context::text()
        };
        let unquoted_value = Context {
            state: State::HtmlNormalAttrValue,
            element_type: ElementType::Normal,
            attribute_type: AttributeType::PlainText,
            attribute_end_delimiter: AttributeEndDelimiter::SpaceOrTagEnd,
            ..Context::text()
        };
        assert!(matches!(union(tag, unquoted_value), UnionResult::Ok(_)));

        let quoted_value = Context {
            attribute_end_delimiter: AttributeEndDelimiter::DoubleQuote,
            ..unquoted_value
        };
        assert!(matches!(union(tag, quoted_value), UnionResult::Incompatible));
    }

    #[test]
    fn js_kind_accepts_div_op_exit_not_just_regex_start() {
        let after_identifier = Context {
            js_following_slash: JsFollowingSlash::DivOp,
            ..Context::js()
        };
        assert!(Kind::Js.accepts_exit(after_identifier));
        assert_ne!(after_identifier, Kind::Js.start_context());
    }

    #[test]
    fn js_kind_rejects_unterminated_string_or_comment() {
        assert!(!Kind::Js.accepts_exit(Context {
            state: State::JsDqString,
            ..Context::js()
        }));
        assert!(!Kind::Js.accepts_exit(Context {
            state: State::JsBlockComment,
            ..Context::js()
        }));
    }

    #[test]
    fn uri_kind_accepts_any_post_scheme_phase() {
        for phase in [UriPart::AuthorityOrPath, UriPart::Query, UriPart::Fragment] {
            assert!(Kind::Uri.accepts_exit(Context { uri_part: phase, ..Context::uri() }));
        }
    }

    #[test]
    fn uri_kind_rejects_scheme_still_open() {
        assert!(!Kind::Uri.accepts_exit(Context::uri()));
        assert!(!Kind::Uri.accepts_exit(Context {
            uri_part: UriPart::MaybeScheme,
            ..Context::uri()
        }));
    }

    #[test]
    fn attributes_kind_rejects_unquoted_value_still_open() {
        assert!(!Kind::Attributes.accepts_exit(Context {
            state: State::HtmlNormalAttrValue,
            element_type: ElementType::Normal,
            attribute_type: AttributeType::PlainText,
            attribute_end_delimiter: AttributeEndDelimiter::SpaceOrTagEnd,
            ..Context::text()
        }));
        assert!(Kind::Attributes.accepts_exit(Context {
            state: State::HtmlTag,
            element_type: ElementType::Normal,
            ..Context::text()
        }));
    }

    #[test]
    fn unrelated_states_fail() {
        assert!(matches!(
            union(Context::html_pcdata(), Context::css()),
            UnionResult::Incompatible
        ));
    }
}
