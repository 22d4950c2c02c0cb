//! The raw-text lexer (C3): advances a [`Context`] over a literal run of
//! template text, producing the end context plus a sequence of slices
//! annotated with the context that held while each was emitted.
//!
//! This is a hand-written transition-table state machine, not a grammar: the
//! input is arbitrary literal text interleaved with `{print}`-style holes, so
//! there is no fixed end-of-input to parse against, only "advance as far as
//! the text goes and report where we ended up".

use crate::context::{
    AttributeEndDelimiter, AttributeType, Context, ElementType, JsFollowingSlash, State, UriPart,
};
use crate::span::Span;

/// A sub-run of a literal text whose associated context is constant
/// (spec §3.3).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Slice {
    /// Byte range within the text passed to [`advance`].
    pub span: Span,
    /// The context that held for the duration of this slice.
    context: Context,
}

impl Slice {
    /// True if this slice was lexed inside a `<script>` element's raw-text
    /// body, the spot a CSP nonce must land just before (spec §9).
    pub fn in_script_element(&self) -> bool {
        self.context.element_type == ElementType::Script
    }

    /// True if this slice was lexed inside a `<style>` element's raw-text
    /// body.
    pub fn in_style_element(&self) -> bool {
        self.context.element_type == ElementType::Style
    }

    /// True if this slice's state is somewhere in the JS tokenizer (plain
    /// `<script>` body or a JS-bearing attribute value).
    pub fn in_js(&self) -> bool {
        matches!(
            self.context.state,
            State::Js
                | State::JsDqString
                | State::JsSqString
                | State::JsRegex
                | State::JsTemplateLiteral
                | State::JsLineComment
                | State::JsBlockComment
        )
    }
}

/// A sequence of slices produced by [`advance`], with a predicate-based
/// search (spec §9 "slices as out-of-band annotations") for consumers that
/// need to locate a sub-run without re-deriving a [`Context`] themselves —
/// e.g. finding the slice just inside a `<script>` element's open tag to
/// inject a CSP nonce attribute before it.
#[derive(Clone, Debug, Default)]
pub struct Slices(pub Vec<Slice>);

impl Slices {
    pub fn find_matching<'a>(&'a self, predicate: impl Fn(&Slice) -> bool) -> Vec<&'a Slice> {
        self.0.iter().filter(|s| predicate(s)).collect()
    }
}

impl From<Vec<Slice>> for Slices {
    fn from(slices: Vec<Slice>) -> Self {
        Slices(slices)
    }
}

/// Tag names with special body-content handling (spec §6.2).
mod special_tags {
    pub static RAWTEXT_SCRIPT: &str = "script";
    pub static RAWTEXT_STYLE: &str = "style";
    pub static RCDATA_TEXTAREA: &str = "textarea";
    pub static RCDATA_TITLE: &str = "title";
    pub static RCDATA_XMP: &str = "xmp";
    pub static TEMPLATE: &str = "template";
    pub static LINK: &str = "link";
}

/// `rel` values that make a `<link>` capable of executing fetched content
/// (spec §6.1, §9).
static LINK_EXECUTABLE_RELS: phf::Set<&'static str> = phf::phf_set! {
    "stylesheet", "import", "preload", "prefetch",
};

/// URI schemes an attacker can use to run script or exfiltrate data
/// (spec §4.2, §6, §8 property 7).
static DANGEROUS_SCHEMES: phf::Set<&'static str> = phf::phf_set! {
    "javascript", "data", "blob", "filesystem", "vbscript",
};

/// JS keywords and punctuation after which a `/` starts a regex literal
/// rather than division (spec §4.2).
static JS_REGEX_KEYWORDS: phf::Set<&'static str> = phf::phf_set! {
    "break", "case", "continue", "delete", "do", "else", "in", "instanceof",
    "new", "of", "return", "throw", "typeof", "void", "yield",
};

/// Advances `ctx` over `text`, returning the end context and the slices
/// covering `text`.
///
/// Concatenating the slices' text reproduces `text` exactly (spec §8
/// property 1), and the last slice's context equals the returned end
/// context (property 2).
pub(crate) fn advance(ctx: Context, text: &str) -> (Context, Vec<Slice>) {
    let mut lexer = Lexer::new(ctx, text);
    lexer.run();
    (lexer.ctx, lexer.slices)
}

/// Scanner state private to a single [`advance`] call. Tag and attribute
/// *names* (as opposed to their classification) only need to survive within
/// one call, because dynamic content essentially never appears in the
/// middle of a tag or attribute name in practice; the classification that
/// does need to survive across calls (`ElementType`, `AttributeType`) lives
/// in [`Context`] itself.
struct Lexer<'a> {
    text: &'a str,
    ctx: Context,
    slices: Vec<Slice>,
    slice_start: usize,
    tag_name: String,
    attr_name: String,
    /// Text accumulated so far for the current `rel` attribute's value,
    /// consulted when the attribute ends to decide whether a `<link>`
    /// upgrades to [`ElementType::LinkExecutable`].
    rel_value: String,
    /// Scheme text accumulated so far while in `Uri`/`Start`/`MaybeScheme`.
    scheme_buf: String,
}

impl<'a> Lexer<'a> {
    fn new(ctx: Context, text: &'a str) -> Self {
        Lexer {
            text,
            ctx,
            slices: Vec::new(),
            slice_start: 0,
            tag_name: String::new(),
            attr_name: String::new(),
            rel_value: String::new(),
            scheme_buf: String::new(),
        }
    }

    /// Transitions to `new_ctx` as of byte offset `at`, closing out the
    /// current slice if the context actually changed.
    fn transition(&mut self, new_ctx: Context, at: usize) {
        if new_ctx != self.ctx {
            if at > self.slice_start {
                self.slices.push(Slice {
                    span: Span::new(self.slice_start, at),
                    context: self.ctx,
                });
            }
            self.slice_start = at;
            self.ctx = new_ctx;
        }
    }

    /// Closes out the final slice after the whole text has been scanned.
    fn finish(&mut self) {
        if self.text.len() > self.slice_start {
            self.slices.push(Slice {
                span: Span::new(self.slice_start, self.text.len()),
                context: self.ctx,
            });
        } else if self.slices.is_empty() {
            // Empty text: still emit one zero-length slice so callers can
            // always find *a* context for the node.
            self.slices.push(Slice {
                span: Span::new(0, 0),
                context: self.ctx,
            });
        }
    }

    fn run(&mut self) {
        if self.ctx.is_error() {
            self.finish();
            return;
        }

        let mut i = 0;
        while i < self.text.len() {
            if self.ctx.is_error() {
                break;
            }
            i = self.step(i);
        }
        self.finish();
    }

    /// Processes one lexical step starting at byte offset `i`, returning the
    /// offset to resume at.
    fn step(&mut self, i: usize) -> usize {
        let rest = &self.text[i..];
        match self.ctx.state {
            State::HtmlPcdata => self.step_pcdata(i, rest),
            State::HtmlBeforeOpenTagName => self.step_before_open_tag_name(i, rest),
            State::HtmlBeforeCloseTagName => self.step_before_close_tag_name(i, rest),
            State::HtmlTagName => self.step_tag_name(i, rest),
            State::HtmlTag => self.step_tag(i, rest),
            State::HtmlAttributeName => self.step_attribute_name(i, rest),
            State::HtmlBeforeAttributeValue => self.step_before_attribute_value(i, rest),
            State::HtmlNormalAttrValue => self.step_normal_attr_value(i, rest),
            State::HtmlComment => self.step_html_comment(i, rest),
            State::HtmlRcdata => self.step_rcdata(i, rest),
            State::Css => self.step_css(i, rest),
            State::CssComment => self.step_css_comment(i, rest),
            State::CssDqString => self.step_css_string(i, rest, '"', State::CssDqString),
            State::CssSqString => self.step_css_string(i, rest, '\'', State::CssSqString),
            State::CssUri => self.step_css_uri(i, rest, None),
            State::CssDqUri => self.step_css_uri(i, rest, Some('"')),
            State::CssSqUri => self.step_css_uri(i, rest, Some('\'')),
            State::Js => self.step_js(i, rest),
            State::JsLineComment => self.step_js_line_comment(i, rest),
            State::JsBlockComment => self.step_js_block_comment(i, rest),
            State::JsDqString => self.step_js_string(i, rest, '"', State::JsDqString),
            State::JsSqString => self.step_js_string(i, rest, '\'', State::JsSqString),
            State::JsRegex => self.step_js_regex(i, rest),
            State::JsTemplateLiteral => self.step_js_template_literal(i, rest),
            State::Uri => self.step_uri(i, rest),
            State::Text => i + rest.chars().next().map_or(1, char::len_utf8),
            State::Error => unreachable!("run() stops before stepping in Error state"),
        }
    }

    /// Marks the context as unreachable/invalid; the caller surfaces a
    /// located error (spec §4.2 "any unreachable state").
    fn error_at(&mut self, at: usize) -> usize {
        self.transition(Context::error(), at);
        self.text.len()
    }

    // ---- HTML ----------------------------------------------------------

    fn step_pcdata(&mut self, i: usize, rest: &str) -> usize {
        if rest.starts_with("<!--") {
            self.transition(Context { state: State::HtmlComment, ..self.ctx }, i);
            return i + 4;
        }
        if rest.starts_with('<') {
            self.transition(
                Context { state: State::HtmlBeforeOpenTagName, ..self.ctx },
                i,
            );
            return i + 1;
        }
        // Entity references stay in HtmlPcdata; no context change needed,
        // just move past the whole reference so we don't split on `;`.
        if rest.starts_with('&') {
            let len = rest
                .find(';')
                .map_or(1, |p| p + 1)
                .min(rest.len());
            return i + len;
        }
        i + rest.chars().next().map_or(1, char::len_utf8)
    }

    fn step_before_open_tag_name(&mut self, i: usize, rest: &str) -> usize {
        let c = rest.chars().next().unwrap();
        if c == '/' {
            self.transition(
                Context { state: State::HtmlBeforeCloseTagName, ..self.ctx },
                i,
            );
            return i + 1;
        }
        if is_tag_name_start(c) {
            self.tag_name.clear();
            self.transition(Context { state: State::HtmlTagName, ..self.ctx }, i);
            return i;
        }
        // Not actually a tag: revert to HtmlPcdata.
        self.transition(Context { state: State::HtmlPcdata, ..self.ctx }, i);
        i
    }

    fn step_before_close_tag_name(&mut self, i: usize, rest: &str) -> usize {
        let c = rest.chars().next().unwrap();
        if is_tag_name_start(c) {
            self.tag_name.clear();
            i + c.len_utf8()
        } else if c == '>' {
            self.on_close_tag(i);
            self.transition(Context { state: State::HtmlPcdata, ..self.ctx }, i + 1);
            i + 1
        } else {
            self.tag_name.push(c.to_ascii_lowercase());
            i + c.len_utf8()
        }
    }

    fn on_close_tag(&mut self, _at: usize) {
        if self.tag_name.eq_ignore_ascii_case(special_tags::TEMPLATE) {
            if self.ctx.template_nest_depth == 0 {
                // `</template>` at depth 0: spec names this an error.
                self.ctx.state = State::Error;
                return;
            }
            self.ctx.template_nest_depth -= 1;
        }
    }

    fn step_tag_name(&mut self, i: usize, rest: &str) -> usize {
        let c = rest.chars().next().unwrap();
        if is_tag_name_char(c) {
            self.tag_name.push(c.to_ascii_lowercase());
            return i + c.len_utf8();
        }

        let element_type = classify_tag_name(&self.tag_name);
        if self.tag_name.eq_ignore_ascii_case(special_tags::TEMPLATE) {
            self.ctx.template_nest_depth += 1;
        }

        if c == '/' && rest[c.len_utf8()..].starts_with('>') {
            // Self-closing tag: go straight back to PCDATA-ish body.
            self.transition(Context { state: State::HtmlPcdata, ..self.ctx }, i);
            return i + 2;
        }
        if c == '>' {
            let body = body_context_for(element_type, self.ctx);
            self.transition(body, i + 1);
            return i + 1;
        }

        self.transition(
            Context {
                state: State::HtmlTag,
                element_type,
                attribute_type: AttributeType::None,
                attribute_end_delimiter: AttributeEndDelimiter::None,
                ..self.ctx
            },
            i,
        );
        i
    }

    fn step_tag(&mut self, i: usize, rest: &str) -> usize {
        let c = rest.chars().next().unwrap();
        if c.is_ascii_whitespace() {
            return i + 1;
        }
        if c == '/' && rest[c.len_utf8()..].starts_with('>') {
            self.transition(Context { state: State::HtmlPcdata, ..self.ctx }, i);
            return i + 2;
        }
        if c == '>' {
            let body = body_context_for(self.ctx.element_type, self.ctx);
            self.transition(body, i + 1);
            return i + 1;
        }
        if is_attribute_name_start(c) {
            self.attr_name.clear();
            self.transition(
                Context { state: State::HtmlAttributeName, ..self.ctx },
                i,
            );
            return i;
        }
        i + c.len_utf8()
    }

    fn step_attribute_name(&mut self, i: usize, rest: &str) -> usize {
        let c = rest.chars().next().unwrap();
        if is_attribute_name_char(c) {
            self.attr_name.push(c.to_ascii_lowercase());
            return i + c.len_utf8();
        }

        let attribute_type = classify_attribute(
            &self.tag_name,
            self.ctx.element_type,
            &self.attr_name,
            self.link_rel_seen_executable(),
        );

        if c == '=' {
            self.transition(
                Context {
                    state: State::HtmlBeforeAttributeValue,
                    attribute_type,
                    ..self.ctx
                },
                i,
            );
            return i + 1;
        }

        // A valueless attribute (e.g. `disabled`): return to HtmlTag.
        self.transition(
            Context {
                state: State::HtmlTag,
                attribute_type: AttributeType::None,
                ..self.ctx
            },
            i,
        );
        i
    }

    fn link_rel_seen_executable(&self) -> bool {
        self.ctx.element_type == ElementType::LinkExecutable
    }

    fn step_before_attribute_value(&mut self, i: usize, rest: &str) -> usize {
        let c = rest.chars().next().unwrap();
        if c.is_ascii_whitespace() {
            return i + 1;
        }

        let (delimiter, consumed) = match c {
            '"' => (AttributeEndDelimiter::DoubleQuote, 1),
            '\'' => (AttributeEndDelimiter::SingleQuote, 1),
            _ => (AttributeEndDelimiter::SpaceOrTagEnd, 0),
        };

        let body_state = match self.ctx.attribute_type {
            AttributeType::Script => State::Js,
            AttributeType::Style => State::Css,
            AttributeType::Uri | AttributeType::TrustedResourceUri | AttributeType::Media => {
                State::Uri
            }
            AttributeType::PlainText | AttributeType::None => State::HtmlNormalAttrValue,
        };

        self.scheme_buf.clear();
        self.rel_value.clear();
        let new_ctx = Context {
            state: body_state,
            attribute_end_delimiter: delimiter,
            js_following_slash: if body_state == State::Js {
                JsFollowingSlash::Regex
            } else {
                JsFollowingSlash::None
            },
            uri_part: if body_state == State::Uri {
                UriPart::Start
            } else {
                UriPart::None
            },
            ..self.ctx
        };
        self.transition(new_ctx, i + consumed);
        i + consumed
    }

    fn step_normal_attr_value(&mut self, i: usize, rest: &str) -> usize {
        let c = rest.chars().next().unwrap();
        if self.attribute_value_ends(c) {
            self.end_attribute_value(i, c);
            return i;
        }
        if self.attr_name == "rel" {
            self.rel_value.push(c);
        }
        i + c.len_utf8()
    }

    /// True if `c` terminates the current attribute value given its
    /// delimiter.
    fn attribute_value_ends(&self, c: char) -> bool {
        match self.ctx.attribute_end_delimiter {
            AttributeEndDelimiter::DoubleQuote => c == '"',
            AttributeEndDelimiter::SingleQuote => c == '\'',
            AttributeEndDelimiter::SpaceOrTagEnd | AttributeEndDelimiter::None => {
                c.is_ascii_whitespace() || c == '>'
            }
        }
    }

    fn end_attribute_value(&mut self, i: usize, terminator: char) {
        if self.ctx.element_type == ElementType::Link
            && self.attr_name == "rel"
            && self
                .rel_value
                .split_ascii_whitespace()
                .any(|tok| LINK_EXECUTABLE_RELS.contains(tok.to_ascii_lowercase().as_str()))
        {
            self.ctx.element_type = ElementType::LinkExecutable;
        }
        let consumed = usize::from(matches!(
            self.ctx.attribute_end_delimiter,
            AttributeEndDelimiter::DoubleQuote | AttributeEndDelimiter::SingleQuote
        ));
        self.transition(
            Context {
                state: State::HtmlTag,
                attribute_type: AttributeType::None,
                attribute_end_delimiter: AttributeEndDelimiter::None,
                ..self.ctx
            },
            i + consumed,
        );
        if terminator == '>' {
            let body = body_context_for(self.ctx.element_type, self.ctx);
            self.transition(body, i + 1);
        }
    }

    fn step_html_comment(&mut self, i: usize, rest: &str) -> usize {
        if rest.starts_with("-->") {
            self.transition(Context { state: State::HtmlPcdata, ..self.ctx }, i + 3);
            return i + 3;
        }
        i + rest.chars().next().map_or(1, char::len_utf8)
    }

    fn step_rcdata(&mut self, i: usize, rest: &str) -> usize {
        let close = match self.ctx.element_type {
            ElementType::Textarea => "</textarea",
            ElementType::Title => "</title",
            ElementType::Xmp => "</xmp",
            _ => "</",
        };
        if rest.len() >= close.len() && rest[..close.len()].eq_ignore_ascii_case(close) {
            self.transition(
                Context { state: State::HtmlBeforeCloseTagName, ..self.ctx },
                i,
            );
            return i + 1;
        }
        i + rest.chars().next().map_or(1, char::len_utf8)
    }

    // ---- CSS ------------------------------------------------------------

    fn step_css(&mut self, i: usize, rest: &str) -> usize {
        if rest.starts_with("/*") {
            self.transition(Context { state: State::CssComment, ..self.ctx }, i + 2);
            return i + 2;
        }
        if rest.starts_with('"') {
            self.transition(Context { state: State::CssDqString, ..self.ctx }, i + 1);
            return i + 1;
        }
        if rest.starts_with('\'') {
            self.transition(Context { state: State::CssSqString, ..self.ctx }, i + 1);
            return i + 1;
        }
        if rest.len() >= 4 && rest[..4].eq_ignore_ascii_case("url(") {
            self.transition(
                Context { state: State::CssUri, uri_part: UriPart::Start, ..self.ctx },
                i + 4,
            );
            return i + 4;
        }
        if self.ctx.attribute_type == AttributeType::Style && self.in_html_attribute_end(rest) {
            return self.close_attribute_from_embedded(i);
        }
        i + rest.chars().next().map_or(1, char::len_utf8)
    }

    fn step_css_comment(&mut self, i: usize, rest: &str) -> usize {
        if rest.starts_with("*/") {
            self.transition(Context { state: State::Css, ..self.ctx }, i + 2);
            return i + 2;
        }
        i + rest.chars().next().map_or(1, char::len_utf8)
    }

    fn step_css_string(&mut self, i: usize, rest: &str, quote: char, state: State) -> usize {
        let c = rest.chars().next().unwrap();
        if c == '\\' {
            return i + rest[1..].chars().next().map_or(1, |n| 1 + n.len_utf8());
        }
        if c == quote {
            self.transition(Context { state: State::Css, ..self.ctx }, i + 1);
            return i + 1;
        }
        let _ = state;
        i + c.len_utf8()
    }

    fn step_css_uri(&mut self, i: usize, rest: &str, quote: Option<char>) -> usize {
        if let Some(q) = quote {
            let c = rest.chars().next().unwrap();
            if c == q {
                self.transition(Context { state: State::Css, uri_part: UriPart::None, ..self.ctx }, i + 1);
                return i + 1;
            }
        } else {
            if rest.starts_with(')') {
                self.transition(Context { state: State::Css, uri_part: UriPart::None, ..self.ctx }, i + 1);
                return i + 1;
            }
            if rest.starts_with('"') {
                self.transition(Context { state: State::CssDqUri, ..self.ctx }, i + 1);
                return i + 1;
            }
            if rest.starts_with('\'') {
                self.transition(Context { state: State::CssSqUri, ..self.ctx }, i + 1);
                return i + 1;
            }
        }
        self.advance_uri_part(i, rest.chars().next().unwrap());
        i + rest.chars().next().map_or(1, char::len_utf8)
    }

    /// True if `rest` starts with whatever closes the current HTML
    /// attribute value (used when CSS/JS is embedded in an attribute).
    fn in_html_attribute_end(&self, rest: &str) -> bool {
        let c = rest.chars().next().unwrap();
        self.attribute_value_ends(c)
    }

    fn close_attribute_from_embedded(&mut self, i: usize) -> usize {
        let rest = &self.text[i..];
        let c = rest.chars().next().unwrap();
        self.end_attribute_value(i, c);
        i
    }

    // ---- JS ---------------------------------------------------------------

    fn step_js(&mut self, i: usize, rest: &str) -> usize {
        if rest.starts_with("//") {
            self.transition(Context { state: State::JsLineComment, ..self.ctx }, i + 2);
            return i + 2;
        }
        if rest.starts_with("/*") {
            self.transition(Context { state: State::JsBlockComment, ..self.ctx }, i + 2);
            return i + 2;
        }
        if rest.starts_with('"') {
            self.transition(Context { state: State::JsDqString, ..self.ctx }, i + 1);
            return i + 1;
        }
        if rest.starts_with('\'') {
            self.transition(Context { state: State::JsSqString, ..self.ctx }, i + 1);
            return i + 1;
        }
        if rest.starts_with('`') {
            self.transition(Context { state: State::JsTemplateLiteral, ..self.ctx }, i + 1);
            return i + 1;
        }
        if rest.starts_with("</script") {
            self.transition(Context { state: State::HtmlBeforeCloseTagName, ..self.ctx }, i);
            return i + 1;
        }
        if self.ctx.attribute_type == AttributeType::Script && self.in_html_attribute_end(rest) {
            return self.close_attribute_from_embedded(i);
        }
        if rest.starts_with('/') {
            let next_slash = if self.ctx.js_following_slash == JsFollowingSlash::DivOp {
                JsFollowingSlash::DivOp
            } else {
                JsFollowingSlash::Regex
            };
            if next_slash == JsFollowingSlash::Regex {
                self.transition(
                    Context { state: State::JsRegex, ..self.ctx },
                    i,
                );
                return i;
            }
            self.transition(
                Context { js_following_slash: JsFollowingSlash::Regex, ..self.ctx },
                i + 1,
            );
            return i + 1;
        }

        let c = rest.chars().next().unwrap();
        if is_js_ident_char(c) {
            let end = rest
                .find(|c: char| !is_js_ident_char(c))
                .unwrap_or(rest.len());
            let word = &rest[..end];
            let follow = if JS_REGEX_KEYWORDS.contains(word) {
                JsFollowingSlash::Regex
            } else {
                JsFollowingSlash::DivOp
            };
            self.transition(Context { js_following_slash: follow, ..self.ctx }, i + end);
            return i + end;
        }
        if c == ')' || c == ']' {
            self.transition(
                Context { js_following_slash: JsFollowingSlash::DivOp, ..self.ctx },
                i + 1,
            );
            return i + 1;
        }
        if !c.is_ascii_whitespace() {
            self.transition(
                Context { js_following_slash: JsFollowingSlash::Regex, ..self.ctx },
                i + c.len_utf8(),
            );
            return i + c.len_utf8();
        }
        i + 1
    }

    fn step_js_line_comment(&mut self, i: usize, rest: &str) -> usize {
        if rest.starts_with('\n') {
            self.transition(Context { state: State::Js, ..self.ctx }, i + 1);
            return i + 1;
        }
        i + rest.chars().next().map_or(1, char::len_utf8)
    }

    fn step_js_block_comment(&mut self, i: usize, rest: &str) -> usize {
        if rest.starts_with("*/") {
            self.transition(Context { state: State::Js, ..self.ctx }, i + 2);
            return i + 2;
        }
        i + rest.chars().next().map_or(1, char::len_utf8)
    }

    fn step_js_string(&mut self, i: usize, rest: &str, quote: char, state: State) -> usize {
        let c = rest.chars().next().unwrap();
        if c == '\\' {
            // A backslash-newline is a permitted line continuation; any
            // other escape just consumes the next character.
            return i + rest[1..].chars().next().map_or(1, |n| 1 + n.len_utf8());
        }
        if c == '\n' {
            // An unescaped newline inside a JS string literal is invalid;
            // spec §4.2 "JsDqString/JsSqString: newlines ... are errors
            // unless line-continued."
            return self.error_at(i);
        }
        if c == quote {
            self.transition(
                Context {
                    state: State::Js,
                    js_following_slash: JsFollowingSlash::DivOp,
                    ..self.ctx
                },
                i + 1,
            );
            return i + 1;
        }
        let _ = state;
        i + c.len_utf8()
    }

    fn step_js_regex(&mut self, i: usize, rest: &str) -> usize {
        let c = rest.chars().next().unwrap();
        if c == '\\' {
            return i + rest[1..].chars().next().map_or(1, |n| 1 + n.len_utf8());
        }
        if c == '[' {
            // A character class can contain an unescaped `/`; skip to `]`.
            let end = rest[1..].find(']').map_or(rest.len(), |p| p + 2);
            return i + end;
        }
        if c == '/' {
            let flags_end = rest[1..]
                .find(|c: char| !c.is_ascii_alphabetic())
                .map_or(rest.len() - 1, |p| p)
                + 1;
            self.transition(
                Context {
                    state: State::Js,
                    js_following_slash: JsFollowingSlash::DivOp,
                    ..self.ctx
                },
                i + flags_end,
            );
            return i + flags_end;
        }
        i + c.len_utf8()
    }

    fn step_js_template_literal(&mut self, i: usize, rest: &str) -> usize {
        let c = rest.chars().next().unwrap();
        if c == '\\' {
            return i + rest[1..].chars().next().map_or(1, |n| 1 + n.len_utf8());
        }
        if c == '`' {
            self.transition(
                Context {
                    state: State::Js,
                    js_following_slash: JsFollowingSlash::DivOp,
                    ..self.ctx
                },
                i + 1,
            );
            return i + 1;
        }
        // `${…}` interpolations inside a template literal are not tracked as
        // a nested JS context here: the validator rejects any dynamic Soy
        // value placed directly inside a JsTemplateLiteral (spec §4.4), so
        // there is nothing further for the lexer itself to track.
        i + c.len_utf8()
    }

    // ---- URI ----------------------------------------------------------

    fn step_uri(&mut self, i: usize, rest: &str) -> usize {
        if self.current_attribute_ends_uri(rest) {
            self.end_attribute_value(i, rest.chars().next().unwrap());
            return i;
        }
        let c = rest.chars().next().unwrap();
        self.advance_uri_part(i, c);
        i + c.len_utf8()
    }

    fn current_attribute_ends_uri(&self, rest: &str) -> bool {
        matches!(
            self.ctx.attribute_type,
            AttributeType::Uri | AttributeType::TrustedResourceUri | AttributeType::Media
        ) && self.in_html_attribute_end(rest)
    }

    /// Advances `UriPart` for a single URI character, spec §4.2.
    fn advance_uri_part(&mut self, i: usize, c: char) {
        let part = self.ctx.uri_part;
        let new_part = match part {
            UriPart::Start | UriPart::MaybeScheme => {
                if c == ':' {
                    if DANGEROUS_SCHEMES.contains(self.scheme_buf.to_ascii_lowercase().as_str()) {
                        UriPart::DangerousScheme
                    } else {
                        UriPart::AuthorityOrPath
                    }
                } else if c == '/' || c == '?' || c == '#' {
                    UriPart::AuthorityOrPath
                } else if is_uri_scheme_char(c) {
                    self.scheme_buf.push(c);
                    UriPart::MaybeScheme
                } else {
                    part
                }
            }
            // The scheme seen so far was, at least in part, produced by a
            // dynamic value (spec §8 S4): a literal `:` landing here cannot
            // be trusted to end a statically-known scheme, since the
            // attacker-controlled portion could itself have supplied the
            // colon or scheme text. Any other scheme character keeps the
            // ambiguity open; `/`/`?`/`#` without a prior `:` at least rules
            // out a scheme (no colon was ever seen).
            UriPart::MaybeVariableScheme => {
                if c == ':' {
                    UriPart::Unknown
                } else if c == '/' || c == '?' || c == '#' {
                    UriPart::AuthorityOrPath
                } else {
                    part
                }
            }
            UriPart::AuthorityOrPath => {
                if c == '?' {
                    UriPart::Query
                } else if c == '#' {
                    UriPart::Fragment
                } else {
                    part
                }
            }
            UriPart::Query => {
                if c == '#' {
                    UriPart::Fragment
                } else {
                    part
                }
            }
            _ => part,
        };
        if new_part != part {
            self.transition(Context { uri_part: new_part, ..self.ctx }, i);
        }
    }
}

/// Characters allowed to start a URI scheme.
fn is_uri_scheme_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.'
}

fn is_tag_name_start(c: char) -> bool {
    c.is_ascii_alphabetic()
}

fn is_tag_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == ':'
}

fn is_attribute_name_start(c: char) -> bool {
    !c.is_ascii_whitespace() && c != '>' && c != '/' && c != '='
}

fn is_attribute_name_char(c: char) -> bool {
    !c.is_ascii_whitespace() && c != '=' && c != '>' && c != '/'
}

fn is_js_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Classifies a tag name into its [`ElementType`] (spec §4.2, §6.2).
///
/// `<link>` starts out `Link` (not executable); it is upgraded to
/// `LinkExecutable` only once a `rel` value in [`LINK_EXECUTABLE_RELS`] is
/// observed (spec §4.2, §9 open question: "category set when `rel`
/// observed, default `Link`").
fn classify_tag_name(name: &str) -> ElementType {
    if name.eq_ignore_ascii_case(special_tags::RAWTEXT_SCRIPT) {
        ElementType::Script
    } else if name.eq_ignore_ascii_case(special_tags::RAWTEXT_STYLE) {
        ElementType::Style
    } else if name.eq_ignore_ascii_case(special_tags::RCDATA_TEXTAREA) {
        ElementType::Textarea
    } else if name.eq_ignore_ascii_case(special_tags::RCDATA_TITLE) {
        ElementType::Title
    } else if name.eq_ignore_ascii_case(special_tags::RCDATA_XMP) {
        ElementType::Xmp
    } else if name.eq_ignore_ascii_case(special_tags::LINK) {
        ElementType::Link
    } else if matches!(
        name.to_ascii_lowercase().as_str(),
        "img" | "source" | "audio" | "video"
    ) {
        ElementType::Media
    } else {
        ElementType::Normal
    }
}

/// Returns the body context to enter after a tag's `>`.
fn body_context_for(element_type: ElementType, ctx: Context) -> Context {
    let state = match element_type {
        ElementType::Script => State::Js,
        ElementType::Style => State::Css,
        ElementType::Textarea | ElementType::Title | ElementType::Xmp => State::HtmlRcdata,
        _ => State::HtmlPcdata,
    };
    Context {
        state,
        attribute_type: AttributeType::None,
        attribute_end_delimiter: AttributeEndDelimiter::None,
        js_following_slash: if state == State::Js {
            JsFollowingSlash::Regex
        } else {
            JsFollowingSlash::None
        },
        uri_part: UriPart::None,
        ..ctx
    }
}

/// Categorizes an attribute into its [`AttributeType`] (spec §4.2, §6.1).
///
/// `link_executable` reflects whether the enclosing `<link>`'s `rel` (if
/// any has been observed) made it capable of executing fetched content.
fn classify_attribute(
    tag_name: &str,
    element_type: ElementType,
    attr_name: &str,
    link_executable: bool,
) -> AttributeType {
    if let Some(known) = classify_uri_attribute(tag_name, element_type, attr_name, link_executable)
    {
        return known;
    }
    if attr_name.starts_with("on") {
        return AttributeType::Script;
    }
    if attr_name == "style" {
        return AttributeType::Style;
    }
    AttributeType::PlainText
}

/// URI attribute categorization table (spec §6.1).
fn classify_uri_attribute(
    tag_name: &str,
    element_type: ElementType,
    attr_name: &str,
    link_executable: bool,
) -> Option<AttributeType> {
    // Attributes that are URI-bearing on any element.
    if matches!(attr_name, "xmlns" | "xml:base" | "itemid" | "itemtype")
        || attr_name.starts_with("xmlns:")
    {
        return Some(AttributeType::Uri);
    }

    match (tag_name, attr_name) {
        ("script", "src") | ("iframe", "src") | ("base", "href") | ("object", "data")
        | ("embed", "src") => Some(AttributeType::TrustedResourceUri),
        ("link", "href") if link_executable => Some(AttributeType::TrustedResourceUri),
        ("link", "href") => Some(AttributeType::Uri),
        ("a", "href")
        | ("area", "href")
        | ("button", "formaction")
        | ("form", "action") => Some(AttributeType::Uri),
        (_, "xlink:href") => Some(AttributeType::Media),
        (_, "src") | (_, "poster") if element_type == ElementType::Media => {
            Some(AttributeType::Media)
        }
        _ => None,
    }
}
