//! The directive planner (C5): maps a [`Context`] at a print site to the
//! ordered pipeline of escaping directive names the rewrite applier should
//! attach (spec §4.4, §6.4).

use crate::context::{AttributeEndDelimiter, AttributeType, Context, ElementType, Kind, State, UriPart};

/// Directives that themselves produce markup of the print's target kind
/// (e.g. a bidi wrapper producing safe HTML); the engine reorders these
/// ahead of the planned pipeline rather than escaping their output a
/// second time (spec §4.4).
const CONTENT_PRODUCING_DIRECTIVES: &[&str] = &["bidiSpanWrap", "bidiUnicodeWrap"];

/// Directives that cancel or bypass autoescaping outright; only ever
/// permitted on a `kind=text` print (spec §4.5).
const AUTOESCAPE_CANCELLING_DIRECTIVES: &[&str] = &["noAutoescape"];

pub(crate) fn is_content_producing(name: &str) -> bool {
    CONTENT_PRODUCING_DIRECTIVES.contains(&name)
}

pub(crate) fn cancels_autoescape(name: &str) -> bool {
    AUTOESCAPE_CANCELLING_DIRECTIVES.contains(&name)
}

/// Combines a print's author-specified directives with the planned
/// pipeline (spec §4.4): any existing content-producing directive is
/// reordered ahead of the pipeline, and the pipeline is skipped entirely
/// if the existing list already ends with its final step.
pub(crate) fn combine(existing: &[String], planned: &[&'static str]) -> Vec<String> {
    if let (Some(last), Some(&tail)) = (existing.last(), planned.last()) {
        if last == tail {
            return existing.to_vec();
        }
    }

    let (producing, rest): (Vec<&String>, Vec<&String>) =
        existing.iter().partition(|d| is_content_producing(d));

    let mut out = Vec::with_capacity(existing.len() + planned.len());
    out.extend(producing.into_iter().cloned());
    out.extend(planned.iter().map(|d| d.to_string()));
    out.extend(rest.into_iter().cloned());
    out
}

/// A planner failure: either a hard security policy violation (the
/// template cannot be made safe no matter what directives are chosen) or a
/// context with no defined pipeline at all.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum PlanError {
    /// The literal text preceding this print statically resolves to an
    /// attacker-controlled scheme (spec §7 `UnsafeScheme`).
    UnsafeScheme { scheme_is_dangerous: bool },
    /// The scheme cannot be determined before the dynamic value starts
    /// (spec §7 `AmbiguousScheme`).
    AmbiguousScheme,
    /// There is no directive pipeline for this context at all (e.g. inside
    /// a JS template literal, spec §4.4).
    NoPipelineForContext,
}

/// Plans the escaping directive pipeline for a print at `ctx` (spec §4.4's
/// pipeline table). Returns the directive names in application order —
/// the *first* directive listed runs closest to the raw value.
///
/// A value nested inside an HTML attribute gets a trailing
/// `escapeHtmlAttribute`/`escapeHtmlAttributeNospace` appended *unless* the
/// base pipeline already percent-encodes every HTML metacharacter
/// (`normalizeUri`/`escapeUri` do; the category filters
/// `filterNormalizeUri`/`filterNormalizeMediaUri`/`filterTrustedResourceUri`
/// only validate the scheme and do not, so they still need it) — compare
/// spec §8 S2 (`filterNormalizeUri |escapeHtmlAttribute`) against S7
/// (`escapeUri` alone, once the URI has moved past its scheme into the
/// query phase).
pub(crate) fn plan(ctx: Context) -> Result<Vec<&'static str>, PlanError> {
    let mut pipeline: Vec<&'static str> = match ctx.state {
        State::HtmlPcdata | State::Text => return Ok(vec!["escapeHtml"]),
        State::HtmlRcdata => return Ok(vec!["escapeHtmlRcdata"]),

        // Printing an entire `name="value"` run of attributes, e.g.
        // `<div {$attrs}>` (content kind `attributes`).
        State::HtmlTag => return Ok(vec!["filterHtmlAttributes", "whitespaceHtmlAttributes"]),

        State::HtmlNormalAttrValue => {
            return Ok(match ctx.attribute_end_delimiter {
                AttributeEndDelimiter::SpaceOrTagEnd => vec!["escapeHtmlAttributeNospace"],
                _ => vec!["escapeHtmlAttribute"],
            })
        }

        State::Css => vec!["filterCssValue"],
        State::CssDqString | State::CssSqString => vec!["escapeCssString"],

        State::Js => {
            let mut v = vec!["escapeJsValue"];
            // Only a literal `<script>` body needs guarding against an
            // embedded `</script>`/`<!--`; a JS value sitting in an
            // event-handler attribute is already inside an HTML attribute
            // value, where that substring can't break out of the tag.
            if ctx.element_type == ElementType::Script && ctx.attribute_type == AttributeType::None
            {
                v.push("filterHtmlScriptPhrasingData");
            }
            v
        }
        State::JsDqString | State::JsSqString => vec!["escapeJsString"],
        State::JsRegex => vec!["escapeJsRegex"],
        State::JsTemplateLiteral => return Err(PlanError::NoPipelineForContext),

        State::Uri | State::CssUri | State::CssDqUri | State::CssSqUri => return plan_uri(ctx),

        _ => return Err(PlanError::NoPipelineForContext),
    };

    if ctx.attribute_end_delimiter != AttributeEndDelimiter::None {
        pipeline.push(match ctx.attribute_end_delimiter {
            AttributeEndDelimiter::SpaceOrTagEnd => "escapeHtmlAttributeNospace",
            _ => "escapeHtmlAttribute",
        });
    }

    Ok(pipeline)
}

fn plan_uri(ctx: Context) -> Result<Vec<&'static str>, PlanError> {
    if ctx.uri_part == UriPart::DangerousScheme {
        return Err(PlanError::UnsafeScheme {
            scheme_is_dangerous: true,
        });
    }

    // A URI embedded directly in a CSS `url(...)` (not further nested in an
    // HTML attribute) has no HTML attribute category to consult; CSS URLs
    // are treated as media references by default (spec §8 S6).
    let is_bare_css_uri = ctx.attribute_type == AttributeType::None
        && matches!(ctx.state, State::CssUri | State::CssDqUri | State::CssSqUri);

    let mut pipeline = match ctx.uri_part {
        UriPart::Start | UriPart::MaybeScheme | UriPart::MaybeVariableScheme => {
            match ctx.attribute_type {
                AttributeType::TrustedResourceUri => vec!["filterTrustedResourceUri"],
                AttributeType::Media | AttributeType::Uri => {
                    // The scheme text itself could still be a runtime
                    // variable; only the TrustedResourceUri filter is
                    // strict enough to vouch for that without knowing the
                    // literal scheme.
                    if ctx.uri_part == UriPart::MaybeVariableScheme {
                        return Err(PlanError::AmbiguousScheme);
                    }
                    if ctx.attribute_type == AttributeType::Media {
                        vec!["filterNormalizeMediaUri"]
                    } else {
                        vec!["filterNormalizeUri"]
                    }
                }
                AttributeType::None if is_bare_css_uri => vec!["filterNormalizeMediaUri"],
                // A bare `uri`/`trusted_resource_uri` content-kind template
                // body, not inside an HTML attribute at all.
                AttributeType::None => vec!["normalizeUri", "escapeUri"],
                AttributeType::PlainText | AttributeType::Script | AttributeType::Style => {
                    return Err(PlanError::NoPipelineForContext)
                }
            }
        }
        // Past the scheme, the attribute category no longer matters: the
        // phase-specific escaper already percent-encodes everything
        // unsafe, including characters that would otherwise break out of
        // an HTML attribute (spec §8 S7).
        UriPart::AuthorityOrPath => vec!["normalizeUri"],
        UriPart::Query | UriPart::Fragment => vec!["escapeUri"],
        UriPart::Unknown | UriPart::UnknownPreFragment => return Err(PlanError::AmbiguousScheme),
        UriPart::None => return Err(PlanError::NoPipelineForContext),
    };

    let category_filter = matches!(
        pipeline.first(),
        Some(&"filterNormalizeUri") | Some(&"filterNormalizeMediaUri") | Some(&"filterTrustedResourceUri")
    );
    if category_filter && ctx.attribute_end_delimiter != AttributeEndDelimiter::None {
        pipeline.push(match ctx.attribute_end_delimiter {
            AttributeEndDelimiter::SpaceOrTagEnd => "escapeHtmlAttributeNospace",
            _ => "escapeHtmlAttribute",
        });
    }

    Ok(pipeline)
}

/// Plans the single-step transformer attached to a call site whose callee
/// has a declared `kind` that differs from the context it is called in
/// (spec §4.4's last bullet: "calling a kind=js template in HTML PCDATA
/// attaches escapeHtml; calling a kind=html from inside a JS string
/// attaches escapeJsString"). Returns `None` when the callee's kind already
/// matches the call site exactly (no directive needed at all, spec §8
/// property 6) or when the call site has no single-step transformer
/// defined for it.
pub(crate) fn plan_call(call_site: Context, callee_kind: Kind) -> Option<&'static str> {
    if callee_kind.start_context() == call_site {
        return None;
    }
    match call_site.state {
        State::HtmlPcdata | State::HtmlRcdata | State::Text => Some("escapeHtml"),
        State::HtmlNormalAttrValue => Some(match call_site.attribute_end_delimiter {
            AttributeEndDelimiter::SpaceOrTagEnd => "escapeHtmlAttributeNospace",
            _ => "escapeHtmlAttribute",
        }),
        State::Js | State::JsRegex => Some("escapeJsValue"),
        State::JsDqString | State::JsSqString => Some("escapeJsString"),
        State::Css => Some("filterCssValue"),
        State::CssDqString | State::CssSqString => Some("escapeCssString"),
        State::Uri | State::CssUri | State::CssDqUri | State::CssSqUri => Some("escapeUri"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ElementType;

    #[test]
    fn pcdata_escapes_html() {
        assert_eq!(plan(Context::html_pcdata()).unwrap(), vec!["escapeHtml"]);
    }

    #[test]
    fn quoted_attribute_uses_escape_html_attribute() {
        let ctx = Context {
            state: State::HtmlNormalAttrValue,
            element_type: ElementType::Normal,
            attribute_type: AttributeType::PlainText,
            attribute_end_delimiter: AttributeEndDelimiter::DoubleQuote,
            ..Context::text()
        };
        assert_eq!(plan(ctx).unwrap(), vec!["escapeHtmlAttribute"]);
    }

    #[test]
    fn unquoted_attribute_uses_nospace_variant() {
        let ctx = Context {
            state: State::HtmlNormalAttrValue,
            element_type: ElementType::Normal,
            attribute_type: AttributeType::PlainText,
            attribute_end_delimiter: AttributeEndDelimiter::SpaceOrTagEnd,
            ..Context::text()
        };
        assert_eq!(plan(ctx).unwrap(), vec!["escapeHtmlAttributeNospace"]);
    }

    #[test]
    fn trusted_resource_uri_ignores_ambiguous_scheme() {
        let ctx = Context {
            attribute_type: AttributeType::TrustedResourceUri,
            uri_part: UriPart::MaybeVariableScheme,
            ..Context::uri()
        };
        assert_eq!(plan(ctx).unwrap(), vec!["filterTrustedResourceUri"]);
    }

    #[test]
    fn ambiguous_scheme_fails_for_plain_uri_attribute() {
        let ctx = Context {
            attribute_type: AttributeType::Uri,
            uri_part: UriPart::MaybeVariableScheme,
            ..Context::uri()
        };
        assert_eq!(plan(ctx), Err(PlanError::AmbiguousScheme));
    }

    #[test]
    fn dangerous_scheme_always_fails() {
        let ctx = Context {
            attribute_type: AttributeType::TrustedResourceUri,
            uri_part: UriPart::DangerousScheme,
            ..Context::uri()
        };
        assert_eq!(
            plan(ctx),
            Err(PlanError::UnsafeScheme {
                scheme_is_dangerous: true
            })
        );
    }

    #[test]
    fn media_attribute_uses_media_uri_filter() {
        let ctx = Context {
            attribute_type: AttributeType::Media,
            ..Context::uri()
        };
        assert_eq!(plan(ctx).unwrap(), vec!["filterNormalizeMediaUri"]);
    }

    #[test]
    fn bare_uri_kind_uses_normalize_and_escape() {
        assert_eq!(plan(Context::uri()).unwrap(), vec!["normalizeUri", "escapeUri"]);
    }

    #[test]
    fn template_literal_has_no_pipeline() {
        let ctx = Context {
            state: State::JsTemplateLiteral,
            ..Context::js()
        };
        assert_eq!(plan(ctx), Err(PlanError::NoPipelineForContext));
    }

    /// Spec §8 S2: `<a href="{$u}">` — category filter at the scheme phase
    /// needs a trailing attribute escaper.
    #[test]
    fn category_filter_in_attribute_gets_trailing_escaper() {
        let ctx = Context {
            attribute_type: AttributeType::Uri,
            attribute_end_delimiter: AttributeEndDelimiter::DoubleQuote,
            ..Context::uri()
        };
        assert_eq!(plan(ctx).unwrap(), vec!["filterNormalizeUri", "escapeHtmlAttribute"]);
    }

    /// Spec §8 S7: `<script src='/x?q={$q}'>` — once past the scheme, the
    /// phase-specific escaper needs no attribute wrapping even though it is
    /// inside a (TrustedResourceUri) attribute.
    #[test]
    fn query_phase_in_attribute_has_no_trailing_escaper() {
        let ctx = Context {
            attribute_type: AttributeType::TrustedResourceUri,
            attribute_end_delimiter: AttributeEndDelimiter::SingleQuote,
            uri_part: UriPart::Query,
            ..Context::uri()
        };
        assert_eq!(plan(ctx).unwrap(), vec!["escapeUri"]);
    }

    /// Spec §8 S6: a URI inside a bare CSS `url(...)` (not in an HTML
    /// attribute at all) defaults to the media filter.
    #[test]
    fn bare_css_uri_defaults_to_media_filter() {
        let ctx = Context {
            state: State::CssSqUri,
            uri_part: UriPart::Start,
            ..Context::css()
        };
        assert_eq!(plan(ctx).unwrap(), vec!["filterNormalizeMediaUri"]);
    }

    /// Spec §8 S3: `<script>foo({$x})</script>`.
    #[test]
    fn script_body_value_gets_phrasing_data_filter() {
        let ctx = Context {
            element_type: ElementType::Script,
            ..Context::js()
        };
        assert_eq!(plan(ctx).unwrap(), vec!["escapeJsValue", "filterHtmlScriptPhrasingData"]);
    }

    #[test]
    fn js_value_in_event_handler_attribute_has_no_phrasing_filter() {
        let ctx = Context {
            element_type: ElementType::Normal,
            attribute_type: AttributeType::Script,
            attribute_end_delimiter: AttributeEndDelimiter::DoubleQuote,
            ..Context::js()
        };
        assert_eq!(plan(ctx).unwrap(), vec!["escapeJsValue", "escapeHtmlAttribute"]);
    }

    #[test]
    fn plan_call_matching_kind_needs_no_directive() {
        assert_eq!(plan_call(Context::html_pcdata(), Kind::Html), None);
    }

    #[test]
    fn plan_call_html_in_js_string_escapes_as_js_string() {
        let ctx = Context {
            state: State::JsDqString,
            ..Context::js()
        };
        assert_eq!(plan_call(ctx, Kind::Html), Some("escapeJsString"));
    }

    #[test]
    fn plan_call_js_callee_in_pcdata_escapes_html() {
        assert_eq!(plan_call(Context::html_pcdata(), Kind::Js), Some("escapeHtml"));
    }

    #[test]
    fn combine_appends_to_author_directives() {
        let existing = vec!["someFilter".to_owned()];
        assert_eq!(combine(&existing, &["escapeHtml"]), vec!["someFilter", "escapeHtml"]);
    }

    #[test]
    fn combine_short_circuits_when_already_escaped() {
        let existing = vec!["escapeHtml".to_owned()];
        assert_eq!(combine(&existing, &["escapeHtml"]), vec!["escapeHtml"]);
    }

    #[test]
    fn combine_reorders_content_producing_directive_first() {
        let existing = vec!["bidiSpanWrap".to_owned()];
        assert_eq!(combine(&existing, &["escapeHtml"]), vec!["bidiSpanWrap", "escapeHtml"]);
    }

    #[test]
    fn combine_with_no_existing_directives_is_just_the_pipeline() {
        assert_eq!(combine(&[], &["escapeHtml"]), vec!["escapeHtml"]);
    }
}
