//! Small helpers over `scraper` shared by the sentinel and the layouts.

use scraper::{ElementRef, Html, Selector};

/// Parse a CSS selector. Selectors are crate constants, so a parse failure
/// is logged and treated as "matches nothing".
pub(crate) fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(err) => {
            tracing::error!(selector = css, error = %err, "Invalid CSS selector");
            None
        }
    }
}

/// Text content with whitespace runs collapsed to single spaces.
pub(crate) fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn select_all<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match selector(css) {
        Some(sel) => scope.select(&sel).collect(),
        None => Vec::new(),
    }
}

pub(crate) fn select_doc<'a>(doc: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match selector(css) {
        Some(sel) => doc.select(&sel).collect(),
        None => Vec::new(),
    }
}

/// Non-empty trimmed text of the first match under `scope`.
pub(crate) fn first_text(scope: ElementRef<'_>, css: &str) -> Option<String> {
    select_all(scope, css)
        .into_iter()
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty())
}

pub(crate) fn doc_text(doc: &Html, css: &str) -> Option<String> {
    select_doc(doc, css)
        .into_iter()
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty())
}

pub(crate) fn attr(element: ElementRef<'_>, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub(crate) fn first_attr(scope: ElementRef<'_>, css: &str, name: &str) -> Option<String> {
    select_all(scope, css).into_iter().find_map(|el| attr(el, name))
}

pub(crate) fn is_present(doc: &Html, css: &str) -> bool {
    selector(css).is_some_and(|sel| doc.select(&sel).next().is_some())
}

/// Whether the document has a `<body>` with any element or text in it.
pub(crate) fn has_body_content(doc: &Html) -> bool {
    select_doc(doc, "body")
        .into_iter()
        .next()
        .is_some_and(|body| body.children().any(|child| match child.value() {
            scraper::Node::Element(_) => true,
            scraper::Node::Text(text) => !text.trim().is_empty(),
            _ => false,
        }))
}
