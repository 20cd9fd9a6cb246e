//! Tolerant HTML helpers on top of `scraper`.
//!
//! Race pages are hand-edited, Excel-exported or simply broken; html5ever
//! repairs whatever it can and these helpers only read what survives.

use crate::utils::normalize_ws;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static TITLE: Lazy<Selector> = Lazy::new(|| sel("title"));
static PRE: Lazy<Selector> = Lazy::new(|| sel("pre"));
static TABLE: Lazy<Selector> = Lazy::new(|| sel("table"));
static ROW: Lazy<Selector> = Lazy::new(|| sel("tr"));
static CELL: Lazy<Selector> = Lazy::new(|| sel("td, th"));
static META: Lazy<Selector> = Lazy::new(|| sel("meta"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| sel("a[href]"));
static BODY: Lazy<Selector> = Lazy::new(|| sel("body"));

/// Collapsed text content of an element.
pub fn text_of(el: ElementRef<'_>) -> String {
    normalize_ws(&el.text().collect::<String>())
}

/// Text of the first element matching `selector` that has any text.
pub fn first_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .map(text_of)
        .find(|t| !t.is_empty())
}

/// The document `<title>`.
pub fn title(doc: &Html) -> Option<String> {
    first_text(doc, &TITLE)
}

/// Raw text of every `<pre>` block, line structure preserved.
pub fn pre_blocks(doc: &Html) -> Vec<String> {
    doc.select(&PRE)
        .map(|el| el.text().collect::<String>())
        .collect()
}

/// Raw text of the whole `<body>`, for pages that put results outside any
/// `<pre>`.
pub fn body_text(doc: &Html) -> String {
    doc.select(&BODY)
        .next()
        .map(|b| b.text().collect())
        .unwrap_or_default()
}

/// `<meta name=.. content=..>` lookup, case-insensitive on the name.
pub fn meta_content(doc: &Html, name: &str) -> Option<String> {
    doc.select(&META)
        .find(|el| {
            el.value()
                .attr("name")
                .is_some_and(|n| n.trim().eq_ignore_ascii_case(name))
        })
        .and_then(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
}

/// Every `<a href>` resolved against `base`, with its link text.
/// Hrefs that do not resolve are dropped.
pub fn links<'a>(doc: &'a Html, base: &Url) -> Vec<(Url, ElementRef<'a>)> {
    doc.select(&ANCHOR)
        .filter_map(|el| {
            let href = el.value().attr("href")?.trim().replace("&amp;", "&");
            base.join(&href).ok().map(|url| (url, el))
        })
        .collect()
}

/// All tables, outermost first.
pub fn tables(doc: &Html) -> Vec<ElementRef<'_>> {
    doc.select(&TABLE).collect()
}

/// Tables that contain no other table. Layout-by-table pages bury the
/// results table several levels deep; it is always a leaf.
pub fn leaf_tables(doc: &Html) -> Vec<ElementRef<'_>> {
    doc.select(&TABLE)
        .filter(|t| t.select(&TABLE).next().is_none())
        .collect()
}

/// Cell texts of each row of `table`. Rows of nested tables are included,
/// so call this on leaf tables when that matters.
pub fn table_rows(table: ElementRef<'_>) -> Vec<Vec<String>> {
    table
        .select(&ROW)
        .map(|tr| tr.select(&CELL).map(text_of).collect::<Vec<_>>())
        .filter(|cells: &Vec<String>| !cells.is_empty())
        .collect()
}

/// Text node directly following an element, e.g. the date after a link:
/// `<a href=..>Race</a> 12/14/12`.
pub fn tail_text(el: ElementRef<'_>) -> Option<String> {
    let mut node = el.next_sibling();
    while let Some(n) = node {
        if let Some(text) = n.value().as_text() {
            let t = normalize_ws(text);
            if !t.is_empty() {
                return Some(t);
            }
        } else if n.value().is_element() {
            return None;
        }
        node = n.next_sibling();
    }
    None
}
