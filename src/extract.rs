//! Content extraction from raw page markup.
//!
//! Detects the page's structural shape and routes it to one of two
//! extractors: clinical-trial report pages (recognized by their table and
//! heading class signatures or by the report URL pattern) get a
//! section-by-section table flattening pass; everything else goes through
//! a best-effort generic pass over the main content region.
//!
//! The output is a single text body plus an immutable metadata record
//! carrying the derived source key.

use regex::Regex;
use scraper::node::Element;
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

use crate::models::{DocMetadata, ExtractedDocument, ORIGIN_URL};

static REPORT_TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.ctReportTable").expect("report table selector"));
static SUB_HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h3.ctSubHeading").expect("sub heading selector"));
static BRIEF_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h2.brief-title").expect("brief title selector"));
static DYNAMIC_HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.dynamic-heading").expect("section selector"));
static LINK_HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h5.link-type-heading").expect("link heading selector"));
static PAGE_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("title selector"));
static MAIN_CONTENT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("#main, .main, .content, main, article, .container")
        .expect("main content selector")
});
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").expect("body selector"));
static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").expect("h1 selector"));
static SECTION_HEADINGS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h2, h3, h4").expect("section headings selector"));
static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").expect("table selector"));
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("row selector"));
static DATA_CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("td selector"));
static ANY_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td, th").expect("cell selector"));
static DEF_LIST: LazyLock<Selector> = LazyLock::new(|| Selector::parse("dl").expect("dl selector"));
static DEF_TERM: LazyLock<Selector> = LazyLock::new(|| Selector::parse("dt").expect("dt selector"));
static DEF_DESC: LazyLock<Selector> = LazyLock::new(|| Selector::parse("dd").expect("dd selector"));
static LIST_ITEM: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("li").expect("li selector"));

static PARENTHETICAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\([^)]*\)").unwrap());
static VALUE_BOILERPLATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((View at|Click here for)[^)]*\)").unwrap());

/// Individual text nodes in the generic section walk are capped at this
/// length to keep navigation blobs out of the body.
const MAX_TEXT_NODE_LEN: usize = 500;

/// Below this length the structured generic pass is considered a miss and
/// extraction falls back to the content region's raw visible text.
const MIN_STRUCTURED_LEN: usize = 100;

/// Extract text and metadata from one page. Returns `None` when no usable
/// content is found.
pub fn extract(raw_markup: &str, source_url: &str) -> Option<ExtractedDocument> {
    let doc = Html::parse_document(raw_markup);

    let title = doc
        .select(&PAGE_TITLE)
        .next()
        .map(visible_text)
        .unwrap_or_default();

    let trial = is_trial_report(&doc, source_url);
    let (text, nct_id) = if trial {
        debug!(url = source_url, "detected clinical trial report page");
        extract_trial(&doc)
    } else {
        debug!(url = source_url, "generic page, using generic extractor");
        (extract_generic(&doc), None)
    };

    // URL-classified pages sometimes lack the report markup entirely.
    let text = if trial && text.trim().is_empty() {
        extract_generic(&doc)
    } else {
        text
    };

    let text = text.trim().to_string();
    if text.is_empty() {
        return None;
    }

    let source_key = derive_source_key(source_url, trial, nct_id.as_deref());

    Some(ExtractedDocument {
        text,
        metadata: DocMetadata {
            url: source_url.to_string(),
            title,
            origin: ORIGIN_URL.to_string(),
            source_key,
        },
    })
}

/// A page is a trial report if it carries any of the report markup
/// signatures, or its URL matches the report path pattern.
fn is_trial_report(doc: &Html, url: &str) -> bool {
    doc.select(&REPORT_TABLE).next().is_some()
        || doc.select(&SUB_HEADING).next().is_some()
        || doc.select(&BRIEF_TITLE).next().is_some()
        || url.contains("/clinicalTrials/report/")
        || url.contains("/report/clinicalTrials/")
}

// ============ Trial report extraction ============

fn extract_trial(doc: &Html) -> (String, Option<String>) {
    let mut content = String::new();

    let nct_id = extract_nct_id(doc);
    if let Some(ref id) = nct_id {
        content.push_str(&format!("--- CLINICAL TRIAL: {} ---\n\n", id));
    }

    if let Some(heading) = doc.select(&BRIEF_TITLE).next() {
        let title = visible_text(heading);
        if !title.is_empty() {
            content.push_str(&format!("Title: {}\n\n", title));
        }
    }

    for section_div in doc.select(&DYNAMIC_HEADING) {
        if let Some(heading) = section_div.select(&SUB_HEADING).next() {
            let section_title = visible_text(heading);
            if !section_title.is_empty() && !section_title.eq_ignore_ascii_case("Summary") {
                content.push_str(&format!("\n=== {} ===\n", section_title));
            }
        }

        // Tables belonging to this section sit between it and the next one.
        for sibling in section_div.next_siblings().filter_map(ElementRef::wrap) {
            if has_class(sibling.value(), "dynamic-heading") {
                break;
            }
            if sibling.value().name() == "table" && has_class(sibling.value(), "ctReportTable") {
                content.push_str(&trial_table_rows(sibling));
            }
        }
    }

    content.push_str(&extract_link_groups(doc));

    (content, nct_id)
}

/// Structured identifier: first report-table row whose first cell reads
/// `NCTID` (case-insensitive), with parenthetical annotations stripped
/// from the value.
fn extract_nct_id(doc: &Html) -> Option<String> {
    for table in doc.select(&REPORT_TABLE) {
        for row in table.select(&ROW) {
            let cells: Vec<ElementRef> = row.select(&DATA_CELL).collect();
            if cells.len() >= 2 && visible_text(cells[0]).eq_ignore_ascii_case("NCTID") {
                let value = visible_text(cells[1]);
                let value = PARENTHETICAL.replace_all(&value, "").trim().to_string();
                if !value.is_empty() {
                    return Some(value);
                }
            }
        }
    }
    None
}

/// Every row with at least two cells is emitted as `label: value`, even
/// when the value is empty. Only known boilerplate phrases are stripped
/// from values.
fn trial_table_rows(table: ElementRef) -> String {
    let mut out = String::new();

    for row in table.select(&ROW) {
        let cells: Vec<ElementRef> = row.select(&DATA_CELL).collect();
        if cells.len() < 2 {
            continue;
        }

        let label = visible_text(cells[0]);
        if label.is_empty() {
            continue;
        }
        let value = visible_text(cells[1]);
        let value = VALUE_BOILERPLATE.replace_all(&value, "").trim().to_string();

        out.push_str(&format!("{}: {}\n", label, value));
    }

    out
}

/// Trailing link listing grouped by category heading.
fn extract_link_groups(doc: &Html) -> String {
    let headings: Vec<ElementRef> = doc.select(&LINK_HEADING).collect();
    if headings.is_empty() {
        return String::new();
    }

    let mut out = String::from("\n=== Resources/Links ===\n");

    for heading in headings {
        let group = visible_text(heading);
        if group.is_empty() {
            continue;
        }
        out.push_str(&format!("\n{}:\n", group));

        let list = heading.next_siblings().filter_map(ElementRef::wrap).next();
        if let Some(list) = list {
            if list.value().name() == "ul" && has_class(list.value(), "external-links-list") {
                for item in list.select(&LIST_ITEM) {
                    let text = visible_text(item);
                    if !text.is_empty() {
                        out.push_str(&format!("- {}\n", text));
                    }
                }
            }
        }
    }

    out
}

// ============ Generic extraction ============

fn extract_generic(doc: &Html) -> String {
    let root = doc
        .select(&MAIN_CONTENT)
        .next()
        .or_else(|| doc.select(&BODY).next())
        .unwrap_or_else(|| doc.root_element());

    let mut content = String::new();

    if let Some(h1) = root.select(&H1).next() {
        let text = visible_text(h1);
        if !text.is_empty() {
            content.push_str(&format!("=== {} ===\n\n", text));
        }
    }

    for table in root.select(&TABLE) {
        content.push_str(&generic_table_rows(table));
    }

    for dl in root.select(&DEF_LIST) {
        let terms: Vec<ElementRef> = dl.select(&DEF_TERM).collect();
        let defs: Vec<ElementRef> = dl.select(&DEF_DESC).collect();
        for (term, def) in terms.iter().zip(defs.iter()) {
            let term = visible_text(*term);
            let def = visible_text(*def);
            if !term.is_empty() && !def.is_empty() {
                content.push_str(&format!("{}: {}\n", term, def));
            }
        }
    }

    for header in root.select(&SECTION_HEADINGS) {
        let header_text = visible_text(header);
        if header_text.is_empty() {
            continue;
        }
        content.push_str(&format!("\n{}:\n", header_text));

        for sibling in header.next_siblings().filter_map(ElementRef::wrap) {
            let tag = sibling.value().name();
            if matches!(tag, "h1" | "h2" | "h3" | "h4" | "h5" | "h6") {
                break;
            }

            if tag == "ul" || tag == "ol" {
                for item in sibling.select(&LIST_ITEM) {
                    let text = visible_text(item);
                    if !text.is_empty() {
                        content.push_str(&format!("- {}\n", text));
                    }
                }
                continue;
            }

            let text = visible_text(sibling);
            if !text.is_empty() && text.len() < MAX_TEXT_NODE_LEN {
                content.push_str(&text);
                content.push('\n');
            }
        }
    }

    let result = content.trim().to_string();
    if result.len() < MIN_STRUCTURED_LEN {
        return visible_text(root);
    }
    result
}

/// Two-cell rows flatten to `label: value`; other row shapes join their
/// cell texts with pipes.
fn generic_table_rows(table: ElementRef) -> String {
    let mut out = String::new();

    for row in table.select(&ROW) {
        let cells: Vec<ElementRef> = row.select(&ANY_CELL).collect();

        if cells.len() == 2 {
            let label = visible_text(cells[0]);
            let value = visible_text(cells[1]);
            if !label.is_empty() {
                out.push_str(&format!("{}: {}\n", label, value));
            }
        } else if !cells.is_empty() {
            let texts: Vec<String> = cells
                .iter()
                .map(|cell| visible_text(*cell))
                .filter(|text| !text.is_empty())
                .collect();
            if !texts.is_empty() {
                out.push_str(&texts.join(" | "));
                out.push('\n');
            }
        }
    }

    out
}

// ============ Source key derivation ============

/// Filename-like identifier from the URL's last path segment (or the host
/// with dots normalized), prefixed to mark trial reports distinctly from
/// generic pages. An identifier extracted from the page itself wins over
/// the URL-derived one.
fn derive_source_key(source_url: &str, trial: bool, nct_id: Option<&str>) -> String {
    let segment = Url::parse(source_url)
        .ok()
        .and_then(|url| {
            let from_path = url
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last().map(String::from));
            from_path.or_else(|| url.host_str().map(|host| host.replace('.', "_")))
        })
        .unwrap_or_else(|| "webpage".to_string());

    if trial {
        format!("CLINICAL TRIAL: {}", nct_id.unwrap_or(&segment))
    } else {
        format!("{}:{}", segment, source_url)
    }
}

// ============ Text helpers ============

const NOISE_TAGS: &[&str] = &[
    "script", "style", "iframe", "noscript", "nav", "footer", "svg", "template",
];
const NOISE_CLASSES: &[&str] = &["navbar", "sidenav", "chat-popup"];

fn is_noise(el: &Element) -> bool {
    NOISE_TAGS.contains(&el.name())
        || NOISE_CLASSES.iter().any(|class| has_class(el, class))
        || el.id() == Some("messageVue")
}

fn has_class(el: &Element, class: &str) -> bool {
    el.classes().any(|c| c == class)
}

/// Visible text of an element, skipping noise subtrees, with whitespace
/// collapsed the way a rendered page would read.
fn visible_text(el: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect_visible(el, &mut raw);
    collapse_whitespace(&raw)
}

fn collect_visible(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => {
                if is_noise(element) {
                    continue;
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    if is_block_tag(element.name()) {
                        out.push(' ');
                        collect_visible(child_el, out);
                        out.push(' ');
                    } else {
                        collect_visible(child_el, out);
                    }
                }
            }
            _ => {}
        }
    }
}

fn is_block_tag(tag: &str) -> bool {
    matches!(
        tag,
        "p" | "div"
            | "li"
            | "ul"
            | "ol"
            | "table"
            | "tr"
            | "td"
            | "th"
            | "dl"
            | "dt"
            | "dd"
            | "br"
            | "section"
            | "article"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
    )
}

fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIAL_URL: &str = "https://scge.mcw.edu/platform/data/report/clinicalTrials/NCT04601051";

    fn trial_page() -> String {
        r#"<html><head><title>Trial Report</title></head><body>
        <nav>Home | Search | About</nav>
        <div class="sidenav">Jump to section</div>
        <h2 class="brief-title">Gene Transfer Study in Severe Hemophilia A</h2>
        <div class="dynamic-heading"><h3 class="ctSubHeading">Identification</h3></div>
        <table class="ctReportTable">
          <tr><td>NCTID</td><td>NCT04601051 (View at ClinicalTrials.gov)</td></tr>
          <tr><td>Phase</td><td>Phase 1/2</td></tr>
          <tr><td>Acronym</td><td></td></tr>
        </table>
        <div class="dynamic-heading"><h3 class="ctSubHeading">Status</h3></div>
        <table class="ctReportTable">
          <tr><td>Overall Status</td><td>Recruiting (Click here for contact info)</td></tr>
        </table>
        <div class="dynamic-heading"><h3 class="ctSubHeading">Summary</h3></div>
        <table class="ctReportTable">
          <tr><td>Brief Summary</td><td>A first-in-human study of AAV-based gene transfer.</td></tr>
        </table>
        <h5 class="link-type-heading">Registries</h5>
        <ul class="external-links-list"><li>ClinicalTrials.gov record</li></ul>
        <footer>Site footer</footer>
        </body></html>"#
            .to_string()
    }

    #[test]
    fn classifies_trial_page_by_markup() {
        let doc = extract(&trial_page(), "https://example.org/somewhere").unwrap();
        assert!(doc.metadata.source_key.starts_with("CLINICAL TRIAL: "));
    }

    #[test]
    fn classifies_trial_page_by_url_alone() {
        let markup = "<html><body><p>placeholder body text for an unpublished report</p></body></html>";
        let doc = extract(markup, TRIAL_URL).unwrap();
        assert_eq!(doc.metadata.source_key, "CLINICAL TRIAL: NCT04601051");
    }

    #[test]
    fn trial_extraction_emits_banner_title_and_sections() {
        let doc = extract(&trial_page(), TRIAL_URL).unwrap();
        let text = &doc.text;

        assert!(text.starts_with("--- CLINICAL TRIAL: NCT04601051 ---"));
        assert!(text.contains("Title: Gene Transfer Study in Severe Hemophilia A"));
        assert!(text.contains("=== Identification ==="));
        assert!(text.contains("NCTID: NCT04601051"));
        assert!(text.contains("Phase: Phase 1/2"));
        assert!(text.contains("=== Status ==="));
    }

    #[test]
    fn trial_extraction_keeps_empty_values_and_strips_boilerplate() {
        let doc = extract(&trial_page(), TRIAL_URL).unwrap();
        assert!(doc.text.contains("Acronym: \n") || doc.text.contains("Acronym:\n"));
        assert!(doc.text.contains("Overall Status: Recruiting"));
        assert!(!doc.text.contains("View at"));
        assert!(!doc.text.contains("Click here"));
    }

    #[test]
    fn trial_extraction_skips_summary_heading_but_keeps_its_table() {
        let doc = extract(&trial_page(), TRIAL_URL).unwrap();
        assert!(!doc.text.contains("=== Summary ==="));
        assert!(doc.text.contains("Brief Summary: A first-in-human study"));
    }

    #[test]
    fn trial_extraction_appends_link_groups() {
        let doc = extract(&trial_page(), TRIAL_URL).unwrap();
        assert!(doc.text.contains("=== Resources/Links ==="));
        assert!(doc.text.contains("Registries:"));
        assert!(doc.text.contains("- ClinicalTrials.gov record"));
    }

    #[test]
    fn trial_extraction_excludes_navigation_noise() {
        let doc = extract(&trial_page(), TRIAL_URL).unwrap();
        assert!(!doc.text.contains("Jump to section"));
        assert!(!doc.text.contains("Site footer"));
    }

    #[test]
    fn nct_id_from_page_wins_over_url_segment() {
        let markup = trial_page();
        let doc = extract(
            &markup,
            "https://scge.mcw.edu/platform/data/report/clinicalTrials/stale-slug",
        )
        .unwrap();
        assert_eq!(doc.metadata.source_key, "CLINICAL TRIAL: NCT04601051");
    }

    #[test]
    fn generic_page_structured_extraction() {
        let markup = r#"<html><head><title>Methods</title></head><body>
        <main>
          <h1>Delivery Methods</h1>
          <table>
            <tr><td>Vector</td><td>AAV9</td></tr>
            <tr><td>a</td><td>b</td><td>c</td></tr>
          </table>
          <dl><dt>LNP</dt><dd>Lipid nanoparticle</dd></dl>
          <h2>Overview</h2>
          <p>Adeno-associated virus vectors are widely used for in vivo delivery.</p>
          <ul><li>Systemic administration</li><li>Local administration</li></ul>
        </main>
        </body></html>"#;

        let doc = extract(markup, "https://example.org/methods/delivery").unwrap();
        let text = &doc.text;

        assert!(text.contains("=== Delivery Methods ==="));
        assert!(text.contains("Vector: AAV9"));
        assert!(text.contains("a | b | c"));
        assert!(text.contains("LNP: Lipid nanoparticle"));
        assert!(text.contains("Overview:"));
        assert!(text.contains("widely used for in vivo delivery"));
        assert!(text.contains("- Systemic administration"));
        assert_eq!(
            doc.metadata.source_key,
            "delivery:https://example.org/methods/delivery"
        );
    }

    #[test]
    fn generic_page_falls_back_to_raw_text() {
        let markup = r#"<html><body><main>
        <span>No headings here, just a run of plain inline narrative text that still
        carries enough words to matter for retrieval purposes.</span>
        </main></body></html>"#;
        let doc = extract(markup, "https://example.org/plain").unwrap();
        assert!(doc.text.contains("plain inline narrative text"));
    }

    #[test]
    fn source_key_uses_host_when_path_is_empty() {
        let markup = "<html><body><main><p>Front page content with enough text to be extracted and kept for indexing purposes.</p></main></body></html>";
        let doc = extract(markup, "https://example.org/").unwrap();
        assert!(doc.metadata.source_key.starts_with("example_org:"));
    }

    #[test]
    fn empty_page_yields_none() {
        assert!(extract("<html><body></body></html>", "https://example.org/empty").is_none());
    }

    #[test]
    fn metadata_records_url_title_and_origin() {
        let doc = extract(&trial_page(), TRIAL_URL).unwrap();
        assert_eq!(doc.metadata.url, TRIAL_URL);
        assert_eq!(doc.metadata.title, "Trial Report");
        assert_eq!(doc.metadata.origin, ORIGIN_URL);
    }
}
