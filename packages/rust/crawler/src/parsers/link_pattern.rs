//! Link-pattern fallback parser.
//!
//! Scans the raw page text instead of relying on annotations: children are
//! profile links that follow a "Father of" / "Mother of" phrase or a
//! "Children" heading or label, the name comes from `<h1>` or `<title>`, and
//! dates from the profile's own "Born ... Died ..." paragraph.

use std::sync::LazyLock;

use lineage_shared::ChildRef;
use regex::Regex;
use scraper::{Html, Selector};

use super::{ProfileFields, ProfileParser, clean_text, profile_id_from_href};

/// Block closers that end a children context.
const CONTEXT_TERMINATORS: [&str; 4] = ["</p>", "</ul>", "</div>", "</section>"];

/// Heuristic parser for pages whose structural markup has drifted.
pub struct LinkPatternParser;

impl ProfileParser for LinkPatternParser {
    fn parse(&self, doc: &Html, raw: &str, external_id: &str) -> ProfileFields {
        let vitals = vitals_paragraph(doc).unwrap_or_default();
        let (birth_date, birth_place) = vital_phrase(&vitals, VitalEvent::Born);
        let (death_date, death_place) = vital_phrase(&vitals, VitalEvent::Died);

        ProfileFields {
            display_name: heading_name(doc),
            birth_date,
            death_date,
            birth_place,
            death_place,
            children: child_links(raw, external_id),
        }
    }

    fn name(&self) -> &str {
        "link-pattern"
    }
}

/// Profile links found after each children marker.
///
/// "Children" only counts as a heading or a `Children:` label; the bare word
/// in biography prose says nothing about the links that follow it.
fn child_links(raw: &str, external_id: &str) -> Vec<ChildRef> {
    static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?i)\b(?:father|mother|parent)\s+of\b|<h[1-6][^>]*>\s*children\s*</h[1-6]>|\bchildren\s*:",
        )
        .expect("valid regex")
    });
    static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#)
            .expect("valid regex")
    });

    let mut children = Vec::new();
    for marker in MARKER_RE.find_iter(raw) {
        let rest = &raw[marker.end()..];
        let end = CONTEXT_TERMINATORS
            .iter()
            .filter_map(|t| rest.find(t))
            .min()
            .unwrap_or(rest.len());

        for caps in LINK_RE.captures_iter(&rest[..end]) {
            let Some(id) = profile_id_from_href(&caps[1]) else { continue };
            if id == external_id {
                continue;
            }
            let display_name = strip_tags(&caps[2]).unwrap_or_else(|| id.clone());
            children.push(ChildRef {
                external_id: id,
                display_name,
            });
        }
    }
    children
}

/// Name from the first `<h1>`, else the `<title>` up to its site suffix.
fn heading_name(doc: &Html) -> Option<String> {
    let h1_sel = Selector::parse("h1").expect("valid selector");
    if let Some(name) = doc
        .select(&h1_sel)
        .next()
        .and_then(|el| clean_text(&el.text().collect::<String>()))
    {
        return Some(name);
    }

    let title_sel = Selector::parse("title").expect("valid selector");
    let title = doc.select(&title_sel).next()?.text().collect::<String>();
    // "Jane Hopewell (1817 - 1880) | Site Name"
    let name = title.split('|').next().unwrap_or_default();
    let name = name.split(" (").next().unwrap_or_default();
    let name = name.split(" - ").next().unwrap_or_default();
    clean_text(name)
}

#[derive(Clone, Copy)]
enum VitalEvent {
    Born,
    Died,
}

/// Text of the first paragraph that opens with "Born" or "Died".
///
/// Vitals are only read from this paragraph, so dates mentioned in the
/// biography about relatives never attach to the profile itself.
fn vitals_paragraph(doc: &Html) -> Option<String> {
    let block_sel = Selector::parse("p, li, dd").expect("valid selector");
    doc.select(&block_sel)
        .filter_map(|el| clean_text(&el.text().collect::<String>()))
        .find(|text| text.starts_with("Born ") || text.starts_with("Died "))
}

/// Date and place from "Born about 1817 in Albemarle, Virginia" style text.
///
/// The label must open a sentence of the vitals paragraph.
fn vital_phrase(vitals: &str, event: VitalEvent) -> (Option<String>, Option<String>) {
    static BORN_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?:^|[.;]\s+)Born\s+(.*?\d{4})(?:\s+in\s+([^.;]+))?").expect("valid regex")
    });
    static DIED_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?:^|[.;]\s+)Died\s+(.*?\d{4})(?:\s+in\s+([^.;]+))?").expect("valid regex")
    });

    let re = match event {
        VitalEvent::Born => &*BORN_RE,
        VitalEvent::Died => &*DIED_RE,
    };

    match re.captures(vitals) {
        Some(caps) => (
            clean_text(&caps[1]),
            caps.get(2).and_then(|m| clean_text(m.as_str())),
        ),
        None => (None, None),
    }
}

fn strip_tags(fragment: &str) -> Option<String> {
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
    clean_text(&TAG_RE.replace_all(fragment, " "))
}
