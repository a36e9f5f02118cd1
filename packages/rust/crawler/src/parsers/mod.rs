//! Profile parsing strategies.
//!
//! Profile pages are read by an ordered chain of parsers. The structural
//! [`MicrodataParser`] runs first. The [`LinkPatternParser`] supplies the
//! child list whenever the primary found no children, and the name, dates
//! and places only when the primary found no structured record at all. Markup drift on the source site therefore degrades extraction
//! instead of silently truncating the tree.

mod link_pattern;
mod microdata;

use std::sync::LazyLock;

use lineage_evidence::{estimate_profile, parse_date};
use lineage_shared::{ChildRef, LineageError, LivingEstimate, Profile, Result};
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

pub use link_pattern::LinkPatternParser;
pub use microdata::MicrodataParser;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Raw fields a parser managed to read from one page.
///
/// Dates are kept as the page wrote them; normalization happens once the
/// chain has merged all strategies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileFields {
    pub display_name: Option<String>,
    pub birth_date: Option<String>,
    pub death_date: Option<String>,
    pub birth_place: Option<String>,
    pub death_place: Option<String>,
    pub children: Vec<ChildRef>,
}

impl ProfileFields {
    /// Merge a lower-priority strategy's output into `self`.
    ///
    /// Identity and vitals are taken from `other` only while `self` holds
    /// none of them: once a strategy has read a structured record, an empty
    /// date means the page records no such date. Children are taken whenever
    /// `self` has none.
    fn fill_from(&mut self, other: ProfileFields) {
        if self.has_record() {
            if self.children.is_empty() {
                self.children = other.children;
            }
            return;
        }
        self.display_name = self.display_name.take().or(other.display_name);
        self.birth_date = self.birth_date.take().or(other.birth_date);
        self.death_date = self.death_date.take().or(other.death_date);
        self.birth_place = self.birth_place.take().or(other.birth_place);
        self.death_place = self.death_place.take().or(other.death_place);
        if self.children.is_empty() {
            self.children = other.children;
        }
    }

    fn has_record(&self) -> bool {
        self.display_name.is_some()
            || self.birth_date.is_some()
            || self.death_date.is_some()
            || self.birth_place.is_some()
            || self.death_place.is_some()
    }

    fn is_complete(&self) -> bool {
        self.display_name.is_some()
            && self.birth_date.is_some()
            && self.death_date.is_some()
            && (self.birth_place.is_some() || self.death_place.is_some())
            && !self.children.is_empty()
    }
}

/// A strategy for reading profile fields out of a page.
pub trait ProfileParser: Send + Sync {
    /// Extract whatever fields this strategy understands.
    ///
    /// `raw` is the unparsed page body, for strategies that scan text
    /// rather than the DOM.
    fn parse(&self, doc: &Html, raw: &str, external_id: &str) -> ProfileFields;

    /// Human-readable parser name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// Holds parsers in priority order and merges their output into a [`Profile`].
pub struct ParserChain {
    parsers: Vec<Box<dyn ProfileParser>>,
}

impl ParserChain {
    /// Microdata first, link-pattern fallback last.
    pub fn new() -> Self {
        Self {
            parsers: vec![Box::new(MicrodataParser), Box::new(LinkPatternParser)],
        }
    }

    /// Parse a page into a profile.
    ///
    /// Fails with [`LineageError::Parse`] when no strategy finds a name,
    /// since such a page cannot be identified as a person.
    pub fn parse(&self, external_id: &str, html: &str) -> Result<Profile> {
        let doc = Html::parse_document(html);
        let mut fields = ProfileFields::default();

        for parser in &self.parsers {
            if fields.is_complete() {
                break;
            }
            let had_children = !fields.children.is_empty();
            fields.fill_from(parser.parse(&doc, html, external_id));
            if !had_children && !fields.children.is_empty() {
                debug!(
                    external_id,
                    parser = parser.name(),
                    children = fields.children.len(),
                    "children extracted"
                );
            }
        }

        let display_name = fields.display_name.ok_or_else(|| {
            LineageError::parse(format!("{external_id}: no profile name found by any parser"))
        })?;

        let birth = fields.birth_date.as_deref().map(parse_date).unwrap_or_default();
        let death = fields.death_date.as_deref().map(parse_date).unwrap_or_default();

        let mut profile = Profile {
            external_id: external_id.to_string(),
            display_name,
            birth_year: birth.year,
            birth_approximate: birth.is_approximate,
            death_year: death.year,
            death_approximate: death.is_approximate,
            birth_place: fields.birth_place,
            death_place: fields.death_place,
            is_private: detect_private(&doc, html),
            living: LivingEstimate::unknown(),
            children: dedup_children(fields.children, external_id),
        };
        profile.living = estimate_profile(&profile);

        Ok(profile)
    }
}

impl Default for ParserChain {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Detect an explicit privacy marker on the page.
pub(crate) fn detect_private(doc: &Html, raw: &str) -> bool {
    let marker_sel = Selector::parse(
        r#"[data-privacy="private"], .privacy-private, img[title="Privacy Level: Private"]"#,
    )
    .expect("valid selector");
    if doc.select(&marker_sel).next().is_some() {
        return true;
    }

    let lower = raw.to_lowercase();
    lower.contains("privacy level: private") || lower.contains("this profile is private")
}

/// Extract a profile identifier (`Surname-123`) from a link target.
pub(crate) fn profile_id_from_href(href: &str) -> Option<String> {
    static ID_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?:^|/)wiki/([A-Za-z][^/?#\s]*-\d+)(?:[?#].*)?$").expect("valid regex")
    });

    ID_RE.captures(href.trim()).map(|caps| caps[1].to_string())
}

/// Collapse runs of whitespace; `None` when nothing is left.
pub(crate) fn clean_text(text: &str) -> Option<String> {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

/// Drop self-links and repeated children, keeping first-seen order.
fn dedup_children(children: Vec<ChildRef>, external_id: &str) -> Vec<ChildRef> {
    let mut seen = std::collections::HashSet::new();
    children
        .into_iter()
        .filter(|c| c.external_id != external_id && seen.insert(c.external_id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_ids_from_links() {
        assert_eq!(
            profile_id_from_href("/wiki/Hopewell-183").as_deref(),
            Some("Hopewell-183")
        );
        assert_eq!(
            profile_id_from_href("https://www.wikitree.com/wiki/O'Neil-52#Biography").as_deref(),
            Some("O'Neil-52")
        );
        assert_eq!(profile_id_from_href("/wiki/Special:SearchPerson"), None);
        assert_eq!(profile_id_from_href("/genealogy/HOPEWELL"), None);
    }

    #[test]
    fn text_cleanup() {
        assert_eq!(clean_text("  Jane \n  Hopewell ").as_deref(), Some("Jane Hopewell"));
        assert_eq!(clean_text(" \n\t "), None);
    }

    #[test]
    fn privacy_markers() {
        let html = r#"<html><body><div data-privacy="private">Hidden</div></body></html>"#;
        assert!(detect_private(&Html::parse_document(html), html));

        let html = "<html><body><p>Privacy Level: Private (Red)</p></body></html>";
        assert!(detect_private(&Html::parse_document(html), html));

        let html = "<html><body><p>Privacy Level: Open (White)</p></body></html>";
        assert!(!detect_private(&Html::parse_document(html), html));
    }

    #[test]
    fn duplicate_and_self_children_are_dropped() {
        let child = |id: &str| ChildRef {
            external_id: id.into(),
            display_name: id.into(),
        };
        let children = vec![child("A-1"), child("Self-1"), child("A-1"), child("B-2")];
        let deduped = dedup_children(children, "Self-1");
        let ids: Vec<&str> = deduped.iter().map(|c| c.external_id.as_str()).collect();
        assert_eq!(ids, vec!["A-1", "B-2"]);
    }

    #[test]
    fn unnamed_page_is_a_parse_error() {
        let chain = ParserChain::new();
        let err = chain
            .parse("Ghost-1", "<html><body><p>Nothing here</p></body></html>")
            .unwrap_err();
        assert!(matches!(err, LineageError::Parse { .. }));
    }

    #[test]
    fn structured_record_keeps_fallback_dates_out() {
        let html = r#"<html><body>
            <h1><span itemprop="name">Sarah Hopewell</span></h1>
            <time itemprop="birthDate">1990</time>
            <p>Born 1990. Died 2015 in Ohio.</p>
            <p>Her grandfather died 2015 in Ohio.</p>
        </body></html>"#;

        let profile = ParserChain::new().parse("Hopewell-300", html).unwrap();
        assert_eq!(profile.birth_year, Some(1990));
        assert_eq!(profile.death_year, None);
        assert_eq!(profile.death_place, None);
    }

    #[test]
    fn drifted_markup_still_takes_fallback_vitals() {
        let html = r#"<html><body>
            <h1>John Hopewell</h1>
            <p>Born 14 Mar 1839 in Greene County, Ohio. Died bef. 1901 in Xenia, Ohio.</p>
        </body></html>"#;

        let profile = ParserChain::new().parse("Hopewell-184", html).unwrap();
        assert_eq!(profile.birth_year, Some(1839));
        assert_eq!(profile.death_year, Some(1901));
        assert!(profile.death_approximate);
        assert_eq!(profile.death_place.as_deref(), Some("Xenia, Ohio"));
    }
}
