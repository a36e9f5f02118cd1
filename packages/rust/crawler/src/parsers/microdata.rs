//! schema.org `Person` microdata parser (primary strategy).

use lineage_shared::ChildRef;
use scraper::{ElementRef, Html, Selector};

use super::{ProfileFields, ProfileParser, clean_text, profile_id_from_href};

/// Reads `itemprop` annotations: `name`, `birthDate`, `deathDate`,
/// `birthPlace`, `deathPlace`, and one `children` scope per child.
pub struct MicrodataParser;

impl ProfileParser for MicrodataParser {
    fn parse(&self, doc: &Html, _raw: &str, _external_id: &str) -> ProfileFields {
        ProfileFields {
            display_name: select_text(doc, r#"h1 [itemprop="name"]"#),
            birth_date: select_date(doc, r#"[itemprop="birthDate"]"#),
            death_date: select_date(doc, r#"[itemprop="deathDate"]"#),
            birth_place: select_text(doc, r#"[itemprop="birthPlace"]"#),
            death_place: select_text(doc, r#"[itemprop="deathPlace"]"#),
            children: extract_children(doc),
        }
    }

    fn name(&self) -> &str {
        "microdata"
    }
}

fn select_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).expect("valid selector");
    let el = doc.select(&sel).next()?;
    element_text(&el).or_else(|| el.value().attr("content").and_then(clean_text))
}

/// Prefer the visible text ("about 1817") over the machine value
/// (`1817-00-00`), since only the text carries the approximation.
fn select_date(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).expect("valid selector");
    let el = doc.select(&sel).next()?;
    element_text(&el).or_else(|| {
        el.value()
            .attr("datetime")
            .or_else(|| el.value().attr("content"))
            .and_then(clean_text)
    })
}

fn extract_children(doc: &Html) -> Vec<ChildRef> {
    let child_sel = Selector::parse(r#"[itemprop="children"]"#).expect("valid selector");
    let link_sel = Selector::parse("a[href]").expect("valid selector");
    let name_sel = Selector::parse(r#"[itemprop="name"]"#).expect("valid selector");

    let mut children = Vec::new();
    for scope in doc.select(&child_sel) {
        // The scope may itself be the link.
        let link = if scope.value().name() == "a" {
            Some(scope)
        } else {
            scope.select(&link_sel).next()
        };
        let Some(link) = link else { continue };
        let Some(external_id) = link.value().attr("href").and_then(profile_id_from_href) else {
            continue;
        };

        let display_name = scope
            .select(&name_sel)
            .next()
            .and_then(|el| element_text(&el))
            .or_else(|| element_text(&link))
            .unwrap_or_else(|| external_id.clone());

        children.push(ChildRef {
            external_id,
            display_name,
        });
    }
    children
}

fn element_text(el: &ElementRef<'_>) -> Option<String> {
    clean_text(&el.text().collect::<String>())
}
