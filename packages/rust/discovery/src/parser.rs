//! Catalog index parser.
//!
//! The archive root lists departments as anchors such as
//! `<a href="/web/2014.../http://catalog.uoregon.edu/arts_sciences/mathematics/">`.
//! A link is kept when its path contains the catalog segment followed
//! directly by the slug of a known department:
//! - `.../arts_sciences/mathematics/` maps to `MATH`
//! - `.../arts_sciences/` (the index itself) is ignored
//! - `.../arts_sciences/classics/` is discarded as an unknown department

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

use gradesync_shared::{Department, SourceLink};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Department links found on the catalog index.
#[derive(Debug, Clone, Default)]
pub struct CatalogLinks {
    /// Links to known departments, in document order, URL-deduplicated.
    pub links: Vec<SourceLink>,
    /// Catalog links whose department is not in the known set.
    pub discarded: Vec<String>,
}

static ANCHOR_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector"));

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse the catalog index into department source links.
pub(crate) fn parse_catalog_links(
    html: &str,
    base: &Url,
    segment: &str,
    departments: &[Department],
) -> CatalogLinks {
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut out = CatalogLinks::default();

    for el in doc.select(&ANCHOR_SEL) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:")
        {
            continue;
        }

        let Ok(mut resolved) = base.join(href) else {
            continue;
        };
        resolved.set_fragment(None);

        let Some(slug) = department_slug(&resolved, segment) else {
            continue;
        };

        match departments
            .iter()
            .find(|d| d.slug.eq_ignore_ascii_case(&slug))
        {
            Some(dept) => {
                if seen.insert(resolved.to_string()) {
                    out.links.push(SourceLink {
                        url: resolved.to_string(),
                        department_code: dept.code.clone(),
                    });
                }
            }
            None => out.discarded.push(resolved.to_string()),
        }
    }

    out
}

/// The path segment immediately after the catalog segment, if any.
fn department_slug(url: &Url, segment: &str) -> Option<String> {
    let mut parts = url.path().split('/').filter(|p| !p.is_empty());
    parts.find(|p| *p == segment)?;
    parts.next().map(str::to_string)
}
