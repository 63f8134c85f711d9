use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use url::Url;

static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table tr").unwrap());
static COMPANY_ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"td[data-th="company"] a"#).unwrap());
static DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p.description.item").unwrap());

/// A company discovered on the listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyLink {
    /// Trimmed anchor text
    pub name: String,
    pub url: Url,
}

/// Every `(name, link)` pair in the listing tables.
///
/// Rows without a company anchor, without anchor text, or without a
/// resolvable href are skipped.
pub fn company_links(html: &str, base: &Url) -> Vec<CompanyLink> {
    let doc = Html::parse_document(html);
    doc.select(&ROW).filter_map(|row| company_link(row, base)).collect()
}

fn company_link(row: ElementRef<'_>, base: &Url) -> Option<CompanyLink> {
    let anchor = row.select(&COMPANY_ANCHOR).next()?;
    let name = anchor.text().collect::<String>().trim().to_string();
    let href = anchor.value().attr("href")?;
    if name.is_empty() || href.trim().is_empty() {
        return None;
    }
    let url = base.join(href.trim()).ok()?;
    Some(CompanyLink { name, url })
}

/// Text of the first review description, whitespace collapsed.
pub fn review_text(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let node = doc.select(&DESCRIPTION).next()?;
    let text = node.text().collect::<String>();
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.customerservicescoreboard.com/").unwrap()
    }

    #[test]
    fn extracts_links_from_listing() {
        let html = std::fs::read_to_string("tests/fixtures/listing.html").unwrap();
        let links = company_links(&html, &base());

        let names: Vec<&str> = links.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Acme", "Beta Corp", "Gamma Telecom"]);
        assert_eq!(
            links[0].url.as_str(),
            "https://www.customerservicescoreboard.com/Acme"
        );
        assert_eq!(
            links[2].url.as_str(),
            "https://www.customerservicescoreboard.com/Gamma-Telecom"
        );
    }

    #[test]
    fn skips_rows_without_anchor_or_href() {
        let html = r#"<table>
            <tr><th>Company</th><th>Score</th></tr>
            <tr><td data-th="company">No link here</td></tr>
            <tr><td data-th="company"><a>Nameless href</a></td></tr>
            <tr><td data-th="company"><a href="/empty">   </a></td></tr>
            <tr><td data-th="score"><a href="/wrong-cell">Wrong cell</a></td></tr>
            <tr><td data-th="company"><a href="/ok">OK Co</a></td></tr>
        </table>"#;
        let links = company_links(html, &base());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].name, "OK Co");
    }

    #[test]
    fn absolute_hrefs_are_kept() {
        let html = r#"<table><tr><td data-th="company">
            <a href="https://elsewhere.example/x">Elsewhere</a>
        </td></tr></table>"#;
        let links = company_links(html, &base());
        assert_eq!(links[0].url.as_str(), "https://elsewhere.example/x");
    }

    #[test]
    fn no_table_no_links() {
        assert!(company_links("<html><body><p>nothing</p></body></html>", &base()).is_empty());
    }

    #[test]
    fn review_from_detail_page() {
        let html = std::fs::read_to_string("tests/fixtures/detail.html").unwrap();
        assert_eq!(
            review_text(&html).as_deref(),
            Some("Acme answers the phone quickly and the staff are friendly.")
        );
    }

    #[test]
    fn review_requires_both_classes() {
        let html = r#"<p class="description">Not it</p><div class="description item">Nor this</div>"#;
        assert_eq!(review_text(html), None);
    }

    #[test]
    fn blank_review_is_none() {
        assert_eq!(review_text(r#"<p class="description item">  </p>"#), None);
    }
}
