//! Anchor scanning over fetched or rendered HTML.

use scraper::{Html, Selector};

/// Substring identifying a LinkedIn link.
pub const LINKEDIN_MARKER: &str = "linkedin.com";

/// Return the href of the first `<a href>` (document order) containing
/// `linkedin.com`. Later matches are ignored; no match yields `None`.
pub fn find_linkedin_in_html(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    first_href_containing(&doc, LINKEDIN_MARKER)
}

/// First anchor href containing `needle`, as written in the document.
pub(crate) fn first_href_containing(doc: &Html, needle: &str) -> Option<String> {
    let link_sel = Selector::parse("a[href]").expect("anchor selector");

    doc.select(&link_sel)
        .filter_map(|el| el.value().attr("href"))
        .find(|href| href.contains(needle))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_first_match_in_document_order() {
        let html = r#"<html><body>
            <a href="/about">About</a>
            <a href="https://twitter.com/example">Twitter</a>
            <footer>
                <a href="https://www.linkedin.com/company/first">LinkedIn</a>
                <a href="https://linkedin.com/company/second">LinkedIn again</a>
            </footer>
            <a href="https://linkedin.com/in/someone">Founder</a>
        </body></html>"#;

        assert_eq!(
            find_linkedin_in_html(html).as_deref(),
            Some("https://www.linkedin.com/company/first")
        );
    }

    #[test]
    fn no_match_is_none() {
        let html = r#"<html><body><a href="https://example.com">Home</a><p>linkedin.com</p></body></html>"#;
        assert_eq!(find_linkedin_in_html(html), None);
    }

    #[test]
    fn ignores_anchors_without_href() {
        let html = r#"<a name="linkedin.com">x</a><a href="https://linkedin.com/company/x">y</a>"#;
        assert_eq!(
            find_linkedin_in_html(html).as_deref(),
            Some("https://linkedin.com/company/x")
        );
    }

    #[test]
    fn malformed_html_does_not_fail() {
        let html = r#"<div><a href="https://linkedin.com/company/x"><span>unclosed"#;
        assert_eq!(
            find_linkedin_in_html(html).as_deref(),
            Some("https://linkedin.com/company/x")
        );
        assert_eq!(find_linkedin_in_html(""), None);
    }

    #[test]
    fn href_is_returned_verbatim() {
        let html = r#"<a href="//linkedin.com/company/x?trk=footer">in</a>"#;
        assert_eq!(
            find_linkedin_in_html(html).as_deref(),
            Some("//linkedin.com/company/x?trk=footer")
        );
    }
}
