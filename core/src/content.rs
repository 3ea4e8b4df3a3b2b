//! TechDoc XML content for requirements and requirement documents.
//!
//! Output is string-templated. Text fields are escaped for `&`, `<` and `>`
//! only; identifiers and the requirement number are inserted verbatim.
//! Every structural node gets a fresh `aras:id`, so two renders of the same
//! requirement differ byte-for-byte.

use std::borrow::Cow;

use uuid::Uuid;

pub const TECHDOC_NS: &str = "http://aras.com/ArasTechDoc";
pub const RE_STANDARD_NS: &str = "http://www.aras.com/REStandard";

/// Fields rendered into a requirement's `content` property.
#[derive(Debug, Clone, Copy)]
pub struct RequirementContent<'a> {
    pub text: &'a str,
    pub id: &'a str,
    pub chapter: &'a str,
    pub number: &'a str,
    pub title: &'a str,
}

/// 32 uppercase hex digits, the form Aras uses for item and node ids.
pub fn new_node_id() -> String {
    Uuid::new_v4().simple().to_string().to_uppercase()
}

pub fn escape_text(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 16);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

pub fn generate_requirement_xml(req: &RequirementContent<'_>) -> String {
    render_requirement(req, &mut new_node_id)
}

/// Render with caller-supplied node ids, in document order: Requirement,
/// Requirement-Info, Requirement-Chapter, Requirement-Title,
/// Requirement-Number, Text.
pub fn render_requirement(
    req: &RequirementContent<'_>,
    node_id: &mut impl FnMut() -> String,
) -> String {
    let (g1, g2, g3) = (node_id(), node_id(), node_id());
    let (g4, g5, g6) = (node_id(), node_id(), node_id());
    let chapter = escape_text(req.chapter);
    let title = escape_text(req.title);
    let text = escape_text(req.text);
    let (id, number) = (req.id, req.number);

    format!(
        concat!(
            r#"<Requirement xmlns:aras="{techdoc}" xmlns="{standard}" aras:id="{g1}" reqId="{id}">"#,
            r#"<Requirement-Info aras:id="{g2}">"#,
            r#"<Requirement-Chapter aras:id="{g3}"><aras:emph emphtype="text">{chapter}</aras:emph></Requirement-Chapter>"#,
            r#"<Requirement-Title aras:id="{g4}"><aras:emph emphtype="text">{title}</aras:emph></Requirement-Title>"#,
            r#"<Requirement-Number aras:id="{g5}"><aras:emph emphtype="text">{number}</aras:emph></Requirement-Number>"#,
            r#"</Requirement-Info>"#,
            r#"<Text aras:id="{g6}"><aras:emph xmlns="" emphtype="text">{text}</aras:emph></Text>"#,
            r#"</Requirement>"#,
        ),
        techdoc = TECHDOC_NS,
        standard = RE_STANDARD_NS,
        g1 = g1,
        g2 = g2,
        g3 = g3,
        g4 = g4,
        g5 = g5,
        g6 = g6,
        id = id,
        chapter = chapter,
        title = title,
        number = number,
        text = text,
    )
}

/// Aggregate document body: an intro `Text` node followed by one external
/// block reference per id, in the order given. Blank ids are skipped;
/// duplicates are kept.
pub fn build_document_content<S: AsRef<str>>(ids: &[S], title: &str, subtitle: &str) -> String {
    let intro = format!("{title}\n\n{subtitle}");
    let mut content = format!(
        r#"<Text xmlns:aras="{TECHDOC_NS}" xmlns="{RE_STANDARD_NS}" aras:id="{}"><aras:emph xmlns="" emphtype="text">{}</aras:emph></Text>"#,
        new_node_id(),
        escape_text(&intro),
    );
    for id in ids {
        let id = id.as_ref().trim();
        if id.is_empty() {
            continue;
        }
        content.push_str(&format!(
            r#"<aras:block xmlns:aras="{TECHDOC_NS}" ref-id="{id}" by-reference="external" aras:id="{}" />"#,
            new_node_id(),
        ));
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_32_upper_hex() {
        let id = new_node_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        assert_ne!(id, new_node_id());
    }

    #[test]
    fn escape_only_touches_three_metacharacters() {
        assert_eq!(escape_text("a & b < c > d \"e\" 'f'"), "a &amp; b &lt; c &gt; d \"e\" 'f'");
        assert!(matches!(escape_text("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn render_is_deterministic_given_node_ids() {
        let req = RequirementContent {
            text: "Shall <not> fail",
            id: "REQ1",
            chapter: "3 & 4",
            number: "R-1",
            title: "Title",
        };
        let mut n = 0;
        let xml = render_requirement(&req, &mut || {
            n += 1;
            format!("G{n}")
        });
        assert_eq!(
            xml,
            concat!(
                r#"<Requirement xmlns:aras="http://aras.com/ArasTechDoc" xmlns="http://www.aras.com/REStandard" aras:id="G1" reqId="REQ1">"#,
                r#"<Requirement-Info aras:id="G2">"#,
                r#"<Requirement-Chapter aras:id="G3"><aras:emph emphtype="text">3 &amp; 4</aras:emph></Requirement-Chapter>"#,
                r#"<Requirement-Title aras:id="G4"><aras:emph emphtype="text">Title</aras:emph></Requirement-Title>"#,
                r#"<Requirement-Number aras:id="G5"><aras:emph emphtype="text">R-1</aras:emph></Requirement-Number>"#,
                r#"</Requirement-Info>"#,
                r#"<Text aras:id="G6"><aras:emph xmlns="" emphtype="text">Shall &lt;not&gt; fail</aras:emph></Text>"#,
                r#"</Requirement>"#,
            )
        );
    }

    #[test]
    fn document_content_skips_blank_ids() {
        let content = build_document_content(&["A", "", "  ", " B "], "T", "S");
        assert_eq!(content.matches("<aras:block ").count(), 2);
        assert!(content.contains(r#"ref-id="A""#));
        assert!(content.contains(r#"ref-id="B""#));
        assert!(content.contains("T\n\nS"));
    }

    #[test]
    fn document_content_with_no_ids_is_intro_only() {
        let ids: [&str; 0] = [];
        let content = build_document_content(&ids, "T", "S");
        assert!(content.starts_with("<Text "));
        assert!(content.ends_with("</Text>"));
        assert!(!content.contains("aras:block"));
    }
}
