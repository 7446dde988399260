use scraper::node::Node;
use scraper::ElementRef;

/// Tag plus immediate-parent tag, the only selector shape the mail templates need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuralPattern {
    pub tag: &'static str,
    pub parent_tag: &'static str,
}

/// `p > span`
pub const SPAN_IN_PARAGRAPH: StructuralPattern = StructuralPattern {
    tag: "span",
    parent_tag: "p",
};

impl StructuralPattern {
    pub fn matches(&self, el: &ElementRef<'_>) -> bool {
        if !el.value().name().eq_ignore_ascii_case(self.tag) {
            return false;
        }
        el.parent()
            .and_then(ElementRef::wrap)
            .map(|parent| parent.value().name().eq_ignore_ascii_case(self.parent_tag))
            .unwrap_or(false)
    }
}

/// Rendered first child of every element under `root` matching `pattern`, in document order.
///
/// Matches without a first child, or whose first child renders to nothing, are skipped.
pub fn located_texts<'a>(
    root: ElementRef<'a>,
    pattern: StructuralPattern,
) -> impl Iterator<Item = String> + 'a {
    root.descendants()
        .filter_map(ElementRef::wrap)
        .filter(move |el| pattern.matches(el))
        .filter_map(render_first_child)
}

pub fn span_texts(root: ElementRef<'_>) -> Vec<String> {
    located_texts(root, SPAN_IN_PARAGRAPH).collect()
}

fn render_first_child(el: ElementRef<'_>) -> Option<String> {
    let child = el.first_child()?;
    let rendered = match child.value() {
        Node::Text(text) => String::from(&**text),
        Node::Element(_) => ElementRef::wrap(child)?.html(),
        Node::Comment(comment) => format!("<!--{}-->", &**comment),
        _ => return None,
    };
    let trimmed = rendered.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn texts_of(html: &str) -> Vec<String> {
        let doc = Html::parse_document(html);
        span_texts(doc.root_element())
    }

    #[test]
    fn yields_span_texts_in_document_order() {
        let texts = texts_of(
            r#"<html><body>
            <p><span>first</span></p>
            <div><p><span>second</span><span>third</span></p></div>
            <table><tr><td><p><span> fourth </span></p></td></tr></table>
            </body></html>"#,
        );
        assert_eq!(texts, vec!["first", "second", "third", "fourth"]);
    }

    #[test]
    fn ignores_spans_not_directly_under_a_paragraph() {
        let texts = texts_of(
            r#"<body><span>loose</span><p><b><span>nested</span></b></p><div><span>div</span></div></body>"#,
        );
        assert!(texts.is_empty(), "unexpected texts: {texts:?}");
    }

    #[test]
    fn skips_empty_spans_and_renders_element_children() {
        let texts = texts_of(
            r#"<body><p><span></span></p><p><span>   </span></p><p><span><b>bold</b> tail</span></p></body>"#,
        );
        assert_eq!(texts, vec!["<b>bold</b>"]);
    }

    #[test]
    fn only_the_first_child_is_rendered() {
        let texts = texts_of(r#"<body><p><span>Max hat<br>Ihnen</span></p></body>"#);
        assert_eq!(texts, vec!["Max hat"]);
    }

    #[test]
    fn walk_is_repeatable_on_the_same_document() {
        let doc = Html::parse_document("<p><span>a</span></p><p><span>b</span></p>");
        let first = span_texts(doc.root_element());
        let second = span_texts(doc.root_element());
        assert_eq!(first, second);
    }

    #[test]
    fn custom_pattern_matches_tag_case_insensitively() {
        let doc = Html::parse_document("<div><EM>shout</EM></div>");
        let pattern = StructuralPattern {
            tag: "em",
            parent_tag: "DIV",
        };
        let texts = located_texts(doc.root_element(), pattern).collect::<Vec<_>>();
        assert_eq!(texts, vec!["shout"]);
    }
}
