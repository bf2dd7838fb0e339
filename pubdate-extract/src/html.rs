//! Small DOM helpers on top of `scraper`.

use regex::Regex;
use scraper::ElementRef;
use std::sync::LazyLock;

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("static regex"));
static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"  +").expect("static regex"));

/// Visible text of an element: descendant text without `<script>`/`<style>`
/// content, blank lines squeezed and space runs dropped.
pub fn inner_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .take_while(|a| a.id() != el.id())
            .filter_map(|a| a.value().as_element())
            .any(|e| matches!(e.name(), "script" | "style"));
        if !hidden {
            out.push_str(text);
        }
    }
    let squeezed = BLANK_LINES.replace_all(&out, "\n");
    SPACE_RUNS.replace_all(&squeezed, "").trim().to_string()
}

/// Text and markup of each direct child, skipping empty text nodes.
pub fn child_fragments(el: ElementRef<'_>) -> Vec<(String, String)> {
    el.children()
        .filter_map(|child| {
            if let Some(child_el) = ElementRef::wrap(child) {
                Some((inner_text(child_el), child_el.html()))
            } else {
                let text = child.value().as_text()?.trim().to_string();
                (!text.is_empty()).then(|| (text.clone(), text))
            }
        })
        .collect()
}

/// First non-empty value among `names`, in order.
pub fn first_attr<'a>(el: ElementRef<'a>, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|n| el.value().attr(n))
        .map(str::trim)
        .find(|v| !v.is_empty())
}

/// Whether `itemprop`, `class` or `id` (or `name` on an `<input>`) starts
/// with `prefix`, ignoring ASCII case. `prefix` must already be lowercase.
pub fn has_attr_prefix(el: ElementRef<'_>, prefix: &str) -> bool {
    let e = el.value();
    let starts = |v: &str| {
        v.len() >= prefix.len()
            && v.is_char_boundary(prefix.len())
            && v[..prefix.len()].eq_ignore_ascii_case(prefix)
    };
    ["itemprop", "class", "id"]
        .iter()
        .filter_map(|a| e.attr(a))
        .any(starts)
        || (e.name() == "input" && e.attr("name").is_some_and(starts))
}

/// `<meta name="..." content="...">` with every other attribute dropped.
pub fn meta_fragment(attr: &str, value: &str, content: &str) -> String {
    let esc = |s: &str| s.replace('"', "&quot;");
    format!(r#"<meta {attr}="{}" content="{}">"#, esc(value), esc(content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn first<'a>(doc: &'a Html, sel: &str) -> ElementRef<'a> {
        doc.select(&Selector::parse(sel).unwrap()).next().unwrap()
    }

    #[test]
    fn inner_text_skips_scripts_and_squeezes() {
        let doc = Html::parse_document(
            "<div id=x>  Posted <script>var a = 1;</script><b>March 4</b>\n\n\n 2021</div>",
        );
        assert_eq!(inner_text(first(&doc, "#x")), "Posted March 4\n 2021");
    }

    #[test]
    fn prefix_matching_is_case_insensitive() {
        let doc = Html::parse_document(
            r#"<span class="Published-Date big">x</span><input name="pubdate_field">"#,
        );
        assert!(has_attr_prefix(first(&doc, "span"), "published"));
        assert!(!has_attr_prefix(first(&doc, "span"), "big"));
        assert!(has_attr_prefix(first(&doc, "input"), "pubdate"));
    }

    #[test]
    fn child_fragments_cover_text_and_elements() {
        let doc = Html::parse_document("<p id=p>By Ann <time>May 2, 2021</time></p>");
        let kids = child_fragments(first(&doc, "#p"));
        assert_eq!(kids[0].0, "By Ann");
        assert_eq!(kids[1].0, "May 2, 2021");
        assert!(kids[1].1.starts_with("<time>"));
    }
}
