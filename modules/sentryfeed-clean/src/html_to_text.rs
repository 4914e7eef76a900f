//! HTML → text conversion (§4.D "HTML -> text conversion"). Strips
//! script/style/nav/footer, preserves fenced code blocks verbatim, collapses
//! whitespace, and keeps inline links as `text (url)`.
//!
//! Uses `scraper`/`ego-tree` for real DOM traversal rather than a
//! regex-based `href=...` extraction — that approach is fine for pulling a
//! handful of candidate links but not for a faithful text rendering of
//! arbitrary article markup.

use ego_tree::NodeRef;
use scraper::{Html, Node};

const SKIP_TAGS: &[&str] = &["script", "style", "nav", "footer", "header", "aside", "noscript"];
const CODE_TAGS: &[&str] = &["pre", "code"];

/// Convert an HTML document (or fragment) to plain text.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();
    render_children(document.tree.root(), &mut out, false);
    collapse_whitespace(&out)
}

fn render_children(node: NodeRef<Node>, out: &mut String, in_code: bool) {
    for child in node.children() {
        render_node(child, out, in_code);
    }
}

fn render_node(node: NodeRef<Node>, out: &mut String, in_code: bool) {
    match node.value() {
        Node::Element(el) => {
            let tag = el.name();
            if SKIP_TAGS.contains(&tag) {
                return;
            }
            let now_in_code = in_code || CODE_TAGS.contains(&tag);
            if tag == "a" {
                let href = el.attr("href").unwrap_or("").to_string();
                let mut inner = String::new();
                render_children(node, &mut inner, now_in_code);
                let inner = inner.trim();
                if !href.is_empty() && !inner.is_empty() {
                    out.push_str(inner);
                    out.push_str(" (");
                    out.push_str(&href);
                    out.push(')');
                } else {
                    out.push_str(inner);
                }
                out.push(' ');
                return;
            }
            if tag == "pre" {
                out.push_str("\n```\n");
                render_children(node, out, true);
                out.push_str("\n```\n");
                return;
            }
            let block = matches!(
                tag,
                "p" | "div" | "br" | "li" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "section" | "article" | "tr"
            );
            render_children(node, out, now_in_code);
            if block {
                out.push('\n');
            }
        }
        Node::Text(text) => {
            if in_code {
                out.push_str(text);
            } else {
                out.push_str(text);
                out.push(' ');
            }
        }
        _ => {}
    }
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    let mut blank_lines = 0;
    for line in s.lines() {
        let trimmed = collapse_spaces(line.trim());
        if trimmed.is_empty() {
            blank_lines += 1;
            if blank_lines > 1 {
                continue;
            }
            out.push('\n');
            continue;
        }
        blank_lines = 0;
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&trimmed);
        last_was_space = false;
    }
    let _ = last_was_space;
    out.trim().to_string()
}

fn collapse_spaces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_and_style() {
        let html = "<html><body><script>alert(1)</script><style>.x{}</style><p>Hello world</p></body></html>";
        let text = html_to_text(html);
        assert!(!text.contains("alert"));
        assert!(!text.contains(".x{}"));
        assert!(text.contains("Hello world"));
    }

    #[test]
    fn preserves_code_block_fences() {
        let html = "<p>Before</p><pre><code>fn main() {}</code></pre><p>After</p>";
        let text = html_to_text(html);
        assert!(text.contains("```"));
        assert!(text.contains("fn main() {}"));
    }

    #[test]
    fn renders_inline_links_as_text_and_url() {
        let html = r#"<p>See <a href="https://example.com/doc">the docs</a> for more.</p>"#;
        let text = html_to_text(html);
        assert!(text.contains("the docs (https://example.com/doc)"));
    }

    #[test]
    fn collapses_repeated_whitespace() {
        let html = "<p>A     B\n\n\n\nC</p>";
        let text = html_to_text(html);
        assert!(!text.contains("   "));
    }
}
