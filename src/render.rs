//! Markdown → HTML for generated replies.
//!
//! Two modes:
//! - [`RenderMode::Structured`] walks the pulldown-cmark event stream and
//!   attaches presentation classes by node type. Literal tag text inside
//!   code is left alone.
//! - [`RenderMode::Compat`] renders plain HTML and then rewrites tag
//!   strings textually. Any matching tag string in the output is rewritten,
//!   including the `<code>` of a code block and tags inside raw HTML.
//!   Kept for output parity with older clients.

use pulldown_cmark::{CodeBlockKind, CowStr, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Structured,
    Compat,
}

/// Textual substitutions applied in compat mode, in order.
const COMPAT_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("<h1>", r#"<h1 class="ai-heading-1">"#),
    ("<h2>", r#"<h2 class="ai-heading-2">"#),
    ("<h3>", r#"<h3 class="ai-heading-3">"#),
    ("<ul>", r#"<ul class="ai-list">"#),
    ("<ol>", r#"<ol class="ai-list">"#),
    ("<li>", r#"<li class="ai-list-item">"#),
    ("<p>", r#"<p class="ai-paragraph">"#),
    ("<code>", r#"<code class="ai-code">"#),
    ("<blockquote>", r#"<blockquote class="ai-quote">"#),
];

fn markdown_options() -> Options {
    Options::ENABLE_TABLES
}

/// Renders a generated reply to HTML with presentation classes.
pub fn format_ai_response(markdown: &str, mode: RenderMode) -> String {
    match mode {
        RenderMode::Structured => render_structured(markdown),
        RenderMode::Compat => render_compat(markdown),
    }
}

fn render_compat(markdown: &str) -> String {
    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, Parser::new_ext(markdown, markdown_options()));
    for (from, to) in COMPAT_SUBSTITUTIONS {
        html = html.replace(from, to);
    }
    html
}

fn render_structured(markdown: &str) -> String {
    let mut events: Vec<Event> = Vec::new();
    let mut code_block: Option<(String, String)> = None;

    for event in Parser::new_ext(markdown, markdown_options()) {
        if let Some((_, body)) = code_block.as_mut() {
            match event {
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((lang, body)) = code_block.take() {
                        events.push(html_event(code_block_html(&lang, &body)));
                    }
                }
                Event::Text(text) | Event::Html(text) | Event::InlineHtml(text) => {
                    body.push_str(&text)
                }
                _ => {}
            }
            continue;
        }

        let styled = match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().unwrap_or("").to_string()
                    }
                    CodeBlockKind::Indented => String::new(),
                };
                code_block = Some((lang, String::new()));
                continue;
            }
            Event::Start(Tag::Heading { level, .. }) if heading_class(level).is_some() => {
                let n = level as u8;
                let class = heading_class(level).unwrap_or_default();
                html_event(format!(r#"<h{} class="{}">"#, n, class))
            }
            Event::Start(Tag::List(None)) => html_event(r#"<ul class="ai-list">"#.to_string()),
            Event::Start(Tag::List(Some(1))) => html_event(r#"<ol class="ai-list">"#.to_string()),
            Event::Start(Tag::List(Some(start))) => {
                html_event(format!(r#"<ol class="ai-list" start="{}">"#, start))
            }
            Event::Start(Tag::Item) => html_event(r#"<li class="ai-list-item">"#.to_string()),
            Event::Start(Tag::Paragraph) => html_event(r#"<p class="ai-paragraph">"#.to_string()),
            Event::Start(Tag::BlockQuote(_)) => {
                html_event(r#"<blockquote class="ai-quote">"#.to_string())
            }
            Event::Code(text) => html_event(format!(
                r#"<code class="ai-code">{}</code>"#,
                html_escape(&text)
            )),
            other => other,
        };
        events.push(styled);
    }

    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, events.into_iter());
    html
}

fn heading_class(level: HeadingLevel) -> Option<&'static str> {
    match level {
        HeadingLevel::H1 => Some("ai-heading-1"),
        HeadingLevel::H2 => Some("ai-heading-2"),
        HeadingLevel::H3 => Some("ai-heading-3"),
        _ => None,
    }
}

fn code_block_html(lang: &str, body: &str) -> String {
    let class = if lang.is_empty() {
        "ai-code".to_string()
    } else {
        format!("ai-code language-{}", html_escape(lang))
    };
    format!(
        "<pre><code class=\"{}\">{}</code></pre>\n",
        class,
        html_escape(body)
    )
}

fn html_event(html: String) -> Event<'static> {
    Event::Html(CowStr::from(html))
}

/// Escapes text for inclusion in HTML element content or attributes.
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_lists_and_paragraphs_get_classes() {
        let html = format_ai_response(
            "## Summary\n\nSome **bold** text.\n\n- one\n- two\n\n1. first\n",
            RenderMode::Structured,
        );
        assert!(html.contains(r#"<h2 class="ai-heading-2">Summary</h2>"#));
        assert!(html.contains(r#"<p class="ai-paragraph">Some <strong>bold</strong> text.</p>"#));
        assert!(html.contains(r#"<ul class="ai-list">"#));
        assert!(html.contains(r#"<li class="ai-list-item">one</li>"#));
        assert!(html.contains(r#"<ol class="ai-list">"#));
    }

    #[test]
    fn deep_headings_stay_plain() {
        let html = format_ai_response("#### Detail\n", RenderMode::Structured);
        assert!(html.contains("<h4>Detail</h4>"));
    }

    #[test]
    fn quotes_inline_code_and_tables() {
        let html = format_ai_response(
            "> quoted\n\nUse `cargo`.\n\n| a | b |\n|---|---|\n| 1 | 2 |\n",
            RenderMode::Structured,
        );
        assert!(html.contains(r#"<blockquote class="ai-quote">"#));
        assert!(html.contains(r#"<code class="ai-code">cargo</code>"#));
        assert!(html.contains("<table>"));
        assert!(html.contains("<td>1</td>"));
    }

    #[test]
    fn structured_mode_leaves_tags_inside_code_blocks_alone() {
        let md = "```html\n<p>hello</p>\n```\n";
        let html = format_ai_response(md, RenderMode::Structured);
        assert!(html.contains(r#"<pre><code class="ai-code language-html">"#));
        assert!(html.contains("&lt;p&gt;hello&lt;/p&gt;"));
        assert!(!html.contains("ai-paragraph"));
    }

    #[test]
    fn compat_mode_applies_literal_substitutions() {
        let html = format_ai_response("# Title\n\ntext\n\n    plain code\n", RenderMode::Compat);
        assert!(html.contains(r#"<h1 class="ai-heading-1">Title</h1>"#));
        assert!(html.contains(r#"<p class="ai-paragraph">text</p>"#));
        assert!(html.contains(r#"<pre><code class="ai-code">plain code"#));
    }

    #[test]
    fn compat_mode_rewrites_tag_strings_in_raw_html() {
        // Raw HTML passes through the renderer unescaped, so the textual
        // rewrite reaches it as well.
        let html = format_ai_response("<div><p>raw</p></div>\n", RenderMode::Compat);
        assert!(html.contains(r#"<p class="ai-paragraph">raw</p>"#));

        let html = format_ai_response("<div><p>raw</p></div>\n", RenderMode::Structured);
        assert!(html.contains("<p>raw</p>"));
    }

    #[test]
    fn escape_covers_markup_characters() {
        assert_eq!(html_escape(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }
}
