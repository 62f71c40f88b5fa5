//! Text usage hints.
//!
//! A `Text` component carries its content as markdown; the `usageHint`
//! property promotes it to a heading or caption before it reaches the host's
//! markdown renderer.

/// Shown in place of text that has not arrived yet.
pub const EMPTY_TEXT: &str = "(empty)";

/// Host-supplied markdown to sanitised HTML conversion.
pub trait MarkdownRenderer {
    fn render(&self, markdown: &str) -> String;
}

impl<F> MarkdownRenderer for F
where
    F: Fn(&str) -> String,
{
    fn render(&self, markdown: &str) -> String {
        self(markdown)
    }
}

/// Markdown source for a text value under the given usage hint.
pub fn markup(text: Option<&str>, usage_hint: Option<&str>) -> String {
    let Some(text) = text else {
        return EMPTY_TEXT.to_string();
    };

    match usage_hint {
        Some("h1") => format!("# {text}"),
        Some("h2") => format!("## {text}"),
        Some("h3") => format!("### {text}"),
        Some("h4") => format!("#### {text}"),
        Some("h5") => format!("##### {text}"),
        Some("caption") => format!("*{text}*"),
        _ => text.to_string(),
    }
}

pub fn render_text(
    renderer: &dyn MarkdownRenderer,
    text: Option<&str>,
    usage_hint: Option<&str>,
) -> String {
    match text {
        Some(_) => renderer.render(&markup(text, usage_hint)),
        None => EMPTY_TEXT.to_string(),
    }
}
