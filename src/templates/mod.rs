//! HTML and email rendering.

pub mod emails;
pub mod pages;

use crate::config::EventConfig;

/// Escapes text for use in HTML bodies and double-quoted attributes.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub(crate) fn title(event: &EventConfig) -> String {
    if event.environment_name.is_empty() {
        event.event_name.clone()
    } else {
        format!("{} - {}", event.event_name, event.environment_name)
    }
}

pub(crate) fn layout(event: &EventConfig, heading: &str, body: &str) -> String {
    let banner = if event.environment_name.is_empty() {
        String::new()
    } else {
        format!(
            r#"<div class="environment">{}</div>"#,
            escape(&event.environment_name)
        )
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
</head>
<body>
    {banner}
    <h1>{event_name}</h1>
    <h2>{heading}</h2>
    {body}
</body>
</html>
"#,
        title = escape(&title(event)),
        event_name = escape(&event.event_name),
        heading = escape(heading),
    )
}
