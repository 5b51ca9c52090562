//! Feed markup to plain display text.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::feed::Message;

static LINE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("line break pattern"));
static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("entity pattern"));

/// Drop everything inside tags. A `<br>` becomes a single space.
pub fn strip_html_tags(input: &str) -> String {
    let mut depth = 0usize;
    let mut inner = String::new();
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '<' => depth += 1,
            '>' if depth > 0 => {
                depth -= 1;
                if depth == 0 && inner.trim_end_matches('/').trim() == "br" {
                    out.push(' ');
                }
                inner.clear();
            }
            _ if depth > 0 => inner.push(ch),
            _ => out.push(ch),
        }
    }
    out
}

pub fn decode_entities(input: &str) -> Cow<'_, str> {
    ENTITY.replace_all(input, |caps: &Captures<'_>| {
        let name = &caps[1];
        let decoded = if let Some(hex) = name
            .strip_prefix("#x")
            .or_else(|| name.strip_prefix("#X"))
        {
            u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
        } else if let Some(dec) = name.strip_prefix('#') {
            dec.parse::<u32>().ok().and_then(char::from_u32)
        } else {
            match name {
                "gt" => Some('>'),
                "lt" => Some('<'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => None,
            }
        };
        match decoded {
            Some(ch) => ch.to_string(),
            None => caps[0].to_string(),
        }
    })
}

/// Split a body into display lines: one per `<br>`, tags removed,
/// entities decoded.
pub fn render_lines(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    LINE_BREAK
        .split(raw)
        .map(|segment| decode_entities(&strip_html_tags(segment)).into_owned())
        .collect()
}

/// Row text for list views. An empty body shows the media URL instead.
pub fn single_line(message: &Message, media_base: &str) -> String {
    if !message.has_body() {
        let url = message.media_url(media_base).unwrap_or_default();
        return format!("[{url}]");
    }
    let stripped = strip_html_tags(&message.body);
    decode_entities(&stripped).replace('\n', " ")
}
