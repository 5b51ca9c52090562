use crate::feed::{Message, Thread};
use crate::markup;

pub const QUOTE_MARKER: &str = ">>";
pub const QUOTE_INDENT: &str = "    ";

/// Display lines for `message`, with each cited post of the same thread
/// inlined (indented) right after the line that cites it.
///
/// Only one level is expanded: quotes inside a quoted post stay as text.
/// Citations that do not resolve (other threads, pruned posts, malformed
/// ids) are left as they are.
pub fn expand(message: &Message, thread: &Thread) -> Vec<String> {
    let mut lines = Vec::new();
    for line in markup::render_lines(&message.body) {
        let cited = cited_id(&line).and_then(|id| thread.find(id));
        lines.push(line);
        if let Some(parent) = cited {
            lines.extend(indent(markup::render_lines(&parent.body)));
        }
    }
    lines
}

/// Numeric id cited at the start of `line`, if any.
pub fn cited_id(line: &str) -> Option<u64> {
    let rest = line.strip_prefix(QUOTE_MARKER)?;
    let token = rest.split_whitespace().next()?;
    token.parse().ok()
}

fn indent(lines: Vec<String>) -> impl Iterator<Item = String> {
    lines
        .into_iter()
        .map(|line| format!("{QUOTE_INDENT}{line}"))
}
