//! Turns a [`ViewerState`] into a plain layout description. The UI draws
//! whatever comes out of [`compose`]; no state is touched here.

use std::ops::Range;

use chrono::DateTime;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::coordinator::{self, MediaState};
use crate::feed::Message;
use crate::markup;
use crate::navigator::{Listing, Mode, ViewerState};
use crate::quote;
use crate::window;

#[derive(Debug, Clone)]
pub struct ComposeConfig {
    /// Columns reserved for borders and the cursor marker.
    pub chrome_width: u16,
    pub site_base: String,
    pub media_base: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Board name or thread subject, plus new-post and search hints.
    pub title: String,
    /// URL-shaped location and position counter.
    pub locator: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRow {
    pub text: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub header: Header,
    pub rows: Vec<ListRow>,
    /// Text for the lower pane. `None` leaves the pane to media, or hides
    /// it entirely in single-pane layouts.
    pub body: Option<Vec<String>>,
    pub single_pane: bool,
    pub no_matches: bool,
    pub status: Option<String>,
}

/// Height of the list pane, borders included. A single-pane layout gives
/// the list everything except the header and status rows.
pub fn list_pane_height(height: u16, single_pane: bool) -> u16 {
    if single_pane {
        height.saturating_sub(2)
    } else {
        (height / 2 + 2).min(height.saturating_sub(2))
    }
}

/// Rows that fit inside the list pane.
pub fn list_capacity(height: u16, single_pane: bool) -> usize {
    let pane = list_pane_height(height, single_pane);
    let inner = if single_pane {
        pane
    } else {
        pane.saturating_sub(2)
    };
    usize::from(inner.max(1))
}

pub fn compose(state: &ViewerState, width: u16, height: u16, cfg: &ComposeConfig) -> View {
    let single_pane = state.is_short();
    let status = state.status().map(str::to_string);
    let visible = state.effective_messages();

    if visible.is_empty() {
        return View {
            header: header(state, None, cfg),
            rows: Vec::new(),
            body: None,
            single_pane,
            no_matches: state.search().is_active(),
            status,
        };
    }

    let cursor = state.cursor().min(visible.len() - 1);
    let margin = scroll_margin(height, single_pane);
    let range = window::fit_window(cursor, visible.len(), margin, height);
    let range = clamp_window(range, cursor, list_capacity(height, single_pane));
    let limit = usize::from(width.saturating_sub(cfg.chrome_width));
    let current = visible[cursor];

    let rows = visible[range.clone()]
        .iter()
        .enumerate()
        .map(|(offset, message)| {
            let selected = range.start + offset == cursor;
            let marker = if selected { '>' } else { ' ' };
            let label = row_label(state.mode(), message, &cfg.media_base);
            ListRow {
                text: truncate(&format!("{marker} {label}"), limit),
                selected,
            }
        })
        .collect();

    let body = if single_pane {
        None
    } else {
        let media = coordinator::decide(
            current,
            state.viewport(),
            state.min_media_height(),
            state.show_body(),
        );
        (media == MediaState::ShowingText).then(|| body_lines(state.listing(), current, width))
    };

    View {
        header: header(state, Some(current), cfg),
        rows,
        body,
        single_pane,
        no_matches: false,
        status,
    }
}

/// Rows kept above and below the cursor.
pub fn scroll_margin(height: u16, single_pane: bool) -> usize {
    let height = usize::from(height);
    if single_pane {
        height.saturating_sub(1) / 2
    } else {
        height / 4
    }
}

/// Shrink `range` to `capacity` rows, keeping `cursor` inside.
fn clamp_window(range: Range<usize>, cursor: usize, capacity: usize) -> Range<usize> {
    if range.len() <= capacity {
        return range;
    }
    let start = cursor
        .saturating_sub(capacity / 2)
        .max(range.start)
        .min(range.end - capacity);
    start..start + capacity
}

fn row_label(mode: Mode, message: &Message, media_base: &str) -> String {
    match (mode, message.subject.as_deref()) {
        (Mode::Catalog, Some(subject)) => markup::decode_entities(subject).into_owned(),
        _ => markup::single_line(message, media_base),
    }
}

fn header(state: &ViewerState, current: Option<&Message>, cfg: &ComposeConfig) -> Header {
    let site = cfg.site_base.trim_end_matches('/');
    let total = state.effective_len();
    let counter = match current {
        Some(message) => format!("[{}/{}] {}", state.cursor() + 1, total, message.id),
        None => format!("[0/{total}]"),
    };

    let (mut title, locator) = match state.listing() {
        Listing::Catalog(catalog) => (
            catalog.board.clone(),
            format!("{site}/{} {counter}", catalog.board),
        ),
        Listing::Thread(thread) => {
            let mut title = markup::decode_entities(thread.subject()).into_owned();
            if let Some(count) = state.new_posts() {
                title.push_str(&format!(" [{count} new posts]"));
            }
            let topic = thread.topic_id().unwrap_or_default();
            (title, format!("{site}/{}/thread/{topic} {counter}", thread.board))
        }
    };

    let query = state.search().query();
    if state.searching() {
        if query.is_empty() {
            title.push_str(" [type to start searching]");
        } else {
            title.push(' ');
            title.push_str(query);
        }
    } else if !query.is_empty() {
        title.push_str(&format!(" [{query}]"));
    }

    Header { title, locator }
}

fn body_lines(listing: &Listing, message: &Message, width: u16) -> Vec<String> {
    let mut lines = vec![metadata_line(message)];
    let text = match listing {
        Listing::Thread(thread) => quote::expand(message, thread),
        Listing::Catalog(_) => markup::render_lines(&message.body),
    };
    let wrap_at = usize::from(width.max(1));
    for line in text {
        if UnicodeWidthStr::width(line.as_str()) <= wrap_at {
            lines.push(line);
            continue;
        }
        let content = line.trim_start();
        let indent = &line[..line.len() - content.len()];
        let room = wrap_at.saturating_sub(indent.len()).max(1);
        lines.extend(
            textwrap::wrap(content, room)
                .into_iter()
                .map(|piece| format!("{indent}{piece}")),
        );
    }
    lines
}

fn metadata_line(message: &Message) -> String {
    let mut parts = vec![format!("No.{}", message.id)];
    if !message.author.is_empty() {
        parts.push(markup::decode_entities(&message.author).into_owned());
    }
    if let Some(posted) = DateTime::from_timestamp(message.posted_at, 0).filter(|_| message.posted_at > 0) {
        parts.push(posted.format("%Y-%m-%d %H:%M UTC").to_string());
    }
    if let Some(attachment) = &message.attachment {
        let name = if attachment.filename.is_empty() {
            attachment.timestamp.to_string()
        } else {
            markup::decode_entities(&attachment.filename).into_owned()
        };
        parts.push(format!("{name}{}", attachment.ext));
    }
    parts.join("  ")
}

/// Cut `text` to at most `limit` display columns.
pub fn truncate(text: &str, limit: usize) -> String {
    if UnicodeWidthStr::width(text) <= limit {
        return text.to_string();
    }
    let mut used = 0;
    let mut out = String::new();
    for ch in text.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > limit {
            break;
        }
        used += w;
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Viewport;
    use crate::feed::{Attachment, Catalog, Thread};
    use crate::navigator::{Event, Key};

    fn cfg() -> ComposeConfig {
        ComposeConfig {
            chrome_width: 5,
            site_base: "https://boards.example.org".into(),
            media_base: "https://media.example.org".into(),
        }
    }

    fn message(id: u64, subject: &str, body: &str) -> Message {
        Message {
            id,
            subject: (!subject.is_empty()).then(|| subject.to_string()),
            body: body.to_string(),
            attachment: None,
            board: "g".into(),
            author: "Anonymous".into(),
            posted_at: 0,
        }
    }

    fn catalog_state(n: u64, viewport: Viewport) -> ViewerState {
        let messages = (1..=n)
            .map(|id| message(id, &format!("topic {id}"), &format!("body {id}")))
            .collect();
        ViewerState::new(
            Listing::Catalog(Catalog {
                board: "g".into(),
                messages,
            }),
            viewport,
            50,
        )
    }

    fn press(state: ViewerState, keys: &str) -> ViewerState {
        keys.chars().fold(state, |state, ch| {
            state.update(Event::Key(Key::Char(ch))).0
        })
    }

    #[test]
    fn catalog_header_and_rows() {
        let state = press(catalog_state(20, Viewport::new(80, 60)), "2j");
        let view = compose(&state, 80, 60, &cfg());
        assert_eq!(view.header.title, "g");
        assert_eq!(view.header.locator, "https://boards.example.org/g [3/20] 3");
        assert_eq!(view.rows.len(), 20);
        assert_eq!(view.rows[2].text, "> topic 3");
        assert!(view.rows[2].selected);
        assert_eq!(view.rows[0].text, "  topic 1");
        assert!(!view.single_pane);
    }

    #[test]
    fn short_viewport_is_single_pane_without_body() {
        let state = press(catalog_state(40, Viewport::new(80, 11)), " ");
        let view = compose(&state, 80, 11, &cfg());
        assert!(view.single_pane);
        assert!(view.body.is_none());
        // an 11 row window squeezed between header and status
        assert_eq!(view.rows.len(), 9);
        assert!(view.rows[0].selected);

        let state = press(state, "G");
        let view = compose(&state, 80, 11, &cfg());
        assert_eq!(view.rows.len(), 9);
        assert!(view.rows[8].selected);
        assert_eq!(view.rows[8].text, "> topic 40");
    }

    #[test]
    fn clamped_window_keeps_cursor() {
        assert_eq!(clamp_window(0..11, 0, 9), 0..9);
        assert_eq!(clamp_window(0..11, 10, 9), 2..11);
        assert_eq!(clamp_window(10..21, 15, 5), 13..18);
        assert_eq!(clamp_window(3..6, 4, 9), 3..6);
    }

    #[test]
    fn rows_are_truncated_to_width_minus_chrome() {
        let long = "x".repeat(200);
        let state = ViewerState::new(
            Listing::Catalog(Catalog {
                board: "g".into(),
                messages: vec![message(1, &long, "")],
            }),
            Viewport::new(30, 60),
            50,
        );
        let view = compose(&state, 30, 60, &cfg());
        assert_eq!(UnicodeWidthStr::width(view.rows[0].text.as_str()), 25);
    }

    #[test]
    fn wide_characters_truncate_by_columns() {
        assert_eq!(truncate("日本語テキスト", 5), "日本");
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn no_matches_keeps_query_in_header() {
        let state = press(catalog_state(3, Viewport::new(80, 60)), "/zzz");
        let view = compose(&state, 80, 60, &cfg());
        assert!(view.no_matches);
        assert!(view.rows.is_empty());
        assert_eq!(view.header.title, "g zzz");
        assert_eq!(view.header.locator, "https://boards.example.org/g [0/0]");
    }

    #[test]
    fn applied_filter_is_bracketed() {
        let state = press(catalog_state(3, Viewport::new(80, 60)), "/topic 2");
        let state = state.update(Event::Key(Key::Enter)).0;
        let view = compose(&state, 80, 60, &cfg());
        assert_eq!(view.header.title, "g [topic 2]");
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.header.locator, "https://boards.example.org/g [1/1] 2");
    }

    #[test]
    fn empty_search_prompts() {
        let state = press(catalog_state(3, Viewport::new(80, 60)), "/");
        let view = compose(&state, 80, 60, &cfg());
        assert_eq!(view.header.title, "g [type to start searching]");
    }

    fn thread_state() -> ViewerState {
        let mut op = message(10, "Daily &amp; Thread", "hello");
        op.attachment = Some(Attachment {
            timestamp: 1700000000000,
            ext: ".png".into(),
            filename: "lain".into(),
        });
        let reply = message(
            11,
            "",
            r##"<a href="#p10" class="quotelink">&gt;&gt;10</a><br>nice"##,
        );
        ViewerState::new(
            Listing::Thread(Thread {
                board: "g".into(),
                messages: vec![op, reply],
            }),
            Viewport::new(80, 60),
            50,
        )
    }

    #[test]
    fn thread_header_and_quoted_body() {
        let state = thread_state();
        let view = compose(&state, 80, 60, &cfg());
        assert_eq!(view.header.title, "Daily & Thread");
        assert_eq!(
            view.header.locator,
            "https://boards.example.org/g/thread/10 [2/2] 11"
        );
        let body = view.body.unwrap();
        assert_eq!(body[0], "No.11  Anonymous");
        assert_eq!(&body[1..], [">>10", "    hello", "nice"]);
    }

    #[test]
    fn media_message_leaves_body_to_media() {
        let state = press(thread_state(), "g");
        let view = compose(&state, 80, 60, &cfg());
        assert!(view.body.is_none());

        let state = press(state, " ");
        let body = compose(&state, 80, 60, &cfg()).body.unwrap();
        assert_eq!(body[0], "No.10  Anonymous  lain.png");
        assert_eq!(body[1], "hello");
    }

    #[test]
    fn new_posts_suffix_after_refresh() {
        let state = thread_state();
        let mut grown = match state.listing() {
            Listing::Thread(thread) => thread.clone(),
            Listing::Catalog(_) => unreachable!(),
        };
        grown.messages.push(message(12, "", "late"));
        grown.messages.push(message(13, "", "later"));
        let state = state.update(Event::Refreshed(grown)).0;
        let view = compose(&state, 80, 60, &cfg());
        assert_eq!(view.header.title, "Daily & Thread [2 new posts]");
        assert_eq!(
            view.header.locator,
            "https://boards.example.org/g/thread/10 [2/4] 11"
        );
    }

    #[test]
    fn margins_follow_layout() {
        assert_eq!(scroll_margin(11, true), 5);
        assert_eq!(scroll_margin(60, false), 15);
    }
}
