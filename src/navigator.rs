//! The viewer state machine.
//!
//! [`ViewerState::update`] consumes the current state and one [`Event`] and
//! returns the next state plus the side effects the control loop must carry
//! out. Nothing in here performs I/O.

use tracing::{debug, warn};

use crate::coordinator::Viewport;
use crate::feed::{Catalog, Message, Thread};
use crate::search::SearchFilter;

const NO_MEDIA: &str = "no media";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Catalog,
    Thread,
}

/// The list currently on screen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Listing {
    Catalog(Catalog),
    Thread(Thread),
}

impl Listing {
    pub fn mode(&self) -> Mode {
        match self {
            Listing::Catalog(_) => Mode::Catalog,
            Listing::Thread(_) => Mode::Thread,
        }
    }

    pub fn board(&self) -> &str {
        match self {
            Listing::Catalog(catalog) => &catalog.board,
            Listing::Thread(thread) => &thread.board,
        }
    }

    pub fn messages(&self) -> &[Message] {
        match self {
            Listing::Catalog(catalog) => &catalog.messages,
            Listing::Thread(thread) => &thread.messages,
        }
    }

    /// Id of the open topic; `None` in catalog mode.
    pub fn topic_id(&self) -> Option<u64> {
        match self {
            Listing::Catalog(_) => None,
            Listing::Thread(thread) => thread.topic_id(),
        }
    }
}

/// Keys the navigator understands, already decoded from the terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Esc,
    Backspace,
    Up,
    Down,
    PageUp,
    PageDown,
    Redraw,
}

#[derive(Clone, Debug)]
pub enum Event {
    Key(Key),
    Resize(Viewport),
    /// Result of a `Fetch::Catalog`; `focus` is the topic to select.
    CatalogLoaded {
        catalog: Catalog,
        focus: Option<u64>,
    },
    ThreadLoaded(Thread),
    Reloaded(Listing),
    Refreshed(Thread),
    RefreshTick,
    /// A fetch failed without ending the session.
    FetchFailed(String),
    Notice(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fetch {
    Catalog { board: String, focus: Option<u64> },
    Thread { board: String, topic: u64 },
    Reload { board: String, topic: Option<u64> },
    Refresh { board: String, topic: u64 },
}

impl Fetch {
    /// Background refreshes are silent; everything else is user initiated.
    pub fn is_background(&self) -> bool {
        matches!(self, Fetch::Refresh { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    Fetch(Fetch),
    ClearThreadMedia(Vec<Message>),
    SaveMedia { message: Message, subject: String },
    CopyUrl(Message),
    PlayLinks(Thread),
    Redraw,
    Quit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewerState {
    listing: Listing,
    cursor: usize,
    pending_count: usize,
    searching: bool,
    search: SearchFilter,
    show_body: bool,
    viewport: Viewport,
    min_media_height: u16,
    refreshed: bool,
    new_posts: usize,
    loading: bool,
    status: Option<String>,
}

impl ViewerState {
    /// Fresh state for a newly loaded listing. Threads open at their last
    /// message, catalogs at the top.
    pub fn new(listing: Listing, viewport: Viewport, min_media_height: u16) -> Self {
        let cursor = match listing.mode() {
            Mode::Catalog => 0,
            Mode::Thread => listing.messages().len().saturating_sub(1),
        };
        Self {
            listing,
            cursor,
            pending_count: 0,
            searching: false,
            search: SearchFilter::default(),
            show_body: false,
            viewport,
            min_media_height,
            refreshed: false,
            new_posts: 0,
            loading: false,
            status: None,
        }
    }

    pub fn listing(&self) -> &Listing {
        &self.listing
    }

    pub fn mode(&self) -> Mode {
        self.listing.mode()
    }

    pub fn board(&self) -> &str {
        self.listing.board()
    }

    pub fn messages(&self) -> &[Message] {
        self.listing.messages()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn pending_count(&self) -> usize {
        self.pending_count
    }

    pub fn searching(&self) -> bool {
        self.searching
    }

    pub fn search(&self) -> &SearchFilter {
        &self.search
    }

    pub fn show_body(&self) -> bool {
        self.show_body
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn min_media_height(&self) -> u16 {
        self.min_media_height
    }

    /// Too short for anything but the list.
    pub fn is_short(&self) -> bool {
        self.viewport.height < self.min_media_height
    }

    /// Posts that arrived with the last background refresh, if the reader
    /// was caught up when it happened.
    pub fn new_posts(&self) -> Option<usize> {
        (self.refreshed && self.new_posts > 0).then_some(self.new_posts)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Number of rows the cursor moves over.
    pub fn effective_len(&self) -> usize {
        self.search.effective_len(self.messages().len())
    }

    /// Messages in display order, after filtering.
    pub fn effective_messages(&self) -> Vec<&Message> {
        let messages = self.messages();
        if self.search.is_active() {
            self.search
                .matches()
                .iter()
                .filter_map(|&idx| messages.get(idx))
                .collect()
        } else {
            messages.iter().collect()
        }
    }

    pub fn selected(&self) -> Option<&Message> {
        let idx = self.search.resolve(self.cursor, self.messages().len())?;
        self.messages().get(idx)
    }

    pub fn update(mut self, event: Event) -> (ViewerState, Vec<Effect>) {
        let effects = self.apply(event);
        (self, effects)
    }

    fn apply(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Key(key) => self.on_key(key),
            Event::Resize(viewport) => {
                self.viewport = viewport;
                Vec::new()
            }
            Event::CatalogLoaded { catalog, focus } => self.enter_catalog(catalog, focus),
            Event::ThreadLoaded(thread) => self.enter_thread(thread),
            Event::Reloaded(listing) => self.reloaded(listing),
            Event::Refreshed(thread) => self.apply_refresh(thread),
            Event::RefreshTick => self.refresh_tick(),
            Event::FetchFailed(reason) => {
                self.loading = false;
                self.status = Some(reason);
                Vec::new()
            }
            Event::Notice(text) => {
                self.status = Some(text);
                Vec::new()
            }
        }
    }

    fn on_key(&mut self, key: Key) -> Vec<Effect> {
        self.refreshed = false;
        self.status = None;

        if self.searching {
            self.on_search_key(key);
            return Vec::new();
        }

        if let Key::Char(ch) = key {
            if let Some(digit) = ch.to_digit(10) {
                self.pending_count = self
                    .pending_count
                    .saturating_mul(10)
                    .saturating_add(digit as usize);
                return Vec::new();
            }
        }

        let count = std::mem::take(&mut self.pending_count);
        let mode = self.mode();
        match (key, mode) {
            (Key::Enter, Mode::Catalog) => self.open_selected(),
            (Key::Char('h'), Mode::Thread) => self.back_to_catalog(),
            (Key::Char('q') | Key::Esc, _) => vec![Effect::Quit],
            (Key::Char('/'), Mode::Catalog) => {
                self.searching = true;
                Vec::new()
            }
            (Key::Char('p'), Mode::Thread) => match &self.listing {
                Listing::Thread(thread) => vec![Effect::PlayLinks(thread.clone())],
                Listing::Catalog(_) => Vec::new(),
            },
            (Key::Char('y'), _) => match self.selected() {
                Some(message) if message.attachment.is_some() => {
                    vec![Effect::CopyUrl(message.clone())]
                }
                Some(_) => {
                    self.status = Some(NO_MEDIA.to_string());
                    Vec::new()
                }
                None => Vec::new(),
            },
            (Key::Char('r'), _) => self.reload(),
            (Key::Char('s'), _) => {
                let mut effects = Vec::new();
                match self.selected() {
                    Some(message) if message.attachment.is_some() => {
                        effects.push(Effect::SaveMedia {
                            message: message.clone(),
                            subject: self.save_subject(),
                        });
                    }
                    Some(_) => self.status = Some(NO_MEDIA.to_string()),
                    None => {}
                }
                self.move_by(1, count);
                effects
            }
            (Key::Redraw, _) => vec![Effect::Redraw],
            (Key::Char(' '), _) => {
                self.show_body = !self.show_body;
                Vec::new()
            }
            (Key::Char('j') | Key::Down, _) => {
                self.move_by(1, count);
                Vec::new()
            }
            (Key::Char('k') | Key::Up, _) => {
                self.move_by(-1, count);
                Vec::new()
            }
            (Key::PageDown, _) => {
                self.move_by(self.page_distance(), count);
                Vec::new()
            }
            (Key::PageUp, _) => {
                self.move_by(-self.page_distance(), count);
                Vec::new()
            }
            (Key::Char('g'), _) => {
                self.jump_to(count.saturating_sub(1));
                Vec::new()
            }
            (Key::Char('G'), _) => {
                self.jump_to(usize::MAX);
                Vec::new()
            }
            (other, _) => {
                debug!(?other, "unhandled key");
                Vec::new()
            }
        }
    }

    fn on_search_key(&mut self, key: Key) {
        match key {
            Key::Esc | Key::Enter => self.searching = false,
            Key::Backspace => {
                let messages = self.listing.messages();
                if self.search.pop(messages) {
                    self.cursor = 0;
                } else {
                    self.searching = false;
                }
            }
            Key::Char(ch) => {
                let messages = self.listing.messages();
                self.search.push(ch, messages);
                self.cursor = 0;
            }
            _ => {}
        }
    }

    fn open_selected(&mut self) -> Vec<Effect> {
        if self.loading {
            return Vec::new();
        }
        let Some(topic) = self.selected().map(|message| message.id) else {
            return Vec::new();
        };
        self.loading = true;
        self.status = Some(format!("loading /{}/{}", self.board(), topic));
        vec![Effect::Fetch(Fetch::Thread {
            board: self.board().to_string(),
            topic,
        })]
    }

    fn back_to_catalog(&mut self) -> Vec<Effect> {
        if self.loading {
            return Vec::new();
        }
        self.loading = true;
        self.status = Some(format!("loading /{}/", self.board()));
        vec![
            Effect::ClearThreadMedia(self.messages().to_vec()),
            Effect::Fetch(Fetch::Catalog {
                board: self.board().to_string(),
                focus: self.listing.topic_id(),
            }),
        ]
    }

    fn reload(&mut self) -> Vec<Effect> {
        if self.loading {
            return Vec::new();
        }
        self.loading = true;
        vec![Effect::Fetch(Fetch::Reload {
            board: self.board().to_string(),
            topic: self.listing.topic_id(),
        })]
    }

    fn refresh_tick(&mut self) -> Vec<Effect> {
        if self.loading {
            return Vec::new();
        }
        match self.listing.topic_id() {
            Some(topic) => vec![Effect::Fetch(Fetch::Refresh {
                board: self.board().to_string(),
                topic,
            })],
            None => Vec::new(),
        }
    }

    fn enter_thread(&mut self, thread: Thread) -> Vec<Effect> {
        if self.mode() != Mode::Catalog {
            debug!("dropping thread load outside catalog");
            return Vec::new();
        }
        debug!(board = %thread.board, topic = ?thread.topic_id(), "enter thread");
        *self = ViewerState::new(
            Listing::Thread(thread),
            self.viewport,
            self.min_media_height,
        );
        Vec::new()
    }

    fn enter_catalog(&mut self, catalog: Catalog, focus: Option<u64>) -> Vec<Effect> {
        if self.mode() != Mode::Thread {
            debug!("dropping catalog load outside thread");
            return Vec::new();
        }
        let cursor = focus
            .and_then(|id| catalog.position(id))
            .unwrap_or(0);
        debug!(board = %catalog.board, cursor, "enter catalog");
        *self = ViewerState::new(
            Listing::Catalog(catalog),
            self.viewport,
            self.min_media_height,
        );
        self.cursor = cursor;
        Vec::new()
    }

    fn reloaded(&mut self, listing: Listing) -> Vec<Effect> {
        self.loading = false;
        if listing.mode() != self.mode()
            || listing.board() != self.board()
            || listing.topic_id() != self.listing.topic_id()
        {
            debug!("dropping stale reload");
            return Vec::new();
        }
        self.listing = listing;
        self.search.clear();
        self.searching = false;
        self.clamp_cursor();
        Vec::new()
    }

    fn apply_refresh(&mut self, thread: Thread) -> Vec<Effect> {
        let topic = self.listing.topic_id();
        if self.loading || topic.is_none() || thread.topic_id() != topic {
            debug!("dropping stale refresh");
            return Vec::new();
        }
        let caught_up = self.cursor + 1 >= self.messages().len();
        self.listing = Listing::Thread(thread);
        self.clamp_cursor();
        let last = self.messages().len().saturating_sub(1);
        self.new_posts = last.saturating_sub(self.cursor);
        self.refreshed = caught_up && self.new_posts > 0;
        Vec::new()
    }

    fn save_subject(&self) -> String {
        match &self.listing {
            Listing::Thread(thread) => thread.subject().to_string(),
            Listing::Catalog(_) => self
                .selected()
                .map(|message| message.subject_text().to_string())
                .unwrap_or_default(),
        }
    }

    fn page_distance(&self) -> i64 {
        let half = i64::from(self.viewport.height / 2);
        let distance = if self.is_short() { half } else { half * 2 };
        distance.max(1)
    }

    /// Move `step` rows (times `count` when one is pending), wrapping at
    /// both ends of the effective list.
    fn move_by(&mut self, step: i64, count: usize) {
        let len = self.effective_len();
        if len == 0 {
            warn!("move on empty list");
            return;
        }
        self.cursor = wrap_cursor(self.cursor, len, scaled(step, count));
    }

    fn jump_to(&mut self, idx: usize) {
        let len = self.effective_len();
        if len == 0 {
            warn!("jump on empty list");
            return;
        }
        self.cursor = idx.min(len - 1);
    }

    fn clamp_cursor(&mut self) {
        let len = self.effective_len();
        self.cursor = self.cursor.min(len.saturating_sub(1));
    }
}

/// `step` multiplied by a pending repeat count; zero means no count.
pub fn scaled(step: i64, count: usize) -> i64 {
    let factor = i64::try_from(count).unwrap_or(i64::MAX).max(1);
    step.saturating_mul(factor)
}

/// Cursor after moving `delta` rows in a list of `len` rows. Overshooting
/// the end lands on the first row, undershooting the start on the last.
pub fn wrap_cursor(cursor: usize, len: usize, delta: i64) -> usize {
    let last = len.saturating_sub(1) as i64;
    let target = (cursor as i64).saturating_add(delta);
    if target > last {
        0
    } else if target < 0 {
        last as usize
    } else {
        target as usize
    }
}
