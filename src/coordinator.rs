//! Decides whether the selected message shows text or media, and keeps
//! asynchronous render results from landing on the wrong message.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::feed::Message;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaState {
    ShowingText,
    ShowingMedia,
    /// Viewport too small for anything but the list.
    Suppressed,
}

/// Terminal size in cells.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Viewport {
    pub width: u16,
    pub height: u16,
}

impl Viewport {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }
}

/// Apply the display rules in priority order.
pub fn decide(
    message: &Message,
    viewport: Viewport,
    min_height: u16,
    show_body: bool,
) -> MediaState {
    if viewport.height < min_height {
        MediaState::Suppressed
    } else if message.attachment.is_none() {
        MediaState::ShowingText
    } else if !message.has_body() || !show_body {
        MediaState::ShowingMedia
    } else {
        MediaState::ShowingText
    }
}

/// Identifies which selection a render task was started for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderTicket {
    pub message_id: u64,
    pub generation: u64,
}

#[derive(Clone, Debug)]
pub struct RenderRequest {
    pub ticket: RenderTicket,
    pub message: Message,
    pub viewport: Viewport,
    pub cancel: Arc<AtomicBool>,
}

/// What the coordinator last evaluated; a change triggers re-evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SyncKey {
    message_id: Option<u64>,
    viewport: Viewport,
    show_body: bool,
    epoch: u64,
}

#[derive(Debug)]
pub struct MediaCoordinator {
    min_height: u16,
    generation: u64,
    epoch: u64,
    last: Option<SyncKey>,
    state: Option<MediaState>,
    current: Option<RenderTicket>,
    in_flight: Option<Arc<AtomicBool>>,
}

/// Outcome of a [`MediaCoordinator::sync`] call.
#[derive(Debug)]
pub enum SyncAction {
    /// Nothing relevant changed.
    Unchanged,
    /// Any image on screen is stale and must be removed.
    Clear,
    /// Clear the screen region, then start this render.
    Render(RenderRequest),
}

impl MediaCoordinator {
    pub fn new(min_height: u16) -> Self {
        Self {
            min_height,
            generation: 0,
            epoch: 0,
            last: None,
            state: None,
            current: None,
            in_flight: None,
        }
    }

    pub fn state(&self) -> Option<MediaState> {
        self.state
    }

    pub fn min_height(&self) -> u16 {
        self.min_height
    }

    /// Force the next `sync` to re-evaluate, e.g. after a full redraw or
    /// a mode transition.
    pub fn invalidate(&mut self) {
        self.epoch += 1;
    }

    /// Re-derive the media state for the current selection.
    pub fn sync(
        &mut self,
        message: Option<&Message>,
        viewport: Viewport,
        show_body: bool,
    ) -> SyncAction {
        let key = SyncKey {
            message_id: message.map(|m| m.id),
            viewport,
            show_body,
            epoch: self.epoch,
        };
        if self.last == Some(key) {
            return SyncAction::Unchanged;
        }
        self.last = Some(key);
        self.cancel_in_flight();
        self.current = None;

        let Some(message) = message else {
            self.state = None;
            return SyncAction::Clear;
        };

        let state = decide(message, viewport, self.min_height, show_body);
        self.state = Some(state);
        if state != MediaState::ShowingMedia {
            return SyncAction::Clear;
        }

        self.generation += 1;
        let ticket = RenderTicket {
            message_id: message.id,
            generation: self.generation,
        };
        let cancel = Arc::new(AtomicBool::new(false));
        self.current = Some(ticket);
        self.in_flight = Some(cancel.clone());
        debug!(post = message.id, generation = self.generation, "render requested");
        SyncAction::Render(RenderRequest {
            ticket,
            message: message.clone(),
            viewport,
            cancel,
        })
    }

    /// Whether a finished render still targets the current selection.
    pub fn accepts(&self, ticket: RenderTicket) -> bool {
        self.current == Some(ticket)
    }

    /// Mark the task behind `ticket` as done.
    pub fn complete(&mut self, ticket: RenderTicket) {
        if self.current == Some(ticket) {
            self.in_flight = None;
        }
    }

    /// Cancel any outstanding render and drop its result, e.g. on quit or
    /// before a thread's cached media is removed.
    pub fn shutdown(&mut self) {
        self.cancel_in_flight();
        self.current = None;
    }

    fn cancel_in_flight(&mut self) {
        if let Some(flag) = self.in_flight.take() {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

/// Where a finished render will read its image from.
pub fn media_path(cache_dir: &std::path::Path, message: &Message) -> Option<PathBuf> {
    message.media_key().map(|key| cache_dir.join(key))
}
