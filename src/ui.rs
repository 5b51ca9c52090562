use std::io::{self, Stdout, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, tick, unbounded, Receiver, Sender};
use crossterm::event::{self, Event as TermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::Print;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, List, ListItem, Paragraph};
use ratatui::{Frame, Terminal};
use tracing::{debug, info, warn};
use unicode_width::UnicodeWidthStr;

use crate::compose::{self, ComposeConfig, ListRow, View};
use crate::coordinator::{MediaCoordinator, RenderRequest, RenderTicket, SyncAction, Viewport};
use crate::data::{self, FeedSource};
use crate::error::{FeedError, RenderError};
use crate::feed::{Board, Catalog, Message, Thread};
use crate::graphics::{self, KittyImage, Region};
use crate::media;
use crate::navigator::{Effect, Event, Fetch, Key, Listing, Mode, ViewerState};
use crate::picker::{BoardPicker, PickerOutcome};
use crate::video;

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_SELECTED_BG: Color = Color::Rgb(69, 71, 90);
const COLOR_BORDER: Color = Color::Rgb(88, 91, 112);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_QUOTE: Color = Color::Rgb(166, 227, 161);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What the session opens with.
pub enum Start {
    Picker(Vec<Board>),
    Viewer(Listing),
}

pub struct Options {
    pub start: Start,
    pub feed: Arc<dyn FeedSource>,
    pub media: Arc<media::Manager>,
    pub compose: ComposeConfig,
    pub min_media_height: u16,
    pub max_image_px: u32,
    pub refresh_interval: Duration,
    pub save_dir: Option<PathBuf>,
    pub player_command: Vec<String>,
}

enum AsyncResponse {
    Fetched {
        fetch: Fetch,
        result: Result<Event, FeedError>,
    },
    BoardOpened {
        board: String,
        result: Result<Catalog, FeedError>,
    },
    Rendered {
        ticket: RenderTicket,
        result: Result<Option<KittyImage>>,
    },
    Notice(String),
    RefreshTick,
}

/// Background timer feeding `RefreshTick` into the control loop.
struct Refresher {
    stop: Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Refresher {
    fn start(interval: Duration, tx: Sender<AsyncResponse>) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::spawn(move || {
            let ticker = tick(interval);
            loop {
                crossbeam_channel::select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticker) -> _ => {
                        if tx.send(AsyncResponse::RefreshTick).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Self {
            stop: stop_tx,
            handle: Some(handle),
        }
    }

    fn stop(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ActiveImage {
    id: u32,
    delete: String,
}

struct Panes {
    header: Rect,
    list: Rect,
    lower: Option<Rect>,
    status: Rect,
}

pub struct Model {
    picker: Option<BoardPicker>,
    viewer: Option<ViewerState>,
    feed: Arc<dyn FeedSource>,
    media: Arc<media::Manager>,
    compose_cfg: ComposeConfig,
    coordinator: MediaCoordinator,
    min_media_height: u16,
    max_image_px: u32,
    refresh_interval: Duration,
    save_dir: Option<PathBuf>,
    player_command: Vec<String>,
    graphics: bool,
    size: Viewport,
    status: Option<String>,
    opening: bool,
    pending_image: Option<KittyImage>,
    active_image: Option<ActiveImage>,
    pending_deletes: Vec<String>,
    needs_redraw: bool,
    full_clear: bool,
    quit: bool,
    fatal: Option<anyhow::Error>,
    refresher: Option<Refresher>,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
}

impl Model {
    pub fn new(opts: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        let mut model = Self {
            picker: None,
            viewer: None,
            feed: opts.feed,
            media: opts.media,
            compose_cfg: opts.compose,
            coordinator: MediaCoordinator::new(opts.min_media_height),
            min_media_height: opts.min_media_height,
            max_image_px: opts.max_image_px,
            refresh_interval: opts.refresh_interval,
            save_dir: opts.save_dir,
            player_command: opts.player_command,
            graphics: graphics::graphics_supported(),
            size: Viewport::default(),
            status: None,
            opening: false,
            pending_image: None,
            active_image: None,
            pending_deletes: Vec::new(),
            needs_redraw: true,
            full_clear: false,
            quit: false,
            fatal: None,
            refresher: None,
            response_tx,
            response_rx,
        };
        match opts.start {
            Start::Picker(boards) => model.picker = Some(BoardPicker::new(boards)),
            Start::Viewer(listing) => model.open_viewer(listing),
        }
        model
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);
        self.shutdown(terminal.backend_mut());

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let area = terminal.size()?;
        self.resize(area.width, area.height);

        loop {
            self.poll_async();
            if let Some(err) = self.fatal.take() {
                return Err(err);
            }
            if self.quit {
                break;
            }

            if self.needs_redraw {
                if self.full_clear {
                    terminal.clear()?;
                    self.full_clear = false;
                }
                terminal.draw(|frame| self.draw(frame))?;
                self.flush_inline_images(terminal.backend_mut())?;
                self.needs_redraw = false;
            }

            if event::poll(POLL_INTERVAL)? {
                match event::read()? {
                    TermEvent::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key),
                    TermEvent::Resize(width, height) => self.resize(width, height),
                    _ => {}
                }
            }
        }

        Ok(())
    }

    fn shutdown(&mut self, backend: &mut CrosstermBackend<Stdout>) {
        self.release();
        if let Err(err) = self.flush_deletes(backend) {
            warn!(error = %err, "delete inline image");
        }
        info!("session closed");
    }

    /// Stop background work and drop the media cache. The image delete is
    /// left queued for the caller to flush.
    fn release(&mut self) {
        self.coordinator.shutdown();
        if let Some(mut refresher) = self.refresher.take() {
            refresher.stop();
        }
        self.pending_image = None;
        self.queue_active_delete();
        self.media.close();
    }

    fn open_viewer(&mut self, listing: Listing) {
        info!(board = listing.board(), mode = ?listing.mode(), "viewer opened");
        self.viewer = Some(ViewerState::new(
            listing,
            self.size,
            self.min_media_height,
        ));
        if self.refresher.is_none() {
            self.refresher = Some(Refresher::start(
                self.refresh_interval,
                self.response_tx.clone(),
            ));
        }
        self.sync_media();
    }

    fn resize(&mut self, width: u16, height: u16) {
        self.size = Viewport::new(width, height);
        if self.viewer.is_some() {
            self.dispatch(Event::Resize(self.size));
        }
        self.needs_redraw = true;
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.quit = true;
            return;
        }
        let Some(key) = map_key(key) else {
            return;
        };
        if self.picker.is_some() {
            self.handle_picker_key(key);
        } else {
            self.dispatch(Event::Key(key));
        }
        self.needs_redraw = true;
    }

    fn handle_picker_key(&mut self, key: Key) {
        let page = usize::from(self.size.height / 2);
        let Some(picker) = self.picker.as_mut() else {
            return;
        };
        match picker.handle(key, page) {
            PickerOutcome::Pending => {}
            PickerOutcome::Quit => self.quit = true,
            PickerOutcome::Open(board) => {
                if self.opening {
                    return;
                }
                self.opening = true;
                self.status = Some(format!("loading /{board}/"));
                let feed = self.feed.clone();
                let tx = self.response_tx.clone();
                thread::spawn(move || {
                    let result = feed.fetch_catalog(&board);
                    let _ = tx.send(AsyncResponse::BoardOpened { board, result });
                });
            }
        }
    }

    fn dispatch(&mut self, event: Event) {
        let Some(state) = self.viewer.take() else {
            return;
        };
        let (next, effects) = state.update(event);
        self.viewer = Some(next);
        for effect in effects {
            self.perform(effect);
        }
        self.sync_media();
        self.needs_redraw = true;
    }

    fn perform(&mut self, effect: Effect) {
        match effect {
            Effect::Fetch(fetch) => self.spawn_fetch(fetch),
            Effect::ClearThreadMedia(messages) => {
                self.coordinator.shutdown();
                let media = self.media.clone();
                thread::spawn(move || media.clear_thread(&messages));
            }
            Effect::SaveMedia { message, subject } => self.save_media(message, subject),
            Effect::CopyUrl(message) => self.copy_url(&message),
            Effect::PlayLinks(thread) => self.play_links(&thread),
            Effect::Redraw => {
                self.full_clear = true;
                self.pending_image = None;
                self.queue_active_delete();
                self.coordinator.invalidate();
            }
            Effect::Quit => self.quit = true,
        }
    }

    fn poll_async(&mut self) {
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle_async_response(message);
            self.needs_redraw = true;
        }
    }

    fn handle_async_response(&mut self, message: AsyncResponse) {
        match message {
            AsyncResponse::Fetched { fetch, result } => match result {
                Ok(event) => self.dispatch(event),
                Err(err) if fetch.is_background() => {
                    warn!(error = %err, "background refresh failed");
                }
                Err(err) if err.kind().is_fatal() => {
                    warn!(error = %err, kind = %err.kind(), "fetch failed");
                    self.fatal = Some(anyhow::Error::new(err).context(describe_fetch(&fetch)));
                }
                Err(err) => self.dispatch(Event::FetchFailed(err.to_string())),
            },
            AsyncResponse::BoardOpened { board, result } => {
                self.opening = false;
                match result {
                    Ok(catalog) => {
                        self.picker = None;
                        self.status = None;
                        self.open_viewer(Listing::Catalog(catalog));
                    }
                    Err(err) => {
                        self.fatal = Some(anyhow::Error::new(err).context(format!("open /{board}/")));
                    }
                }
            }
            AsyncResponse::Rendered { ticket, result } => {
                if !self.coordinator.accepts(ticket) {
                    debug!(post = ticket.message_id, generation = ticket.generation, "stale render dropped");
                    return;
                }
                self.coordinator.complete(ticket);
                match result {
                    Ok(Some(image)) => self.pending_image = Some(image),
                    Ok(None) => {}
                    Err(err) => match err.downcast_ref::<RenderError>() {
                        Some(render) => {
                            warn!(post = ticket.message_id, kind = %render.kind(), error = %render, "media skipped")
                        }
                        None => warn!(post = ticket.message_id, error = %err, "media unavailable"),
                    },
                }
            }
            AsyncResponse::Notice(text) => {
                if self.viewer.is_some() {
                    self.dispatch(Event::Notice(text));
                } else {
                    self.status = Some(text);
                }
            }
            AsyncResponse::RefreshTick => self.dispatch(Event::RefreshTick),
        }
    }

    fn spawn_fetch(&self, fetch: Fetch) {
        debug!(?fetch, "fetch");
        let feed = self.feed.clone();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = data::load(feed.as_ref(), &fetch);
            let _ = tx.send(AsyncResponse::Fetched { fetch, result });
        });
    }

    /// Re-derive text/media for the selection. Typing a search query never
    /// triggers media work; leaving search does.
    fn sync_media(&mut self) {
        let Some(state) = self.viewer.as_ref() else {
            return;
        };
        if state.searching() {
            return;
        }
        let action = self
            .coordinator
            .sync(state.selected(), self.size, state.show_body());
        match action {
            SyncAction::Unchanged => {}
            SyncAction::Clear => {
                self.pending_image = None;
                self.queue_active_delete();
            }
            SyncAction::Render(request) => {
                self.pending_image = None;
                self.queue_active_delete();
                self.spawn_render(request);
            }
        }
    }

    fn spawn_render(&self, request: RenderRequest) {
        if !self.graphics {
            return;
        }
        let Some(area) = self.media_area() else {
            return;
        };
        let region = Region {
            cols: area.width,
            rows: area.height,
        };
        let RenderRequest {
            ticket,
            message,
            cancel,
            ..
        } = request;
        let handle = self.media.handle();
        let media_base = self.compose_cfg.media_base.clone();
        let max_px = self.max_image_px;
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = render_media(
                &handle,
                &message,
                &media_base,
                region,
                max_px,
                image_id(ticket),
                &cancel,
            );
            let _ = tx.send(AsyncResponse::Rendered { ticket, result });
        });
    }

    fn save_media(&mut self, message: Message, subject: String) {
        let Some(root) = self.save_dir.clone() else {
            self.notice("no save directory configured".to_string());
            return;
        };
        let Some(request) = media::Request::for_message(&message, &self.compose_cfg.media_base)
        else {
            return;
        };
        let folder = media::folder_name(&subject, &message.board);
        let handle = self.media.handle();
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let text = match handle
                .fetch(request)
                .and_then(|cached| media::save_copy(&cached, &root, &folder))
            {
                Ok(path) => format!("saved {}", path.display()),
                Err(err) => {
                    warn!(error = %err, "save media");
                    format!("save failed: {err}")
                }
            };
            let _ = tx.send(AsyncResponse::Notice(text));
        });
    }

    fn copy_url(&mut self, message: &Message) {
        let Some(url) = message.media_url(&self.compose_cfg.media_base) else {
            return;
        };
        let text = match arboard::Clipboard::new().and_then(|mut clipboard| clipboard.set_text(url.clone())) {
            Ok(()) => format!("copied {url}"),
            Err(err) => {
                warn!(error = %err, "clipboard");
                format!("clipboard unavailable: {err}")
            }
        };
        self.notice(text);
    }

    fn play_links(&mut self, thread: &Thread) {
        let links = video::collect_links(thread, &self.compose_cfg.media_base);
        let text = match video::spawn_player(&self.player_command, &links) {
            Ok(()) => format!("playing {} links", links.len()),
            Err(err) => {
                warn!(error = %err, "player");
                err.to_string()
            }
        };
        self.notice(text);
    }

    fn notice(&mut self, text: String) {
        self.dispatch(Event::Notice(text));
    }

    fn queue_active_delete(&mut self) {
        if let Some(active) = self.active_image.take() {
            debug!(id = active.id, "delete inline image");
            self.pending_deletes.push(active.delete);
        }
    }

    fn flush_deletes(&mut self, backend: &mut CrosstermBackend<Stdout>) -> io::Result<()> {
        if self.pending_deletes.is_empty() {
            return Ok(());
        }
        for sequence in self.pending_deletes.drain(..) {
            crossterm::queue!(backend, Print(sequence))?;
        }
        backend.flush()
    }

    /// Only the control loop writes image data, so two renders can never
    /// interleave on screen.
    fn flush_inline_images(&mut self, backend: &mut CrosstermBackend<Stdout>) -> Result<()> {
        self.flush_deletes(backend)?;
        let Some(image) = self.pending_image.take() else {
            return Ok(());
        };
        let Some(area) = self.media_area() else {
            return Ok(());
        };
        image.draw(backend, area.x, area.y)?;
        self.active_image = Some(ActiveImage {
            id: image.id(),
            delete: image.delete_sequence(),
        });
        Ok(())
    }

    fn media_area(&self) -> Option<Rect> {
        let single = self.size.height < self.min_media_height;
        let area = Rect::new(0, 0, self.size.width, self.size.height);
        panes(area, single)
            .lower
            .filter(|rect| rect.width > 0 && rect.height > 0)
    }

    fn draw(&self, frame: &mut Frame<'_>) {
        let area = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), area);

        if let Some(picker) = &self.picker {
            self.draw_picker(frame, area, picker);
        } else if let Some(state) = &self.viewer {
            let view = compose::compose(state, area.width, area.height, &self.compose_cfg);
            self.draw_view(frame, area, state, &view);
        }
    }

    fn draw_picker(&self, frame: &mut Frame<'_>, area: Rect, picker: &BoardPicker) {
        let panes = panes(area, true);
        draw_header(frame, panes.header, &picker.title(), "", false);
        let rows = picker.rows(
            usize::from(area.width.saturating_sub(self.compose_cfg.chrome_width)),
            panes.list.height,
        );
        frame.render_widget(list_widget(&rows, None), panes.list);
        let status = self
            .status
            .clone()
            .unwrap_or_else(|| "j/k move  / search  enter open  q quit".to_string());
        draw_status(frame, panes.status, &status);
    }

    fn draw_view(&self, frame: &mut Frame<'_>, area: Rect, state: &ViewerState, view: &View) {
        let panes = panes(area, view.single_pane);
        draw_header(
            frame,
            panes.header,
            &view.header.title,
            &view.header.locator,
            view.single_pane,
        );

        let block = (!view.single_pane).then(|| {
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(COLOR_BORDER))
        });
        if view.no_matches {
            let mut empty = Paragraph::new("no matches")
                .style(Style::default().fg(COLOR_TEXT_SECONDARY));
            if let Some(block) = block {
                empty = empty.block(block);
            }
            frame.render_widget(empty, panes.list);
        } else {
            frame.render_widget(list_widget(&view.rows, block), panes.list);
        }

        if let Some(lower) = panes.lower {
            match &view.body {
                Some(lines) => {
                    let text: Vec<Line<'static>> = lines.iter().map(|line| body_line(line)).collect();
                    frame.render_widget(Paragraph::new(text), lower);
                }
                None => {
                    if let Some(label) = self.media_label(state) {
                        frame.render_widget(
                            Paragraph::new(label).style(Style::default().fg(COLOR_TEXT_SECONDARY)),
                            lower,
                        );
                    }
                }
            }
        }

        let status = view
            .status
            .clone()
            .unwrap_or_else(|| key_hint(state.mode()).to_string());
        draw_status(frame, panes.status, &status);
    }

    fn media_label(&self, state: &ViewerState) -> Option<String> {
        let message = state.selected()?;
        let url = message.media_url(&self.compose_cfg.media_base)?;
        if self.graphics {
            Some(format!("[{url}]"))
        } else {
            Some(format!("[{url}] (no inline graphics in this terminal)"))
        }
    }
}

fn render_media(
    handle: &media::Handle,
    message: &Message,
    media_base: &str,
    region: Region,
    max_px: u32,
    id: u32,
    cancel: &Arc<AtomicBool>,
) -> Result<Option<KittyImage>> {
    if cancel.load(Ordering::SeqCst) {
        return Ok(None);
    }
    let request = media::Request::for_message(message, media_base)
        .ok_or_else(|| anyhow!("message {} has no attachment", message.id))?
        .with_cancel(cancel.clone());
    let path = handle.fetch(request)?;
    if cancel.load(Ordering::SeqCst) {
        return Ok(None);
    }
    Ok(graphics::prepare(&path, region, max_px, id, cancel)?)
}

fn image_id(ticket: RenderTicket) -> u32 {
    (ticket.generation % u64::from(u32::MAX)) as u32 + 1
}

fn describe_fetch(fetch: &Fetch) -> String {
    match fetch {
        Fetch::Catalog { board, .. } => format!("load /{board}/ catalog"),
        Fetch::Thread { board, topic } => format!("load /{board}/ thread {topic}"),
        Fetch::Reload { board, topic: None } => format!("reload /{board}/ catalog"),
        Fetch::Reload {
            board,
            topic: Some(topic),
        } => format!("reload /{board}/ thread {topic}"),
        Fetch::Refresh { board, topic } => format!("refresh /{board}/ thread {topic}"),
    }
}

fn map_key(key: KeyEvent) -> Option<Key> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('l') if ctrl => Some(Key::Redraw),
        KeyCode::Char(_) if ctrl => None,
        KeyCode::Char(ch) => Some(Key::Char(ch)),
        KeyCode::Enter => Some(Key::Enter),
        KeyCode::Esc => Some(Key::Esc),
        KeyCode::Backspace => Some(Key::Backspace),
        KeyCode::Up => Some(Key::Up),
        KeyCode::Down => Some(Key::Down),
        KeyCode::PageUp => Some(Key::PageUp),
        KeyCode::PageDown => Some(Key::PageDown),
        _ => None,
    }
}

fn key_hint(mode: Mode) -> &'static str {
    match mode {
        Mode::Catalog => "j/k move  enter open  / search  space text/media  r reload  s save  y copy  q quit",
        Mode::Thread => "j/k move  h back  space text/media  p play  r reload  s save  y copy  q quit",
    }
}

fn panes(area: Rect, single_pane: bool) -> Panes {
    if single_pane {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(area);
        return Panes {
            header: chunks[0],
            list: chunks[1],
            lower: None,
            status: chunks[2],
        };
    }
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(compose::list_pane_height(area.height, false)),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);
    Panes {
        header: chunks[0],
        list: chunks[1],
        lower: Some(chunks[2]),
        status: chunks[3],
    }
}

fn draw_header(frame: &mut Frame<'_>, area: Rect, title: &str, locator: &str, underline: bool) {
    let mut style = Style::default()
        .fg(COLOR_ACCENT)
        .add_modifier(Modifier::BOLD);
    if underline {
        style = style.add_modifier(Modifier::UNDERLINED);
    }
    let locator_width = u16::try_from(UnicodeWidthStr::width(locator) + 1).unwrap_or(u16::MAX);
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(locator_width)])
        .split(area);
    frame.render_widget(Paragraph::new(format!(" {title}")).style(style), chunks[0]);
    frame.render_widget(
        Paragraph::new(format!("{locator} "))
            .style(Style::default().fg(COLOR_TEXT_SECONDARY))
            .alignment(Alignment::Right),
        chunks[1],
    );
}

fn draw_status(frame: &mut Frame<'_>, area: Rect, text: &str) {
    frame.render_widget(
        Paragraph::new(text.to_string()).style(
            Style::default()
                .fg(COLOR_TEXT_SECONDARY)
                .add_modifier(Modifier::ITALIC),
        ),
        area,
    );
}

fn list_widget<'a>(rows: &[ListRow], block: Option<Block<'a>>) -> List<'a> {
    let items: Vec<ListItem> = rows
        .iter()
        .map(|row| {
            let style = if row.selected {
                Style::default()
                    .fg(COLOR_TEXT_PRIMARY)
                    .bg(COLOR_PANEL_SELECTED_BG)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(COLOR_TEXT_PRIMARY)
            };
            ListItem::new(Line::from(Span::styled(row.text.clone(), style)))
        })
        .collect();
    let list = List::new(items);
    match block {
        Some(block) => list.block(block),
        None => list,
    }
}

fn body_line(line: &str) -> Line<'static> {
    let trimmed = line.trim_start();
    let style = if trimmed.starts_with('>') && !trimmed.starts_with(">>") {
        Style::default().fg(COLOR_QUOTE)
    } else if line.starts_with(crate::quote::QUOTE_INDENT) {
        Style::default().fg(COLOR_TEXT_SECONDARY)
    } else {
        Style::default().fg(COLOR_TEXT_PRIMARY)
    };
    Line::from(Span::styled(line.to_string(), style))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MemoryFeedSource;
    use std::path::Path;
    use tempfile::tempdir;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    fn catalog_model(cache: &Path) -> Model {
        let media = media::Manager::new(media::Config {
            cache_dir: cache.to_path_buf(),
            workers: 1,
            ..media::Config::default()
        })
        .unwrap();
        Model::new(Options {
            start: Start::Viewer(Listing::Catalog(Catalog {
                board: "g".into(),
                messages: Vec::new(),
            })),
            feed: Arc::new(MemoryFeedSource::new(Vec::new())),
            media: Arc::new(media),
            compose: ComposeConfig {
                chrome_width: 5,
                site_base: "https://boards.test".into(),
                media_base: "https://i.test".into(),
            },
            min_media_height: 50,
            max_image_px: 1200,
            refresh_interval: Duration::from_millis(10),
            save_dir: None,
            player_command: Vec::new(),
        })
    }

    #[test]
    fn refresher_ticks_until_stopped() {
        let (tx, rx) = unbounded();
        let mut refresher = Refresher::start(Duration::from_millis(10), tx);
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(2)),
            Ok(AsyncResponse::RefreshTick)
        ));

        refresher.stop();
        while rx.try_recv().is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn quit_stops_timer_and_removes_cache() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("cache");
        let mut model = catalog_model(&cache);
        std::fs::write(cache.join("g-1.png"), b"img").unwrap();
        assert!(model.refresher.is_some());
        let pending = model.media.handle().enqueue(media::Request {
            url: "http://127.0.0.1:9/g/2.png".into(),
            key: "g-2.png".into(),
            ..media::Request::default()
        });

        model.release();
        let _ = pending.recv();

        assert!(model.refresher.is_none());
        assert!(!cache.exists());
        while model.response_rx.try_recv().is_ok() {}
        thread::sleep(Duration::from_millis(50));
        assert!(model.response_rx.try_recv().is_err());
    }

    #[test]
    fn ctrl_l_maps_to_redraw() {
        assert_eq!(
            map_key(key(KeyCode::Char('l'), KeyModifiers::CONTROL)),
            Some(Key::Redraw)
        );
        assert_eq!(
            map_key(key(KeyCode::Char('l'), KeyModifiers::NONE)),
            Some(Key::Char('l'))
        );
        assert_eq!(map_key(key(KeyCode::Char('x'), KeyModifiers::CONTROL)), None);
        assert_eq!(
            map_key(key(KeyCode::PageDown, KeyModifiers::NONE)),
            Some(Key::PageDown)
        );
    }

    #[test]
    fn tall_layout_reserves_lower_pane() {
        let area = Rect::new(0, 0, 100, 60);
        let layout = panes(area, false);
        assert_eq!(layout.header.height, 1);
        assert_eq!(layout.list.height, 32);
        assert_eq!(layout.status.y, 59);
        let lower = layout.lower.unwrap();
        assert_eq!(lower.y, 33);
        assert_eq!(lower.height, 26);

        let short = panes(Rect::new(0, 0, 100, 20), true);
        assert!(short.lower.is_none());
        assert_eq!(short.list.height, 18);
    }

    #[test]
    fn image_ids_are_never_zero() {
        let ticket = RenderTicket {
            message_id: 1,
            generation: u64::from(u32::MAX),
        };
        assert_eq!(image_id(ticket), 1);
        let ticket = RenderTicket {
            message_id: 1,
            generation: 7,
        };
        assert_eq!(image_id(ticket), 8);
    }
}
