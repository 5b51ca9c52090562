//! Board list shown when no board was given on the command line.

use crate::compose::{self, ListRow};
use crate::feed::Board;
use crate::navigator::{scaled, wrap_cursor, Key};
use crate::search::SearchFilter;
use crate::window;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerOutcome {
    Pending,
    Open(String),
    Quit,
}

#[derive(Debug, Clone)]
pub struct BoardPicker {
    boards: Vec<Board>,
    cursor: usize,
    pending_count: usize,
    searching: bool,
    search: SearchFilter,
}

impl BoardPicker {
    pub fn new(boards: Vec<Board>) -> Self {
        Self {
            boards,
            cursor: 0,
            pending_count: 0,
            searching: false,
            search: SearchFilter::default(),
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn effective_len(&self) -> usize {
        self.search.effective_len(self.boards.len())
    }

    pub fn selected(&self) -> Option<&Board> {
        let idx = self.search.resolve(self.cursor, self.boards.len())?;
        self.boards.get(idx)
    }

    /// Apply one key; `page` is the distance of a page move.
    pub fn handle(&mut self, key: Key, page: usize) -> PickerOutcome {
        if self.searching {
            match key {
                Key::Esc | Key::Enter => self.searching = false,
                Key::Backspace => {
                    if self.search.pop(&self.boards) {
                        self.cursor = 0;
                    } else {
                        self.searching = false;
                    }
                }
                Key::Char(ch) => {
                    self.search.push(ch, &self.boards);
                    self.cursor = 0;
                }
                _ => {}
            }
            return PickerOutcome::Pending;
        }

        if let Key::Char(ch) = key {
            if let Some(digit) = ch.to_digit(10) {
                self.pending_count = self
                    .pending_count
                    .saturating_mul(10)
                    .saturating_add(digit as usize);
                return PickerOutcome::Pending;
            }
        }

        let count = std::mem::take(&mut self.pending_count);
        let page = i64::try_from(page.max(1)).unwrap_or(i64::MAX);
        match key {
            Key::Char('q') | Key::Esc => return PickerOutcome::Quit,
            Key::Enter => {
                if let Some(board) = self.selected() {
                    return PickerOutcome::Open(board.board.clone());
                }
            }
            Key::Char('/') => self.searching = true,
            Key::Char('j') | Key::Down => self.step(scaled(1, count)),
            Key::Char('k') | Key::Up => self.step(scaled(-1, count)),
            Key::PageDown => self.step(scaled(page, count)),
            Key::PageUp => self.step(scaled(-page, count)),
            Key::Char('g') => self.jump(count.saturating_sub(1)),
            Key::Char('G') => self.jump(usize::MAX),
            _ => {}
        }
        PickerOutcome::Pending
    }

    fn step(&mut self, delta: i64) {
        let len = self.effective_len();
        if len > 0 {
            self.cursor = wrap_cursor(self.cursor, len, delta);
        }
    }

    fn jump(&mut self, idx: usize) {
        let len = self.effective_len();
        if len > 0 {
            self.cursor = idx.min(len - 1);
        }
    }

    pub fn title(&self) -> String {
        let query = self.search.query();
        match (self.searching, query.is_empty()) {
            (true, true) => "boards [type to start searching]".to_string(),
            (true, false) => format!("boards {query}"),
            (false, false) => format!("boards [{query}]"),
            (false, true) => "boards".to_string(),
        }
    }

    /// Rows for a pane `height` rows tall and `width` columns wide.
    pub fn rows(&self, width: usize, height: u16) -> Vec<ListRow> {
        let visible: Vec<&Board> = if self.search.is_active() {
            self.search
                .matches()
                .iter()
                .filter_map(|&idx| self.boards.get(idx))
                .collect()
        } else {
            self.boards.iter().collect()
        };
        if visible.is_empty() {
            return Vec::new();
        }
        let cursor = self.cursor.min(visible.len() - 1);
        let margin = compose::scroll_margin(height, true);
        let range = window::fit_window(cursor, visible.len(), margin, height);
        visible[range.clone()]
            .iter()
            .enumerate()
            .map(|(offset, board)| {
                let selected = range.start + offset == cursor;
                let marker = if selected { '>' } else { ' ' };
                ListRow {
                    text: compose::truncate(
                        &format!("{marker} /{}/ - {}", board.board, board.title),
                        width,
                    ),
                    selected,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boards() -> Vec<Board> {
        [
            ("a", "Anime & Manga"),
            ("g", "Technology"),
            ("k", "Weapons"),
            ("sci", "Science & Math"),
            ("tv", "Television & Film"),
        ]
        .into_iter()
        .map(|(board, title)| Board {
            board: board.into(),
            title: title.into(),
        })
        .collect()
    }

    #[test]
    fn enter_opens_selected_board() {
        let mut picker = BoardPicker::new(boards());
        assert_eq!(picker.handle(Key::Char('j'), 10), PickerOutcome::Pending);
        assert_eq!(picker.handle(Key::Enter, 10), PickerOutcome::Open("g".into()));
    }

    #[test]
    fn counts_and_wraparound() {
        let mut picker = BoardPicker::new(boards());
        picker.handle(Key::Char('3'), 10);
        picker.handle(Key::Char('j'), 10);
        assert_eq!(picker.cursor(), 3);
        picker.handle(Key::Char('j'), 10);
        picker.handle(Key::Char('j'), 10);
        assert_eq!(picker.cursor(), 0);
        picker.handle(Key::Char('k'), 10);
        assert_eq!(picker.cursor(), 4);
    }

    #[test]
    fn search_narrows_boards() {
        let mut picker = BoardPicker::new(boards());
        picker.handle(Key::Char('/'), 10);
        for ch in "sci".chars() {
            picker.handle(Key::Char(ch), 10);
        }
        assert_eq!(picker.title(), "boards sci");
        picker.handle(Key::Enter, 10);
        assert_eq!(picker.title(), "boards [sci]");
        assert_eq!(picker.rows(80, 20).len(), 1);
        assert_eq!(picker.handle(Key::Enter, 10), PickerOutcome::Open("sci".into()));
    }

    #[test]
    fn quit_leaves_picker() {
        let mut picker = BoardPicker::new(boards());
        assert_eq!(picker.handle(Key::Char('q'), 10), PickerOutcome::Quit);
    }

    #[test]
    fn rows_mark_selection() {
        let mut picker = BoardPicker::new(boards());
        picker.handle(Key::Char('G'), 10);
        let rows = picker.rows(80, 20);
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[4].text, "> /tv/ - Television & Film");
        assert!(rows[4].selected);
    }
}
