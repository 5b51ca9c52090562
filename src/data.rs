use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::FeedError;
use crate::feed::{self, Board, Catalog, Thread};
use crate::navigator::{Event, Fetch, Listing};

/// Where catalogs and threads come from.
pub trait FeedSource: Send + Sync {
    fn fetch_catalog(&self, board: &str) -> Result<Catalog, FeedError>;
    fn fetch_thread(&self, board: &str, topic: u64) -> Result<Thread, FeedError>;
    fn list_boards(&self) -> Result<Vec<Board>, FeedError>;

    /// Resolve a topic by subject and fetch its thread.
    fn find_thread(&self, board: &str, subject: &str) -> Result<Thread, FeedError> {
        let catalog = self.fetch_catalog(board)?;
        let topic = catalog
            .find_topic(subject)
            .ok_or_else(|| FeedError::ThreadNotFound {
                board: board.to_string(),
                subject: subject.to_string(),
            })?;
        self.fetch_thread(board, topic.id)
    }
}

pub struct HttpFeedSource {
    client: Arc<feed::Client>,
}

impl HttpFeedSource {
    pub fn new(client: Arc<feed::Client>) -> Self {
        Self { client }
    }
}

impl FeedSource for HttpFeedSource {
    fn fetch_catalog(&self, board: &str) -> Result<Catalog, FeedError> {
        self.client.catalog(board)
    }

    fn fetch_thread(&self, board: &str, topic: u64) -> Result<Thread, FeedError> {
        self.client.thread(board, topic)
    }

    fn list_boards(&self) -> Result<Vec<Board>, FeedError> {
        self.client.boards()
    }
}

/// Serves fixed data; threads can be swapped to simulate new posts.
#[derive(Default)]
pub struct MemoryFeedSource {
    catalogs: Mutex<HashMap<String, Catalog>>,
    threads: Mutex<HashMap<(String, u64), Thread>>,
    boards: Vec<Board>,
}

impl MemoryFeedSource {
    pub fn new(boards: Vec<Board>) -> Self {
        Self {
            boards,
            ..Self::default()
        }
    }

    pub fn put_catalog(&self, catalog: Catalog) {
        self.catalogs.lock().insert(catalog.board.clone(), catalog);
    }

    pub fn put_thread(&self, thread: Thread) {
        if let Some(topic) = thread.topic_id() {
            self.threads
                .lock()
                .insert((thread.board.clone(), topic), thread);
        }
    }
}

impl FeedSource for MemoryFeedSource {
    fn fetch_catalog(&self, board: &str) -> Result<Catalog, FeedError> {
        self.catalogs
            .lock()
            .get(board)
            .cloned()
            .ok_or_else(|| FeedError::Status {
                url: format!("memory://{board}/catalog"),
                status: 404,
            })
    }

    fn fetch_thread(&self, board: &str, topic: u64) -> Result<Thread, FeedError> {
        self.threads
            .lock()
            .get(&(board.to_string(), topic))
            .cloned()
            .ok_or_else(|| FeedError::Status {
                url: format!("memory://{board}/thread/{topic}"),
                status: 404,
            })
    }

    fn list_boards(&self) -> Result<Vec<Board>, FeedError> {
        Ok(self.boards.clone())
    }
}

/// Carry out `fetch` against `source` and wrap the result as the event the
/// navigator expects back.
pub fn load(source: &dyn FeedSource, fetch: &Fetch) -> Result<Event, FeedError> {
    match fetch {
        Fetch::Catalog { board, focus } => {
            let catalog = source.fetch_catalog(board)?;
            Ok(Event::CatalogLoaded {
                catalog,
                focus: *focus,
            })
        }
        Fetch::Thread { board, topic } => source.fetch_thread(board, *topic).map(Event::ThreadLoaded),
        Fetch::Reload { board, topic: None } => source
            .fetch_catalog(board)
            .map(|catalog| Event::Reloaded(Listing::Catalog(catalog))),
        Fetch::Reload {
            board,
            topic: Some(topic),
        } => source
            .fetch_thread(board, *topic)
            .map(|thread| Event::Reloaded(Listing::Thread(thread))),
        Fetch::Refresh { board, topic } => source.fetch_thread(board, *topic).map(Event::Refreshed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::Message;

    fn message(id: u64, subject: &str) -> Message {
        Message {
            id,
            subject: (!subject.is_empty()).then(|| subject.to_string()),
            body: format!("body {id}"),
            attachment: None,
            board: "g".into(),
            author: String::new(),
            posted_at: 0,
        }
    }

    #[test]
    fn find_thread_resolves_subject_through_catalog() {
        let source = MemoryFeedSource::default();
        source.put_catalog(Catalog {
            board: "g".into(),
            messages: vec![message(1, "Desktop Thread"), message(2, "dpt")],
        });
        source.put_thread(Thread {
            board: "g".into(),
            messages: vec![message(2, "dpt"), message(3, "")],
        });

        let thread = source.find_thread("g", "dpt").unwrap();
        assert_eq!(thread.topic_id(), Some(2));
        assert_eq!(thread.messages.len(), 2);
    }

    #[test]
    fn find_thread_reports_missing_subject() {
        let source = MemoryFeedSource::default();
        source.put_catalog(Catalog {
            board: "g".into(),
            messages: vec![message(1, "Desktop Thread")],
        });
        let err = source.find_thread("g", "gone").unwrap_err();
        assert!(matches!(err, FeedError::ThreadNotFound { .. }));
    }

    #[test]
    fn unknown_board_is_upstream_error() {
        let source = MemoryFeedSource::default();
        assert!(source.fetch_catalog("zz").is_err());
    }

    #[test]
    fn load_maps_fetches_to_events() {
        let source = MemoryFeedSource::default();
        source.put_catalog(Catalog {
            board: "g".into(),
            messages: vec![message(1, "Desktop Thread")],
        });
        source.put_thread(Thread {
            board: "g".into(),
            messages: vec![message(1, "Desktop Thread"), message(4, "")],
        });

        let event = load(
            &source,
            &Fetch::Catalog {
                board: "g".into(),
                focus: Some(1),
            },
        )
        .unwrap();
        assert!(matches!(event, Event::CatalogLoaded { focus: Some(1), .. }));

        let event = load(
            &source,
            &Fetch::Reload {
                board: "g".into(),
                topic: Some(1),
            },
        )
        .unwrap();
        assert!(matches!(event, Event::Reloaded(Listing::Thread(t)) if t.messages.len() == 2));

        let event = load(
            &source,
            &Fetch::Refresh {
                board: "g".into(),
                topic: 1,
            },
        )
        .unwrap();
        assert!(matches!(event, Event::Refreshed(_)));

        let err = load(
            &source,
            &Fetch::Thread {
                board: "g".into(),
                topic: 99,
            },
        )
        .unwrap_err();
        assert!(err.kind().is_fatal());
    }
}
