use std::time::Duration;

use anyhow::{bail, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::USER_AGENT;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FeedError;

pub const API_BASE: &str = "https://a.4cdn.org";
pub const MEDIA_BASE: &str = "https://i.4cdn.org";
pub const SITE_BASE: &str = "https://boards.4chan.org";

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub api_base: String,
    pub timeout: Duration,
    pub http_client: Option<HttpClient>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub timestamp: i64,
    /// Includes the leading dot, e.g. `.jpg`.
    pub ext: String,
    #[serde(default)]
    pub filename: String,
}

/// One post. Immutable once fetched; a refresh replaces whole lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub subject: Option<String>,
    /// Raw markup as delivered by the feed.
    pub body: String,
    pub attachment: Option<Attachment>,
    pub board: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub posted_at: i64,
}

impl Message {
    pub fn subject_text(&self) -> &str {
        self.subject.as_deref().unwrap_or("")
    }

    pub fn has_body(&self) -> bool {
        !self.body.trim().is_empty()
    }

    pub fn media_url(&self, media_base: &str) -> Option<String> {
        let attachment = self.attachment.as_ref()?;
        if self.board.is_empty() {
            return None;
        }
        Some(format!(
            "{}/{}/{}{}",
            media_base.trim_end_matches('/'),
            self.board,
            attachment.timestamp,
            attachment.ext
        ))
    }

    /// Stable cache file name derived from board, timestamp and extension.
    pub fn media_key(&self) -> Option<String> {
        let attachment = self.attachment.as_ref()?;
        Some(format!(
            "{}-{}{}",
            self.board, attachment.timestamp, attachment.ext
        ))
    }
}

/// A board's active topics, one head message per topic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Catalog {
    pub board: String,
    pub messages: Vec<Message>,
}

impl Catalog {
    pub fn find_topic(&self, subject: &str) -> Option<&Message> {
        let wanted = subject.to_lowercase();
        self.messages
            .iter()
            .find(|message| message.subject_text().to_lowercase() == wanted)
    }

    pub fn position(&self, id: u64) -> Option<usize> {
        self.messages.iter().position(|message| message.id == id)
    }
}

/// Every message of one topic in chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Thread {
    pub board: String,
    pub messages: Vec<Message>,
}

impl Thread {
    pub fn topic_id(&self) -> Option<u64> {
        self.messages.first().map(|message| message.id)
    }

    pub fn subject(&self) -> &str {
        self.messages
            .first()
            .map(Message::subject_text)
            .unwrap_or("")
    }

    pub fn find(&self, id: u64) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub board: String,
    #[serde(default)]
    pub title: String,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: String,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("feed client user agent required");
        }

        let timeout = if config.timeout.is_zero() {
            Duration::from_secs(20)
        } else {
            config.timeout
        };
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder().timeout(timeout).build()?,
        };
        let base_url = if config.api_base.trim().is_empty() {
            API_BASE.to_string()
        } else {
            config.api_base.trim_end_matches('/').to_string()
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn catalog(&self, board: &str) -> Result<Catalog, FeedError> {
        let url = format!("{}/{}/catalog.json", self.base_url, board);
        let body = self.get(&url)?;
        parse_catalog(board, &body)
    }

    pub fn thread(&self, board: &str, id: u64) -> Result<Thread, FeedError> {
        let url = format!("{}/{}/thread/{}.json", self.base_url, board, id);
        let body = self.get(&url)?;
        parse_thread(board, &body)
    }

    pub fn boards(&self) -> Result<Vec<Board>, FeedError> {
        let url = format!("{}/boards.json", self.base_url);
        let body = self.get(&url)?;
        let listing: BoardListing = decode("board list", &body)?;
        Ok(listing.boards)
    }

    fn get(&self, url: &str) -> Result<String, FeedError> {
        debug!(url, "feed request");
        let response = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .map_err(|source| FeedError::Http {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().map_err(|source| FeedError::Http {
            url: url.to_string(),
            source,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawPost {
    no: u64,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    com: Option<String>,
    #[serde(default)]
    tim: Option<i64>,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    time: Option<i64>,
}

impl RawPost {
    fn into_message(self, board: &str) -> Message {
        let attachment = match (self.tim, self.ext) {
            (Some(timestamp), Some(ext)) if timestamp > 0 => Some(Attachment {
                timestamp,
                ext,
                filename: self.filename.unwrap_or_default(),
            }),
            _ => None,
        };
        Message {
            id: self.no,
            subject: self.sub.filter(|sub| !sub.is_empty()),
            body: self.com.unwrap_or_default(),
            attachment,
            board: board.to_string(),
            author: self.name.unwrap_or_default(),
            posted_at: self.time.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogPage {
    #[serde(default)]
    threads: Vec<RawPost>,
}

#[derive(Debug, Deserialize)]
struct ThreadBody {
    #[serde(default)]
    posts: Vec<RawPost>,
}

#[derive(Debug, Deserialize)]
struct BoardListing {
    #[serde(default)]
    boards: Vec<Board>,
}

fn decode<T: DeserializeOwned>(what: &str, body: &str) -> Result<T, FeedError> {
    serde_json::from_str(body).map_err(|source| FeedError::Decode {
        what: what.to_string(),
        source,
    })
}

pub fn parse_catalog(board: &str, body: &str) -> Result<Catalog, FeedError> {
    let pages: Vec<CatalogPage> = decode(&format!("/{board}/ catalog"), body)?;
    let messages = pages
        .into_iter()
        .flat_map(|page| page.threads)
        .map(|post| post.into_message(board))
        .collect();
    Ok(Catalog {
        board: board.to_string(),
        messages,
    })
}

pub fn parse_thread(board: &str, body: &str) -> Result<Thread, FeedError> {
    let raw: ThreadBody = decode(&format!("/{board}/ thread"), body)?;
    let messages = raw
        .posts
        .into_iter()
        .map(|post| post.into_message(board))
        .collect();
    Ok(Thread {
        board: board.to_string(),
        messages,
    })
}
