use std::fmt;

/// Coarse classification used by the control loop to decide whether an
/// error ends the session or only degrades the current view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Feed unreachable or malformed. Fatal at fetch time.
    Upstream,
    /// A quote target or attachment could not be found.
    ResolutionMiss,
    /// Media could not be decoded, resized or drawn.
    Rendering,
    /// A state the navigator assumed impossible.
    Invariant,
}

impl ErrorKind {
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorKind::Upstream)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Upstream => "upstream",
            ErrorKind::ResolutionMiss => "resolution-miss",
            ErrorKind::Rendering => "rendering",
            ErrorKind::Invariant => "invariant",
        };
        f.write_str(label)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("request {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("no thread on /{board}/ has the subject {subject:?}")]
    ThreadNotFound { board: String, subject: String },
}

impl FeedError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Upstream
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("unsupported media format: {0}")]
    Unsupported(String),
    #[error("decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("image too large after resize: {width}x{height}")]
    Oversized { width: u32, height: u32 },
    #[error("terminal does not support the kitty graphics protocol")]
    NoGraphics,
    #[error("render target is too small")]
    NoRoom,
}

impl RenderError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Rendering
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("expected at most 2 arguments, got {0}")]
    Arity(usize),
}
