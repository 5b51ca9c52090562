use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::compose::ComposeConfig;
use crate::config;
use crate::data::{FeedSource, HttpFeedSource};
use crate::feed;
use crate::logging;
use crate::media;
use crate::navigator::Listing;
use crate::ui;

/// What to open, as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Picker,
    Board(String),
    Topic { board: String, subject: String },
}

impl Target {
    /// Build a target from positional arguments (at most two).
    pub fn from_args(args: &[String]) -> Option<Self> {
        match args {
            [] => Some(Target::Picker),
            [board] => Some(Target::Board(board.clone())),
            [board, subject] => Some(Target::Topic {
                board: board.clone(),
                subject: subject.clone(),
            }),
            _ => None,
        }
    }
}

pub fn run(target: Target) -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let _log_guard = logging::init(&cfg.logging).context("init logging")?;
    info!(version = crate::VERSION, ?target, "starting");

    let client = feed::Client::new(feed::ClientConfig {
        user_agent: cfg.feed.user_agent.clone(),
        api_base: cfg.feed.api_base.clone(),
        timeout: cfg.feed.timeout,
        http_client: None,
    })
    .context("build feed client")?;
    let source: Arc<dyn FeedSource> = Arc::new(HttpFeedSource::new(Arc::new(client)));

    // Resolve the first screen before touching the terminal so a missing
    // board or topic is reported on a clean stderr.
    let start = match &target {
        Target::Picker => ui::Start::Picker(source.list_boards().context("list boards")?),
        Target::Board(board) => ui::Start::Viewer(Listing::Catalog(
            source
                .fetch_catalog(board)
                .with_context(|| format!("load /{board}/ catalog"))?,
        )),
        Target::Topic { board, subject } => ui::Start::Viewer(Listing::Thread(
            source
                .find_thread(board, subject)
                .with_context(|| format!("open \"{subject}\" on /{board}/"))?,
        )),
    };

    let media_manager = Arc::new(
        media::Manager::new(media::Config {
            cache_dir: cfg.media.cache_dir.clone(),
            workers: cfg.media.workers,
            user_agent: cfg.feed.user_agent.clone(),
            http_client: None,
        })
        .context("start media cache")?,
    );

    let options = ui::Options {
        start,
        feed: source,
        media: media_manager.clone(),
        compose: ComposeConfig {
            chrome_width: cfg.ui.chrome_width,
            site_base: cfg.feed.site_base.clone(),
            media_base: cfg.feed.media_base.clone(),
        },
        min_media_height: cfg.ui.min_media_height,
        max_image_px: cfg.media.max_image_px,
        refresh_interval: cfg.feed.refresh_interval,
        save_dir: cfg.media.save_dir.clone(),
        player_command: cfg.player.command.clone(),
    };

    let mut model = ui::Model::new(options);
    let result = model.run();
    drop(model);
    drop(media_manager);

    result
}
