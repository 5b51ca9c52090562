use std::process::{Command, Stdio};
use std::thread;

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::feed::Thread;
use crate::markup;

static EMBED_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:https?://)?(?:www\.|m\.)?(?:youtube\.com/watch\?[^\s<>]+|youtu\.be/[^\s<>]+)")
        .expect("embed link pattern")
});

const VIDEO_EXTENSIONS: [&str; 2] = [".webm", ".mp4"];

/// Every playable link in `thread`, newest first: embedded video links
/// found in message text and video attachments.
pub fn collect_links(thread: &Thread, media_base: &str) -> Vec<String> {
    let mut links = Vec::new();
    for message in &thread.messages {
        for line in markup::render_lines(&message.body) {
            for found in EMBED_LINK.find_iter(&line) {
                links.push(normalize(found.as_str()));
            }
        }
        let is_video = message
            .attachment
            .as_ref()
            .is_some_and(|a| VIDEO_EXTENSIONS.contains(&a.ext.to_ascii_lowercase().as_str()));
        if is_video {
            if let Some(url) = message.media_url(media_base) {
                links.push(url);
            }
        }
    }
    links.reverse();
    links
}

fn normalize(link: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") {
        link.to_string()
    } else {
        format!("https://{link}")
    }
}

/// Launch `command` with `links` appended, without waiting for it.
pub fn spawn_player(command: &[String], links: &[String]) -> Result<()> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow!("player command is empty"))?;
    if links.is_empty() {
        return Err(anyhow!("no playable links in this thread"));
    }

    let mut child = Command::new(program)
        .args(args)
        .args(links)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("launch {program}"))?;
    debug!(program = %program, count = links.len(), "player started");

    thread::spawn(move || match child.wait() {
        Ok(status) if !status.success() => warn!(%status, "player exited"),
        Ok(_) => {}
        Err(err) => warn!(error = %err, "wait for player"),
    });
    Ok(())
}
