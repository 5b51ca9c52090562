use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use tracing::{debug, info, warn};

use crate::feed::Message;

#[derive(Debug, Clone)]
pub struct Config {
    pub cache_dir: PathBuf,
    pub workers: usize,
    pub user_agent: String,
    pub http_client: Option<Client>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("ibb"),
            workers: 2,
            user_agent: format!("ibb/{}", crate::VERSION),
            http_client: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Request {
    pub url: String,
    /// File name inside the cache directory.
    pub key: String,
    /// Once set, the job is skipped or its result is not written.
    pub cancel: Arc<AtomicBool>,
}

impl Request {
    pub fn for_message(message: &Message, media_base: &str) -> Option<Self> {
        Some(Self {
            url: message.media_url(media_base)?,
            key: message.media_key()?,
            cancel: Arc::default(),
        })
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct ResultEntry {
    pub path: Option<PathBuf>,
    pub error: Option<anyhow::Error>,
}

impl ResultEntry {
    pub fn into_result(self) -> Result<PathBuf> {
        match (self.path, self.error) {
            (Some(path), _) => Ok(path),
            (None, Some(err)) => Err(err),
            (None, None) => Err(anyhow!("media: cache returned empty result")),
        }
    }
}

struct Job {
    request: Request,
    tx: Sender<ResultEntry>,
}

struct Inner {
    cfg: Config,
    client: Client,
    jobs: Sender<Job>,
    stop: Sender<()>,
    /// Guards the cache directory: every write and removal happens under it.
    in_flight: Mutex<HashSet<PathBuf>>,
    finished: Condvar,
    closed: AtomicBool,
}

/// Download pool backing the on-disk media cache.
pub struct Manager {
    inner: Arc<Inner>,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

/// Cheap cloneable access to the pool for background tasks.
#[derive(Clone)]
pub struct Handle {
    inner: Arc<Inner>,
}

impl Manager {
    pub fn new(cfg: Config) -> Result<Self> {
        let mut cfg = cfg;
        if cfg.workers == 0 {
            cfg.workers = 2;
        }
        fs::create_dir_all(&cfg.cache_dir).with_context(|| {
            format!("media: create cache dir {}", cfg.cache_dir.display())
        })?;

        let client = if let Some(client) = cfg.http_client.clone() {
            client
        } else {
            Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .context("media: build http client")?
        };

        let (job_tx, job_rx) = unbounded();
        let (stop_tx, stop_rx) = unbounded();

        let inner = Arc::new(Inner {
            cfg,
            client,
            jobs: job_tx,
            stop: stop_tx,
            in_flight: Mutex::new(HashSet::new()),
            finished: Condvar::new(),
            closed: AtomicBool::new(false),
        });

        let mut handles = Vec::new();
        for _ in 0..inner.cfg.workers {
            let rx_jobs = job_rx.clone();
            let rx_stop = stop_rx.clone();
            let worker_inner = inner.clone();
            handles.push(thread::spawn(move || worker_inner.worker(rx_jobs, rx_stop)));
        }

        Ok(Self {
            inner,
            handles: Mutex::new(handles),
        })
    }

    pub fn handle(&self) -> Handle {
        Handle {
            inner: self.inner.clone(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.inner.cfg.cache_dir
    }

    /// Remove the cached files of one thread's messages.
    pub fn clear_thread(&self, messages: &[Message]) {
        let _guard = self.inner.in_flight.lock();
        let mut removed = 0usize;
        for key in messages.iter().filter_map(Message::media_key) {
            match fs::remove_file(self.inner.cache_path(&key)) {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!(%key, %err, "media: remove cached file"),
            }
        }
        debug!(removed, "media: cleared thread entries");
    }

    /// Stop accepting work and remove the cache directory. Downloads still
    /// running are discarded instead of written; dropping the manager joins
    /// the workers.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.clear_all();
        for _ in 0..self.handles.lock().len() {
            let _ = self.inner.stop.send(());
        }
        debug!("media: closed");
    }

    /// Remove the whole cache directory.
    pub fn clear_all(&self) {
        let _guard = self.inner.in_flight.lock();
        let dir = &self.inner.cfg.cache_dir;
        match fs::remove_dir_all(dir) {
            Ok(()) => info!(dir = %dir.display(), "media: cache removed"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(dir = %dir.display(), %err, "media: remove cache dir"),
        }
    }

    fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for _ in &handles {
            let _ = self.inner.stop.send(());
        }
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Handle {
    pub fn enqueue(&self, request: Request) -> Receiver<ResultEntry> {
        let (tx, rx) = unbounded();
        if self.inner.closed.load(Ordering::SeqCst) {
            let _ = tx.send(ResultEntry {
                path: None,
                error: Some(anyhow!("media: cache closed")),
            });
            return rx;
        }
        let job = Job { request, tx };
        let _ = self.inner.jobs.send(job);
        rx
    }

    /// Queue the download and wait for it.
    pub fn fetch(&self, request: Request) -> Result<PathBuf> {
        self.enqueue(request)
            .recv()
            .map_err(|err| anyhow!("media: failed to receive cache result: {}", err))?
            .into_result()
    }

    pub fn cache_path(&self, key: &str) -> PathBuf {
        self.inner.cache_path(key)
    }
}

impl Inner {
    fn worker(&self, jobs: Receiver<Job>, stop: Receiver<()>) {
        loop {
            crossbeam_channel::select! {
                recv(stop) -> _ => {
                    while let Ok(job) = jobs.try_recv() {
                        self.process(job);
                    }
                    break;
                }
                recv(jobs) -> msg => {
                    match msg {
                        Ok(job) => self.process(job),
                        Err(_) => break,
                    }
                }
            }
        }
    }

    fn process(&self, job: Job) {
        if job.request.is_cancelled() {
            debug!(key = %job.request.key, "media: skipped cancelled job");
            let _ = job.tx.send(ResultEntry {
                path: None,
                error: Some(anyhow!("media: cancelled")),
            });
            return;
        }
        let result = match self.fetch(&job.request) {
            Ok(path) => ResultEntry {
                path: Some(path),
                error: None,
            },
            Err(err) => ResultEntry {
                path: None,
                error: Some(err),
            },
        };
        let _ = job.tx.send(result);
    }

    fn cache_path(&self, key: &str) -> PathBuf {
        self.cfg.cache_dir.join(key)
    }

    fn fetch(&self, request: &Request) -> Result<PathBuf> {
        if request.url.is_empty() || request.key.is_empty() {
            return Err(anyhow!("media: url and key required"));
        }
        let path = self.cache_path(&request.key);

        {
            let mut in_flight = self.in_flight.lock();
            while in_flight.contains(&path) {
                self.finished.wait(&mut in_flight);
            }
            if path.exists() {
                return Ok(path);
            }
            if self.closed.load(Ordering::SeqCst) {
                return Err(anyhow!("media: cache closed"));
            }
            if request.is_cancelled() {
                return Err(anyhow!("media: cancelled"));
            }
            in_flight.insert(path.clone());
        }

        let result = self.download(request, &path);

        self.in_flight.lock().remove(&path);
        self.finished.notify_all();

        result.map(|()| path)
    }

    fn download(&self, request: &Request, path: &Path) -> Result<()> {
        debug!(url = %request.url, "media: downloading");
        let response = self
            .client
            .get(&request.url)
            .header(USER_AGENT, &self.cfg.user_agent)
            .send()
            .context("media: download")?;

        if !response.status().is_success() {
            return Err(anyhow!("media: request failed: {}", response.status()));
        }

        let bytes = response.bytes().context("media: body")?;

        let _guard = self.in_flight.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Err(anyhow!("media: cache closed"));
        }
        if request.is_cancelled() {
            return Err(anyhow!("media: cancelled"));
        }
        fs::create_dir_all(&self.cfg.cache_dir).context("media: cache dir")?;
        let partial = partial_path(path);
        fs::write(&partial, &bytes).context("media: write")?;
        fs::rename(&partial, path).context("media: finalize")?;
        Ok(())
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Folder name for saved media derived from a topic subject.
pub fn folder_name(subject: &str, board: &str) -> String {
    let cleaned: String = subject
        .trim()
        .to_lowercase()
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '\0' => '_',
            other => other,
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').trim().to_string();
    if cleaned.is_empty() {
        board.to_string()
    } else {
        cleaned
    }
}

/// Place a cached file under `<root>/<folder>/`. Hard-links when possible,
/// copies otherwise; an existing destination is left alone.
pub fn save_copy(cached: &Path, root: &Path, folder: &str) -> Result<PathBuf> {
    let file_name = cached
        .file_name()
        .context("media: cached path has no file name")?;
    let dir = root.join(folder);
    fs::create_dir_all(&dir).with_context(|| format!("media: create {}", dir.display()))?;
    let dest = dir.join(file_name);
    if dest.exists() {
        return Ok(dest);
    }
    if fs::hard_link(cached, &dest).is_err() {
        fs::copy(cached, &dest)
            .with_context(|| format!("media: copy to {}", dest.display()))?;
    }
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::Attachment;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use tempfile::tempdir;

    fn message(id: u64, timestamp: Option<i64>) -> Message {
        Message {
            id,
            subject: None,
            body: String::new(),
            attachment: timestamp.map(|timestamp| Attachment {
                timestamp,
                ext: ".png".into(),
                filename: String::new(),
            }),
            board: "g".into(),
            author: String::new(),
            posted_at: 0,
        }
    }

    fn manager(dir: &Path) -> Manager {
        Manager::new(Config {
            cache_dir: dir.to_path_buf(),
            workers: 1,
            ..Config::default()
        })
        .unwrap()
    }

    fn local_manager(dir: &Path) -> Manager {
        Manager::new(Config {
            cache_dir: dir.to_path_buf(),
            workers: 1,
            http_client: Some(Client::builder().no_proxy().build().unwrap()),
            ..Config::default()
        })
        .unwrap()
    }

    /// Serves one three-byte image after `delay`.
    fn slow_server(delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                thread::sleep(delay);
                let _ = stream.write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\nConnection: close\r\n\r\nimg",
                );
            }
        });
        format!("http://{addr}/g/1.png")
    }

    #[test]
    fn close_discards_running_download() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("cache");
        let manager = local_manager(&cache);
        let rx = manager.handle().enqueue(Request {
            url: slow_server(Duration::from_millis(600)),
            key: "g-1.png".into(),
            ..Request::default()
        });

        thread::sleep(Duration::from_millis(150));
        manager.close();
        let result = rx.recv().unwrap().into_result();
        assert!(result.is_err());
        drop(manager);

        assert!(!cache.exists());
    }

    #[test]
    fn closed_cache_rejects_new_work() {
        let dir = tempdir().unwrap();
        let manager = local_manager(&dir.path().join("cache"));
        manager.close();
        let err = manager
            .handle()
            .fetch(Request {
                url: "http://127.0.0.1:9/g/2.png".into(),
                key: "g-2.png".into(),
                ..Request::default()
            })
            .unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn cancelled_job_is_skipped_before_download() {
        let dir = tempdir().unwrap();
        let manager = local_manager(dir.path());
        let handle = manager.handle();
        let busy = handle.enqueue(Request {
            url: slow_server(Duration::from_millis(300)),
            key: "g-1.png".into(),
            ..Request::default()
        });
        let cancel = Arc::new(AtomicBool::new(false));
        let stale = handle.enqueue(Request {
            url: "http://127.0.0.1:9/g/2.png".into(),
            key: "g-2.png".into(),
            cancel: cancel.clone(),
        });
        cancel.store(true, Ordering::SeqCst);

        assert_eq!(
            busy.recv().unwrap().into_result().unwrap(),
            dir.path().join("g-1.png")
        );
        let err = stale.recv().unwrap().into_result().unwrap_err();
        assert!(err.to_string().contains("cancelled"));
        assert!(!dir.path().join("g-2.png").exists());
    }

    #[test]
    fn cancel_during_download_leaves_no_file() {
        let dir = tempdir().unwrap();
        let manager = local_manager(dir.path());
        let cancel = Arc::new(AtomicBool::new(false));
        let rx = manager.handle().enqueue(
            Request {
                url: slow_server(Duration::from_millis(400)),
                key: "g-1.png".into(),
                ..Request::default()
            }
            .with_cancel(cancel.clone()),
        );

        thread::sleep(Duration::from_millis(100));
        cancel.store(true, Ordering::SeqCst);
        assert!(rx.recv().unwrap().into_result().is_err());
        assert!(!dir.path().join("g-1.png").exists());
        assert!(!dir.path().join("g-1.png.part").exists());
    }

    #[test]
    fn existing_file_skips_download() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());
        fs::write(dir.path().join("g-1.png"), b"cached").unwrap();

        let path = manager
            .handle()
            .fetch(Request {
                url: "http://127.0.0.1:9/unreachable.png".into(),
                key: "g-1.png".into(),
                ..Request::default()
            })
            .unwrap();
        assert_eq!(path, dir.path().join("g-1.png"));
        assert_eq!(fs::read(path).unwrap(), b"cached");
    }

    #[test]
    fn empty_request_is_rejected() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());
        assert!(manager.handle().fetch(Request::default()).is_err());
    }

    #[test]
    fn clear_thread_removes_only_its_entries() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());
        fs::write(dir.path().join("g-1.png"), b"a").unwrap();
        fs::write(dir.path().join("g-2.png"), b"b").unwrap();
        fs::write(dir.path().join("g-3.png"), b"c").unwrap();

        manager.clear_thread(&[message(1, Some(1)), message(2, Some(2)), message(4, None)]);
        assert!(!dir.path().join("g-1.png").exists());
        assert!(!dir.path().join("g-2.png").exists());
        assert!(dir.path().join("g-3.png").exists());
    }

    #[test]
    fn clear_all_removes_directory() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("cache");
        let manager = manager(&cache);
        fs::write(cache.join("g-1.png"), b"a").unwrap();
        manager.clear_all();
        assert!(!cache.exists());
    }

    #[test]
    fn request_is_keyed_by_board_timestamp_and_extension() {
        let request = Request::for_message(&message(1, Some(77)), "https://i.test").unwrap();
        assert_eq!(request.url, "https://i.test/g/77.png");
        assert_eq!(request.key, "g-77.png");
        assert!(Request::for_message(&message(1, None), "https://i.test").is_none());
    }

    #[test]
    fn folder_name_is_lowercased_and_safe() {
        assert_eq!(folder_name("Desktop Thread", "g"), "desktop thread");
        assert_eq!(folder_name("/wg/ walls", "wg"), "_wg_ walls");
        assert_eq!(folder_name("  ", "g"), "g");
    }

    #[test]
    fn save_copy_places_file_under_folder() {
        let cache = tempdir().unwrap();
        let root = tempdir().unwrap();
        let cached = cache.path().join("g-5.png");
        fs::write(&cached, b"img").unwrap();

        let dest = save_copy(&cached, root.path(), "walls").unwrap();
        assert_eq!(dest, root.path().join("walls").join("g-5.png"));
        assert_eq!(fs::read(&dest).unwrap(), b"img");

        let again = save_copy(&cached, root.path(), "walls").unwrap();
        assert_eq!(again, dest);
    }
}
