//! File system watching for plugin hot reload.
//!
//! The watcher's backend thread and the host loop share exactly one piece
//! of state, the [`ReloadSignal`]: a single atomic boolean raised here and
//! consumed by the host. Everything else stays on the backend thread.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Configuration for the reload watcher.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Minimum interval between accepted modification events.
    pub debounce: Duration,
    /// Whether to watch recursively.
    pub recursive: bool,
    /// File extensions that count as plugin source.
    pub extensions: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(1),
            recursive: true,
            extensions: vec!["rhai".to_string()],
        }
    }
}

impl WatchConfig {
    /// Create a new watch configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debounce window.
    pub fn with_debounce(mut self, duration: Duration) -> Self {
        self.debounce = duration;
        self
    }

    /// Set recursive watching.
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Set file extensions to watch.
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }
}

/// Edge-triggered reload request shared between the watcher's backend
/// thread and the host loop.
///
/// Raising is a single atomic store, so the host can never observe a
/// torn state; [`take`](Self::take) clears the edge on consumption.
#[derive(Debug, Clone)]
pub struct ReloadSignal(Arc<AtomicBool>);

impl ReloadSignal {
    /// Create an unraised signal.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Raise the signal. Callable from any thread.
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Consume the signal, returning whether it was raised.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    /// Peek without consuming.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for ReloadSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Suppresses event bursts: an event is accepted only if at least the
/// configured window has elapsed since the last accepted one.
///
/// The window is global rather than per path. Editors and the patch
/// pipeline generate multi-write churn for one logical save, and an
/// accepted event reloads the single selected plugin regardless of which
/// file changed, so one window suffices.
#[derive(Debug)]
pub struct Debounce {
    window: Duration,
    last_accepted: Option<Instant>,
}

impl Debounce {
    /// Create a debouncer with the given window.
    pub fn new(window: Duration) -> Self {
        Self { window, last_accepted: None }
    }

    /// Accept or reject an event occurring now.
    pub fn accept(&mut self) -> bool {
        self.accept_at(Instant::now())
    }

    /// Accept or reject an event occurring at `now`. Split out for tests.
    pub fn accept_at(&mut self, now: Instant) -> bool {
        match self.last_accepted {
            Some(last) if now.duration_since(last) < self.window => false,
            _ => {
                self.last_accepted = Some(now);
                true
            }
        }
    }
}

/// Watches the plugin source tree and raises the [`ReloadSignal`] on
/// debounced modification events.
///
/// The notify backend owns a dedicated thread for the lifetime of the
/// watch; [`stop`](Self::stop) drops the backend, which joins that thread
/// before returning.
pub struct ReloadWatcher {
    config: WatchConfig,
    signal: ReloadSignal,
    backend: Option<RecommendedWatcher>,
    root: Option<PathBuf>,
}

impl ReloadWatcher {
    /// Create a watcher; it does nothing until [`start`](Self::start).
    pub fn new(config: WatchConfig) -> Self {
        Self {
            config,
            signal: ReloadSignal::new(),
            backend: None,
            root: None,
        }
    }

    /// Create with default configuration.
    pub fn default_config() -> Self {
        Self::new(WatchConfig::default())
    }

    /// Get the watcher configuration.
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// A handle to the shared reload signal.
    pub fn signal(&self) -> ReloadSignal {
        self.signal.clone()
    }

    /// Check if the watcher is running.
    pub fn is_running(&self) -> bool {
        self.backend.is_some()
    }

    /// Start watching the given root directory.
    pub fn start(&mut self, root: impl AsRef<Path>) -> Result<()> {
        if self.backend.is_some() {
            return Ok(());
        }

        let root = root.as_ref().to_path_buf();
        let signal = self.signal.clone();
        let extensions = self.config.extensions.clone();
        let debounce = Mutex::new(Debounce::new(self.config.debounce));

        let mut backend = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                let event = match res {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watch backend error");
                        return;
                    }
                };

                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    return;
                }
                if !matches_extension(&event, &extensions) {
                    return;
                }

                if debounce.lock().accept() {
                    tracing::info!(paths = ?event.paths, "source change accepted, reload requested");
                    signal.raise();
                } else {
                    tracing::debug!(paths = ?event.paths, "source change within debounce window, dropped");
                }
            },
            Config::default(),
        )
        .map_err(|e| Error::Watch(e.to_string()))?;

        let mode = if self.config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        backend
            .watch(&root, mode)
            .map_err(|e| Error::Watch(e.to_string()))?;

        tracing::info!(root = %root.display(), "reload watcher started");
        self.backend = Some(backend);
        self.root = Some(root);
        Ok(())
    }

    /// Stop watching, joining the backend thread.
    pub fn stop(&mut self) {
        if self.backend.take().is_some() {
            self.root = None;
            tracing::info!("reload watcher stopped");
        }
    }
}

impl std::fmt::Debug for ReloadWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadWatcher")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("root", &self.root)
            .finish()
    }
}

impl Drop for ReloadWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn matches_extension(event: &Event, extensions: &[String]) -> bool {
    event.paths.iter().any(|path| {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.iter().any(|e| e == ext))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_config_builder() {
        let config = WatchConfig::new()
            .with_debounce(Duration::from_millis(250))
            .with_recursive(false)
            .with_extensions(vec!["rhai".to_string(), "txt".to_string()]);

        assert_eq!(config.debounce, Duration::from_millis(250));
        assert!(!config.recursive);
        assert_eq!(config.extensions.len(), 2);
    }

    #[test]
    fn test_signal_is_edge_triggered() {
        let signal = ReloadSignal::new();
        assert!(!signal.take());

        signal.raise();
        signal.raise();
        assert!(signal.is_raised());
        assert!(signal.take());
        assert!(!signal.take());
    }

    #[test]
    fn test_debounce_accepts_first_and_rejects_burst() {
        let mut debounce = Debounce::new(Duration::from_secs(1));
        let start = Instant::now();

        assert!(debounce.accept_at(start));
        for ms in [10, 100, 500, 999] {
            assert!(!debounce.accept_at(start + Duration::from_millis(ms)));
        }
        assert!(debounce.accept_at(start + Duration::from_millis(1000)));
    }

    #[test]
    fn test_debounce_window_restarts_on_accept() {
        let mut debounce = Debounce::new(Duration::from_secs(1));
        let start = Instant::now();

        assert!(debounce.accept_at(start));
        assert!(debounce.accept_at(start + Duration::from_millis(1500)));
        // The window restarts at 1500, not at the rejected events.
        assert!(!debounce.accept_at(start + Duration::from_millis(2400)));
        assert!(debounce.accept_at(start + Duration::from_millis(2500)));
    }

    #[test]
    fn test_watcher_lifecycle() {
        let tmp = tempfile::tempdir().unwrap();
        let mut watcher = ReloadWatcher::default_config();
        assert!(!watcher.is_running());

        watcher.start(tmp.path()).unwrap();
        assert!(watcher.is_running());

        watcher.stop();
        assert!(!watcher.is_running());
    }

    #[test]
    fn test_watcher_raises_signal_on_source_write() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("pendulum");
        std::fs::create_dir_all(&dir).unwrap();
        let entry = dir.join("game.rhai");
        std::fs::write(&entry, "fn setup(world) { #{} }").unwrap();

        let mut watcher =
            ReloadWatcher::new(WatchConfig::new().with_debounce(Duration::from_millis(10)));
        watcher.start(tmp.path()).unwrap();
        let signal = watcher.signal();

        std::fs::write(&entry, "fn setup(world) { #{ changed: true } }").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !signal.is_raised() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(signal.take(), "watcher never observed the write");
    }

    #[test]
    fn test_non_source_writes_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let mut watcher =
            ReloadWatcher::new(WatchConfig::new().with_debounce(Duration::from_millis(10)));
        watcher.start(tmp.path()).unwrap();
        let signal = watcher.signal();

        std::fs::write(tmp.path().join("notes.txt"), "not a plugin").unwrap();
        std::thread::sleep(Duration::from_millis(300));
        assert!(!signal.is_raised());
    }
}
