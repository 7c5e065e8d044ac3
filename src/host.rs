//! The host loop: plugin selection, reload handling, physics stepping,
//! and hook dispatch, one fixed tick at a time.
//!
//! The host thread is the sole reader and writer of the physics world and
//! the plugin instance. Cross-thread state is limited to the watcher's
//! [`ReloadSignal`] and the plugin files on disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::loader::{LoaderConfig, PluginLoader};
use crate::patch::{CodeGenerator, PatchPipeline, PatchRequest};
use crate::plugin::{PluginDescriptor, PluginInstance, PluginStatus};
use crate::registry::PluginRegistry;
use crate::script::DrawCommand;
use crate::watcher::{ReloadSignal, ReloadWatcher, WatchConfig};

/// Configuration for the host loop.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Directory scanned for plugin packages.
    pub plugin_root: PathBuf,
    /// Fixed tick interval. Both the simulation step and the loop cadence.
    pub tick: Duration,
    /// Loader configuration.
    pub loader: LoaderConfig,
    /// Watcher configuration.
    pub watch: WatchConfig,
    /// Whether to load the first discovered plugin on startup.
    pub autoload_first: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            plugin_root: PathBuf::from("plugins"),
            tick: Duration::from_secs(1) / 60,
            loader: LoaderConfig::default(),
            watch: WatchConfig::default(),
            autoload_first: true,
        }
    }
}

impl HostConfig {
    /// Create a new host configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the plugin root directory.
    pub fn with_plugin_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.plugin_root = root.into();
        self
    }

    /// Set the tick interval.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Set the loader configuration.
    pub fn with_loader(mut self, loader: LoaderConfig) -> Self {
        self.loader = loader;
        self
    }

    /// Set the watcher configuration.
    pub fn with_watch(mut self, watch: WatchConfig) -> Self {
        self.watch = watch;
        self
    }

    /// Set whether the first discovered plugin loads on startup.
    pub fn with_autoload_first(mut self, autoload: bool) -> Self {
        self.autoload_first = autoload;
        self
    }
}

/// Discrete input consumed at the top of each tick.
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// A plugin was selected in the UI.
    Select(String),
    /// A code patch was requested for the active plugin, with a goal.
    RequestPatch(String),
    /// Stop the loop after the current tick.
    Shutdown,
}

/// Everything the external presenter needs for one frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Tick counter.
    pub tick: u64,
    /// Name of the selected plugin, if any.
    pub plugin: Option<String>,
    /// Status of the live instance.
    pub status: PluginStatus,
    /// Diagnostic text from the last failed load, for the console box.
    pub diagnostic: Option<String>,
    /// Draw primitives recorded by the plugin's `draw` hook.
    pub draw: Vec<DrawCommand>,
    /// Discovered plugin names, for the selection list.
    pub plugins: Vec<String>,
}

/// Rendering/input collaborator driven by [`HostLoop::run`].
pub trait Presenter {
    /// Collect the UI events that occurred since the last tick.
    fn poll_events(&mut self) -> Vec<HostEvent>;

    /// Present a completed frame.
    fn present(&mut self, frame: &Frame);
}

/// Owns the loader, watcher, patch pipeline, and the single live
/// instance, and drives the fixed-tick state machine.
pub struct HostLoop {
    config: HostConfig,
    registry: PluginRegistry,
    loader: PluginLoader,
    watcher: ReloadWatcher,
    signal: ReloadSignal,
    pipeline: PatchPipeline,
    descriptors: Vec<PluginDescriptor>,
    instance: Option<PluginInstance>,
    ticks: u64,
    shutdown_requested: bool,
}

impl HostLoop {
    /// Create the host: discover plugins, start the watcher, and load the
    /// first discovered plugin if configured to.
    pub fn new(config: HostConfig, generator: Arc<dyn CodeGenerator>) -> Result<Self> {
        let registry = PluginRegistry::new(&config.plugin_root);
        let descriptors = registry.discover()?;

        let mut watcher = ReloadWatcher::new(config.watch.clone());
        watcher.start(&config.plugin_root)?;
        let signal = watcher.signal();

        let mut host = Self {
            loader: PluginLoader::new(config.loader.clone()),
            pipeline: PatchPipeline::new(generator),
            registry,
            watcher,
            signal,
            descriptors,
            instance: None,
            ticks: 0,
            shutdown_requested: false,
            config,
        };

        if host.config.autoload_first {
            if let Some(first) = host.descriptors.first().cloned() {
                host.instance = Some(host.loader.load(&first));
            }
        }

        Ok(host)
    }

    /// Names of the discovered plugins, in selection-list order.
    pub fn plugin_names(&self) -> Vec<String> {
        self.descriptors.iter().map(|d| d.name.clone()).collect()
    }

    /// The live instance, if a plugin has been selected.
    pub fn instance(&self) -> Option<&PluginInstance> {
        self.instance.as_ref()
    }

    /// Re-scan the plugin root, replacing the descriptor list.
    pub fn rescan(&mut self) -> Result<()> {
        self.descriptors = self.registry.discover()?;
        Ok(())
    }

    /// Load the named plugin, discarding the previous instance and world.
    pub fn select(&mut self, name: &str) -> Result<()> {
        let descriptor = self
            .descriptors
            .iter()
            .find(|d| d.name == name)
            .cloned()
            .ok_or_else(|| Error::plugin_not_found(name))?;

        self.instance = Some(self.loader.load(&descriptor));
        Ok(())
    }

    /// Hand the active plugin's current source to the patch pipeline.
    pub fn request_patch(&mut self, goal: &str) -> Result<()> {
        let instance = self.instance.as_ref().ok_or(Error::NoSelection)?;
        let source = std::fs::read_to_string(instance.entry())?;

        self.pipeline.request(PatchRequest {
            plugin: instance.name().to_string(),
            entry: instance.entry().to_path_buf(),
            source,
            goal: goal.to_string(),
        })
    }

    /// Run one tick of the host state machine and produce its frame.
    ///
    /// Order per tick: drain events, consume the reload signal, step the
    /// physics world by the fixed interval, then `update` and `draw` if
    /// Active. The instance swap happens only here, never mid-frame.
    pub fn tick_once(&mut self, events: Vec<HostEvent>) -> Frame {
        for event in events {
            match event {
                HostEvent::Select(name) => {
                    if let Err(err) = self.select(&name) {
                        tracing::warn!(plugin = %name, error = %err, "selection failed");
                    }
                }
                HostEvent::RequestPatch(goal) => {
                    if let Err(err) = self.request_patch(&goal) {
                        tracing::warn!(error = %err, "patch request rejected");
                    }
                }
                HostEvent::Shutdown => {
                    self.shutdown_requested = true;
                }
            }
        }

        // Reload always targets the currently selected plugin, not
        // whichever file changed.
        if self.signal.take() {
            if let Some(descriptor) = self.instance.as_ref().map(|i| i.descriptor().clone()) {
                tracing::info!(plugin = %descriptor.name, "reload signal consumed");
                self.instance = Some(self.loader.load(&descriptor));
            }
        }

        let dt = self.config.tick.as_secs_f32();
        let mut draw = Vec::new();

        if let Some(instance) = self.instance.as_mut() {
            if let Some(world) = instance.world_mut() {
                world.step(dt);
            }
            if instance.is_active() {
                self.loader.tick(instance, dt);
                draw = self.loader.render(instance);
            }
        }

        self.ticks += 1;
        Frame {
            tick: self.ticks,
            plugin: self.instance.as_ref().map(|i| i.name().to_string()),
            status: self
                .instance
                .as_ref()
                .map_or(PluginStatus::Unloaded, |i| i.status()),
            diagnostic: self
                .instance
                .as_ref()
                .and_then(|i| i.diagnostic())
                .map(str::to_string),
            draw,
            plugins: self.plugin_names(),
        }
    }

    /// Drive the loop at the configured cadence until a shutdown event,
    /// then stop and join all background threads.
    pub fn run(&mut self, presenter: &mut dyn Presenter) {
        tracing::info!(
            root = %self.config.plugin_root.display(),
            plugins = self.descriptors.len(),
            "host loop started"
        );

        while !self.shutdown_requested {
            let started = Instant::now();

            let events = presenter.poll_events();
            let frame = self.tick_once(events);
            presenter.present(&frame);

            // Fixed cadence; under load the loop simply runs slower, the
            // simulation step stays at the configured interval.
            if let Some(remaining) = self.config.tick.checked_sub(started.elapsed()) {
                std::thread::sleep(remaining);
            }
        }

        self.shutdown();
    }

    /// Stop the watcher and join outstanding patch workers.
    pub fn shutdown(&mut self) {
        self.watcher.stop();
        self.pipeline.shutdown();
        tracing::info!(ticks = self.ticks, "host loop stopped");
    }
}

impl std::fmt::Debug for HostLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostLoop")
            .field("config", &self.config)
            .field("plugins", &self.descriptors.len())
            .field("instance", &self.instance)
            .field("ticks", &self.ticks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ENTRY_FILE;
    use std::path::Path;

    const PENDULUM: &str = r#"
        fn setup(world) {
            let rod = world.spawn_dynamic(400.0, 300.0, 3.14);
            world.add_segment(rod, 0.0, 0.0, 0.0, 100.0, 5.0);
            world.pin_to_world(rod, 400.0, 300.0);
            #{ rod: rod }
        }
        fn update(state, world, dt) { state }
        fn draw(state, surface) {
            surface.circle(surface.body_x(state.rod), surface.body_y(state.rod), 5.0);
        }
    "#;

    fn write_plugin(root: &Path, name: &str, source: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        // Pre-trimmed so an echoed patch payload is byte-identical.
        std::fs::write(dir.join(ENTRY_FILE), source.trim()).unwrap();
    }

    fn stub_generator() -> Arc<dyn CodeGenerator> {
        Arc::new(|source: &str, _: &str| Ok(format!("```rhai\n{source}\n```")))
    }

    fn host_over(root: &Path) -> HostLoop {
        HostLoop::new(
            HostConfig::new().with_plugin_root(root),
            stub_generator(),
        )
        .unwrap()
    }

    #[test]
    fn test_autoloads_first_plugin() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "pendulum", PENDULUM);

        let host = host_over(tmp.path());
        let instance = host.instance().unwrap();
        assert_eq!(instance.name(), "pendulum");
        assert!(instance.is_active());
    }

    #[test]
    fn test_tick_produces_draw_commands() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "pendulum", PENDULUM);

        let mut host = host_over(tmp.path());
        let frame = host.tick_once(Vec::new());

        assert_eq!(frame.tick, 1);
        assert_eq!(frame.status, PluginStatus::Active);
        assert_eq!(frame.draw.len(), 1);
        assert_eq!(frame.plugins, vec!["pendulum".to_string()]);
        host.shutdown();
    }

    #[test]
    fn test_select_event_switches_plugin() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "apple", PENDULUM);
        write_plugin(tmp.path(), "mango", PENDULUM);

        let mut host = host_over(tmp.path());
        assert_eq!(host.instance().unwrap().name(), "apple");

        let frame = host.tick_once(vec![HostEvent::Select("mango".to_string())]);
        assert_eq!(frame.plugin.as_deref(), Some("mango"));
        host.shutdown();
    }

    #[test]
    fn test_selecting_unknown_plugin_keeps_current() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "pendulum", PENDULUM);

        let mut host = host_over(tmp.path());
        let frame = host.tick_once(vec![HostEvent::Select("ghost".to_string())]);
        assert_eq!(frame.plugin.as_deref(), Some("pendulum"));
        assert_eq!(frame.status, PluginStatus::Active);
        host.shutdown();
    }

    #[test]
    fn test_reload_signal_reloads_selected_plugin() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "pendulum", PENDULUM);

        let mut host = host_over(tmp.path());
        let first_generation = host.instance().unwrap().generation();

        host.signal.raise();
        host.tick_once(Vec::new());

        assert!(host.instance().unwrap().generation() > first_generation);
        host.shutdown();
    }

    #[test]
    fn test_failed_reload_leaves_no_running_plugin() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "pendulum", PENDULUM);

        let mut host = host_over(tmp.path());
        assert!(host.instance().unwrap().is_active());

        std::fs::write(
            tmp.path().join("pendulum").join(ENTRY_FILE),
            "fn setup(world) { throw \"bad edit\"; }\nfn update(state, world, dt) { state }\nfn draw(state, surface) {}",
        )
        .unwrap();
        host.signal.raise();
        let frame = host.tick_once(Vec::new());

        assert_eq!(frame.status, PluginStatus::Failed);
        assert!(frame.diagnostic.unwrap().contains("bad edit"));
        assert!(frame.draw.is_empty());
        host.shutdown();
    }

    #[test]
    fn test_patch_event_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "pendulum", PENDULUM);
        let entry = tmp.path().join("pendulum").join(ENTRY_FILE);
        let original = std::fs::read_to_string(&entry).unwrap();

        let mut host = host_over(tmp.path());
        host.tick_once(vec![HostEvent::RequestPatch("balance it".to_string())]);
        host.pipeline.shutdown();

        // Echo generator: the file survives byte-identical.
        assert_eq!(std::fs::read_to_string(&entry).unwrap(), original);
        host.shutdown();
    }

    #[test]
    fn test_empty_root_yields_unloaded_frames() {
        let tmp = tempfile::tempdir().unwrap();
        let mut host = host_over(tmp.path());

        let frame = host.tick_once(Vec::new());
        assert_eq!(frame.status, PluginStatus::Unloaded);
        assert!(frame.plugin.is_none());
        assert!(frame.plugins.is_empty());
        host.shutdown();
    }

    #[test]
    fn test_run_stops_on_shutdown_event() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "pendulum", PENDULUM);

        struct OneShot {
            frames: u64,
        }
        impl Presenter for OneShot {
            fn poll_events(&mut self) -> Vec<HostEvent> {
                if self.frames >= 3 {
                    vec![HostEvent::Shutdown]
                } else {
                    Vec::new()
                }
            }
            fn present(&mut self, _frame: &Frame) {
                self.frames += 1;
            }
        }

        let mut host = HostLoop::new(
            HostConfig::new()
                .with_plugin_root(tmp.path())
                .with_tick(Duration::from_millis(1)),
            stub_generator(),
        )
        .unwrap();

        let mut presenter = OneShot { frames: 0 };
        host.run(&mut presenter);
        assert!(presenter.frames >= 4);
    }
}
