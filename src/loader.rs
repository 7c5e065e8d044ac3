//! Plugin loading and per-tick hook dispatch.
//!
//! [`PluginLoader::load`] is a true reload: every call builds a fresh
//! [`PhysicsWorld`] and compiles the entry file from disk, so edited
//! source always takes effect on the next load. Failures never escape
//! the instance boundary.

use crate::error::Result;
use crate::physics::PhysicsWorld;
use crate::plugin::{GameRuntime, PluginDescriptor, PluginInstance};
use crate::script::{DrawCommand, GameScript};

/// Configuration for the plugin loader.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Gravity for every world built by this loader.
    ///
    /// Screen coordinates, y-down; the default pulls toward positive y.
    pub gravity: (f32, f32),
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self { gravity: (0.0, 900.0) }
    }
}

impl LoaderConfig {
    /// Create a new loader configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the gravity vector.
    pub fn with_gravity(mut self, x: f32, y: f32) -> Self {
        self.gravity = (x, y);
        self
    }
}

/// Loads plugins against fresh physics worlds and drives their hooks.
pub struct PluginLoader {
    config: LoaderConfig,
    loads: u64,
}

impl PluginLoader {
    /// Create a new plugin loader.
    pub fn new(config: LoaderConfig) -> Self {
        Self { config, loads: 0 }
    }

    /// Create with default configuration.
    pub fn default_config() -> Self {
        Self::new(LoaderConfig::default())
    }

    /// Get the loader configuration.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Total load attempts made by this loader.
    pub fn load_count(&self) -> u64 {
        self.loads
    }

    /// Load (or reload) a plugin against a brand-new world.
    ///
    /// On any failure during compile, hook verification, or `setup`, the
    /// returned instance is Failed with the diagnostic captured verbatim
    /// and the world from the attempt dropped. A previously Active
    /// instance is not restored: a failed reload leaves no running plugin.
    pub fn load(&mut self, descriptor: &PluginDescriptor) -> PluginInstance {
        self.loads += 1;
        let mut instance = PluginInstance::loading(descriptor.clone(), self.loads);

        tracing::info!(plugin = %descriptor.name, generation = self.loads, "loading plugin");

        match self.try_load(descriptor) {
            Ok(runtime) => {
                tracing::info!(
                    plugin = %descriptor.name,
                    bodies = runtime.world().body_count(),
                    joints = runtime.world().joint_count(),
                    "plugin active"
                );
                instance.activate(runtime);
            }
            Err(err) => {
                let diagnostic = err.to_string();
                tracing::warn!(plugin = %descriptor.name, error = %diagnostic, "load failed");
                instance.fail(diagnostic);
            }
        }

        instance
    }

    fn try_load(&self, descriptor: &PluginDescriptor) -> Result<GameRuntime> {
        let world = PhysicsWorld::new(self.config.gravity);
        let mut script = GameScript::compile(&descriptor.name, &descriptor.entry)?;

        let state = script.call_setup()?;
        let commands = script.drain_commands();

        let mut runtime = GameRuntime::new(script, state, world);
        runtime.apply_commands(commands);
        Ok(runtime)
    }

    /// Call the plugin's `update` hook with the tick interval.
    ///
    /// A hook error is swallowed and the instance stays Active with a
    /// stale-but-intact world. A given failure message is logged at most
    /// once; the memo clears on the next successful call.
    pub fn tick(&self, instance: &mut PluginInstance, dt: f32) {
        let Some(runtime) = instance.runtime_mut() else {
            return;
        };

        runtime.sync_poses();
        let state = runtime.state();
        let result = runtime.script_mut().call_update(state, dt as f64);

        match result {
            Ok(new_state) => {
                runtime.set_state(new_state);
                let commands = runtime.script_mut().drain_commands();
                runtime.apply_commands(commands);
                *instance.update_error_memo() = None;
            }
            Err(err) => {
                let message = err.to_string();
                let memo = instance.update_error_memo();
                if memo.as_deref() != Some(message.as_str()) {
                    tracing::warn!(error = %message, "update hook failed, continuing with stale world");
                    *memo = Some(message);
                }
            }
        }
    }

    /// Call the plugin's `draw` hook and return the recorded primitives.
    ///
    /// Same swallow-with-one-log policy as [`tick`](Self::tick); a failing
    /// draw yields an empty frame.
    pub fn render(&self, instance: &mut PluginInstance) -> Vec<DrawCommand> {
        let Some(runtime) = instance.runtime_mut() else {
            return Vec::new();
        };

        runtime.sync_poses();
        let state = runtime.state();
        let result = runtime.script_mut().call_draw(state);

        match result {
            Ok(()) => {
                // Draw must not mutate simulation state; discard anything a
                // misbehaving script recorded through a captured world proxy.
                runtime.script_mut().drain_commands();
                let draws = runtime.script_mut().drain_draws();
                *instance.draw_error_memo() = None;
                draws
            }
            Err(err) => {
                let message = err.to_string();
                let memo = instance.draw_error_memo();
                if memo.as_deref() != Some(message.as_str()) {
                    tracing::warn!(error = %message, "draw hook failed, frame skipped");
                    *memo = Some(message);
                }
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLoader")
            .field("config", &self.config)
            .field("loads", &self.loads)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginStatus;
    use crate::registry::ENTRY_FILE;
    use std::path::Path;

    fn write_plugin(root: &Path, name: &str, source: &str) -> PluginDescriptor {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let entry = dir.join(ENTRY_FILE);
        std::fs::write(&entry, source).unwrap();
        PluginDescriptor {
            name: name.to_string(),
            path: dir,
            entry,
            valid: true,
        }
    }

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

    #[test]
    fn test_load_pendulum_is_active() {
        let tmp = tempfile::tempdir().unwrap();
        let descriptor = write_plugin(tmp.path(), "pendulum", PENDULUM);

        let mut loader = PluginLoader::default_config();
        let instance = loader.load(&descriptor);

        assert_eq!(instance.status(), PluginStatus::Active);
        let world = instance.world().unwrap();
        assert_eq!(world.body_count(), 1);
        assert_eq!(world.joint_count(), 1);
    }

    #[test]
    fn test_setup_failure_is_failed_without_world() {
        let tmp = tempfile::tempdir().unwrap();
        let descriptor = write_plugin(
            tmp.path(),
            "broken",
            r#"
                fn setup(world) { throw "no such level"; }
                fn update(state, world, dt) { state }
                fn draw(state, surface) {}
            "#,
        );

        let mut loader = PluginLoader::default_config();
        let instance = loader.load(&descriptor);

        assert_eq!(instance.status(), PluginStatus::Failed);
        assert!(instance.world().is_none());
        assert!(instance.diagnostic().unwrap().contains("no such level"));
    }

    #[test]
    fn test_missing_entry_file_is_failed() {
        let descriptor = PluginDescriptor {
            name: "ghost".to_string(),
            path: "/nonexistent".into(),
            entry: "/nonexistent/game.rhai".into(),
            valid: false,
        };

        let mut loader = PluginLoader::default_config();
        let instance = loader.load(&descriptor);
        assert_eq!(instance.status(), PluginStatus::Failed);
    }

    #[test]
    fn test_update_failure_keeps_instance_active() {
        let tmp = tempfile::tempdir().unwrap();
        let descriptor = write_plugin(
            tmp.path(),
            "flaky",
            r#"
                fn setup(world) { #{} }
                fn update(state, world, dt) { throw "wobble"; }
                fn draw(state, surface) { surface.circle(0.0, 0.0, 1.0); }
            "#,
        );

        let mut loader = PluginLoader::default_config();
        let mut instance = loader.load(&descriptor);
        assert!(instance.is_active());

        loader.tick(&mut instance, 1.0 / 60.0);
        assert!(instance.is_active());

        // Draw still runs on the same tick despite the update failure.
        let draws = loader.render(&mut instance);
        assert_eq!(draws.len(), 1);

        // And update is attempted again on the next tick.
        loader.tick(&mut instance, 1.0 / 60.0);
        assert!(instance.is_active());
    }

    #[test]
    fn test_reload_is_deterministic() {
        let tmp = tempfile::tempdir().unwrap();
        let descriptor = write_plugin(tmp.path(), "pendulum", PENDULUM);

        let mut loader = PluginLoader::default_config();
        let first = loader.load(&descriptor);
        let second = loader.load(&descriptor);

        assert_eq!(
            first.world().unwrap().body_count(),
            second.world().unwrap().body_count()
        );
        assert_eq!(
            first.world().unwrap().joint_count(),
            second.world().unwrap().joint_count()
        );
        assert!(second.generation() > first.generation());
    }

    #[test]
    fn test_reload_picks_up_edited_source() {
        let tmp = tempfile::tempdir().unwrap();
        let descriptor = write_plugin(tmp.path(), "evolving", PENDULUM);

        let mut loader = PluginLoader::default_config();
        let first = loader.load(&descriptor);
        assert_eq!(first.world().unwrap().body_count(), 1);

        let two_bodies = r#"
            fn setup(world) {
                let a = world.spawn_dynamic(0.0, 0.0, 0.0);
                world.add_ball(a, 5.0);
                let b = world.spawn_dynamic(50.0, 0.0, 0.0);
                world.add_ball(b, 5.0);
                #{ a: a, b: b }
            }
            fn update(state, world, dt) { state }
            fn draw(state, surface) {}
        "#;
        std::fs::write(&descriptor.entry, two_bodies).unwrap();

        let second = loader.load(&descriptor);
        assert_eq!(second.world().unwrap().body_count(), 2);
    }
}
