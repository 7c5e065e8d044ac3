//! Plugin identity, lifecycle state, and the live instance.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rapier2d::prelude::RigidBodyHandle;
use rhai::Dynamic;

use crate::physics::PhysicsWorld;
use crate::script::{BodyId, GameScript, WorldCommand};

/// Identity of a discoverable plugin, produced by a registry scan.
///
/// Immutable; discarded and rebuilt on every scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    /// Plugin name, derived from the directory name.
    pub name: String,
    /// Plugin package directory.
    pub path: PathBuf,
    /// Entry-point file (`<path>/game.rhai`).
    pub entry: PathBuf,
    /// Whether the entry file compiles and defines all three hooks.
    pub valid: bool,
}

/// Lifecycle state of the live plugin instance.
///
/// ```text
/// Unloaded -> Loading -> {Active, Failed}
/// Active   -> Loading            (on reload request)
/// Failed   -> Loading            (on reload request)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginStatus {
    /// No plugin is loaded.
    Unloaded,
    /// A load attempt is in progress.
    Loading,
    /// Loaded and running; `update`/`draw` are called each tick.
    Active,
    /// The last load attempt failed; no world is live.
    Failed,
}

impl PluginStatus {
    /// Check if per-tick hooks should run.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Check if a (re)load may be started from this state.
    pub fn can_load(&self) -> bool {
        matches!(self, Self::Unloaded | Self::Active | Self::Failed)
    }
}

impl std::fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Active => "active",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// The live payload of an Active instance: the compiled script, the state
/// value returned by `setup`, the physics world built for this load, and
/// the script-handle to body-handle map.
pub struct GameRuntime {
    script: GameScript,
    state: Dynamic,
    world: PhysicsWorld,
    handles: HashMap<BodyId, RigidBodyHandle>,
}

impl GameRuntime {
    /// Bundle a freshly compiled script with its world and initial state.
    pub fn new(script: GameScript, state: Dynamic, world: PhysicsWorld) -> Self {
        Self { script, state, world, handles: HashMap::new() }
    }

    /// Apply recorded world commands against the physics world.
    ///
    /// Commands naming an unknown handle are dropped with a debug log.
    pub fn apply_commands(&mut self, commands: Vec<WorldCommand>) {
        for command in commands {
            match command {
                WorldCommand::SpawnDynamic { handle, x, y, angle } => {
                    let body = self.world.spawn_dynamic(x, y, angle);
                    self.handles.insert(handle, body);
                }
                WorldCommand::AddSegment { handle, a, b, radius } => {
                    if let Some(&body) = self.handles.get(&handle) {
                        self.world.add_segment_collider(body, a, b, radius);
                    } else {
                        tracing::debug!(handle, "add_segment on unknown body, dropped");
                    }
                }
                WorldCommand::AddBall { handle, radius } => {
                    if let Some(&body) = self.handles.get(&handle) {
                        self.world.add_ball_collider(body, radius);
                    } else {
                        tracing::debug!(handle, "add_ball on unknown body, dropped");
                    }
                }
                WorldCommand::AddBox { handle, half_x, half_y } => {
                    if let Some(&body) = self.handles.get(&handle) {
                        self.world.add_box_collider(body, half_x, half_y);
                    } else {
                        tracing::debug!(handle, "add_box on unknown body, dropped");
                    }
                }
                WorldCommand::PinToWorld { handle, x, y } => {
                    if let Some(&body) = self.handles.get(&handle) {
                        self.world.pin_to_world(body, x, y);
                    } else {
                        tracing::debug!(handle, "pin_to_world on unknown body, dropped");
                    }
                }
                WorldCommand::ApplyImpulse { handle, x, y } => {
                    if let Some(&body) = self.handles.get(&handle) {
                        self.world.apply_impulse(body, x, y);
                    } else {
                        tracing::debug!(handle, "apply_impulse on unknown body, dropped");
                    }
                }
            }
        }
    }

    /// Refresh the script's pose snapshot from the physics world.
    pub fn sync_poses(&mut self) {
        let poses = self
            .handles
            .iter()
            .filter_map(|(&id, &body)| self.world.body_pose(body).map(|pose| (id, pose)))
            .collect();
        self.script.set_poses(poses);
    }

    /// The script execution layer.
    pub fn script_mut(&mut self) -> &mut GameScript {
        &mut self.script
    }

    /// The plugin state value, replaced after each `update`.
    pub fn state(&self) -> Dynamic {
        self.state.clone()
    }

    /// Replace the plugin state value.
    pub fn set_state(&mut self, state: Dynamic) {
        self.state = state;
    }

    /// The physics world owned by this load.
    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    /// Mutable access for the host's fixed-interval step.
    pub fn world_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.world
    }
}

impl std::fmt::Debug for GameRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameRuntime")
            .field("plugin", &self.script.plugin())
            .field("world", &self.world)
            .finish()
    }
}

/// The currently loaded plugin: descriptor, status, and (when Active)
/// the [`GameRuntime`] built for this load.
///
/// Exactly one instance is live at a time. A new load unconditionally
/// replaces the previous instance and its world; a Failed attempt keeps
/// no world at all.
pub struct PluginInstance {
    descriptor: PluginDescriptor,
    status: PluginStatus,
    runtime: Option<GameRuntime>,
    diagnostic: Option<String>,
    loaded_at: Instant,
    generation: u64,
    last_update_error: Option<String>,
    last_draw_error: Option<String>,
}

impl PluginInstance {
    /// Start a load attempt for the given descriptor.
    pub fn loading(descriptor: PluginDescriptor, generation: u64) -> Self {
        Self {
            descriptor,
            status: PluginStatus::Loading,
            runtime: None,
            diagnostic: None,
            loaded_at: Instant::now(),
            generation,
            last_update_error: None,
            last_draw_error: None,
        }
    }

    /// Transition to Active with the runtime built for this load.
    pub fn activate(&mut self, runtime: GameRuntime) {
        self.runtime = Some(runtime);
        self.diagnostic = None;
        self.status = PluginStatus::Active;
        self.loaded_at = Instant::now();
    }

    /// Transition to Failed, retaining the diagnostic for display.
    ///
    /// Any world from the attempt is dropped with the runtime.
    pub fn fail(&mut self, diagnostic: String) {
        self.runtime = None;
        self.diagnostic = Some(diagnostic);
        self.status = PluginStatus::Failed;
    }

    /// The descriptor this instance was loaded from.
    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    /// Plugin name.
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Entry-point path.
    pub fn entry(&self) -> &Path {
        &self.descriptor.entry
    }

    /// Current lifecycle state.
    pub fn status(&self) -> PluginStatus {
        self.status
    }

    /// Check if per-tick hooks should run.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Diagnostic text from the last failed load, if any.
    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    /// How many loads the host had performed when this one started.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Time since this instance became live.
    pub fn uptime(&self) -> std::time::Duration {
        self.loaded_at.elapsed()
    }

    /// The physics world, present only while Active.
    pub fn world(&self) -> Option<&PhysicsWorld> {
        self.runtime.as_ref().map(|rt| rt.world())
    }

    /// Mutable physics world for the host's step.
    pub fn world_mut(&mut self) -> Option<&mut PhysicsWorld> {
        self.runtime.as_mut().map(|rt| rt.world_mut())
    }

    pub(crate) fn runtime_mut(&mut self) -> Option<&mut GameRuntime> {
        self.runtime.as_mut()
    }

    pub(crate) fn update_error_memo(&mut self) -> &mut Option<String> {
        &mut self.last_update_error
    }

    pub(crate) fn draw_error_memo(&mut self) -> &mut Option<String> {
        &mut self.last_draw_error
    }
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInstance")
            .field("name", &self.descriptor.name)
            .field("status", &self.status)
            .field("generation", &self.generation)
            .finish()
    }
}
