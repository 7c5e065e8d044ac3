//! Rhai execution layer for game plugins.
//!
//! Every plugin is one `game.rhai` file defining the three hooks:
//!
//! - `setup(world)` — registers bodies, shapes, and constraints; returns the
//!   plugin's state value (typically a map).
//! - `update(state, world, dt)` — once per tick; returns the new state.
//! - `draw(state, surface)` — once per tick after the physics step;
//!   read-only with respect to simulation state.
//!
//! Scripts never touch the physics engine directly. Hook calls run against
//! command-recording proxies ([`WorldApi`], [`SurfaceApi`]); the host drains
//! the recorded commands afterwards and applies them to its own
//! [`PhysicsWorld`](crate::physics::PhysicsWorld). Pose queries are answered
//! from a snapshot the host installs before each call, which is what keeps
//! `draw` read-only by construction.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use rhai::{Dynamic, Engine, Scope, AST};

use crate::error::{Error, Result};

/// Script-side identifier for a spawned body.
pub type BodyId = rhai::INT;

/// The hooks every plugin must define, with their arities.
pub const REQUIRED_HOOKS: [(&str, usize); 3] = [("setup", 1), ("update", 3), ("draw", 2)];

/// A world mutation recorded by a script hook, applied by the host after
/// the call returns.
#[derive(Debug, Clone, PartialEq)]
pub enum WorldCommand {
    /// Insert a dynamic body.
    SpawnDynamic {
        /// Script-side handle for the new body.
        handle: BodyId,
        /// World x.
        x: f32,
        /// World y.
        y: f32,
        /// Initial rotation in radians.
        angle: f32,
    },
    /// Attach a capsule collider between two body-local points.
    AddSegment {
        /// Target body.
        handle: BodyId,
        /// First endpoint, body-local.
        a: (f32, f32),
        /// Second endpoint, body-local.
        b: (f32, f32),
        /// Capsule radius.
        radius: f32,
    },
    /// Attach a ball collider at the body origin.
    AddBall {
        /// Target body.
        handle: BodyId,
        /// Ball radius.
        radius: f32,
    },
    /// Attach a box collider at the body origin.
    AddBox {
        /// Target body.
        handle: BodyId,
        /// Half extent along x.
        half_x: f32,
        /// Half extent along y.
        half_y: f32,
    },
    /// Pin the body origin to a fixed world point.
    PinToWorld {
        /// Target body.
        handle: BodyId,
        /// Pivot x in world space.
        x: f32,
        /// Pivot y in world space.
        y: f32,
    },
    /// Apply an impulse at the body's center of mass.
    ApplyImpulse {
        /// Target body.
        handle: BodyId,
        /// Impulse x.
        x: f32,
        /// Impulse y.
        y: f32,
    },
}

/// A draw primitive recorded by a `draw` hook, handed to the external
/// presenter unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    /// A line segment.
    Line {
        /// Start x.
        x1: f32,
        /// Start y.
        y1: f32,
        /// End x.
        x2: f32,
        /// End y.
        y2: f32,
        /// Stroke width.
        width: f32,
    },
    /// A circle.
    Circle {
        /// Center x.
        x: f32,
        /// Center y.
        y: f32,
        /// Radius.
        radius: f32,
    },
}

#[derive(Default)]
struct ProxyState {
    next_handle: BodyId,
    commands: Vec<WorldCommand>,
    draws: Vec<DrawCommand>,
    poses: HashMap<BodyId, (f32, f32, f32)>,
}

/// Simulation proxy handed to `setup` and `update`.
#[derive(Clone)]
pub struct WorldApi {
    state: Rc<RefCell<ProxyState>>,
}

impl WorldApi {
    fn new(state: Rc<RefCell<ProxyState>>) -> Self {
        Self { state }
    }

    fn spawn_dynamic(&mut self, x: f64, y: f64, angle: f64) -> BodyId {
        let mut state = self.state.borrow_mut();
        let handle = state.next_handle;
        state.next_handle += 1;
        state.commands.push(WorldCommand::SpawnDynamic {
            handle,
            x: x as f32,
            y: y as f32,
            angle: angle as f32,
        });
        handle
    }

    fn add_segment(&mut self, handle: BodyId, ax: f64, ay: f64, bx: f64, by: f64, radius: f64) {
        self.state.borrow_mut().commands.push(WorldCommand::AddSegment {
            handle,
            a: (ax as f32, ay as f32),
            b: (bx as f32, by as f32),
            radius: radius as f32,
        });
    }

    fn add_ball(&mut self, handle: BodyId, radius: f64) {
        self.state
            .borrow_mut()
            .commands
            .push(WorldCommand::AddBall { handle, radius: radius as f32 });
    }

    fn add_box(&mut self, handle: BodyId, half_x: f64, half_y: f64) {
        self.state.borrow_mut().commands.push(WorldCommand::AddBox {
            handle,
            half_x: half_x as f32,
            half_y: half_y as f32,
        });
    }

    fn pin_to_world(&mut self, handle: BodyId, x: f64, y: f64) {
        self.state
            .borrow_mut()
            .commands
            .push(WorldCommand::PinToWorld { handle, x: x as f32, y: y as f32 });
    }

    fn apply_impulse(&mut self, handle: BodyId, x: f64, y: f64) {
        self.state
            .borrow_mut()
            .commands
            .push(WorldCommand::ApplyImpulse { handle, x: x as f32, y: y as f32 });
    }

    fn body_x(&mut self, handle: BodyId) -> f64 {
        self.state.borrow().poses.get(&handle).map_or(0.0, |p| p.0 as f64)
    }

    fn body_y(&mut self, handle: BodyId) -> f64 {
        self.state.borrow().poses.get(&handle).map_or(0.0, |p| p.1 as f64)
    }

    fn body_angle(&mut self, handle: BodyId) -> f64 {
        self.state.borrow().poses.get(&handle).map_or(0.0, |p| p.2 as f64)
    }
}

/// Render proxy handed to `draw`: pose queries plus draw primitives,
/// no world mutation.
#[derive(Clone)]
pub struct SurfaceApi {
    state: Rc<RefCell<ProxyState>>,
}

impl SurfaceApi {
    fn new(state: Rc<RefCell<ProxyState>>) -> Self {
        Self { state }
    }

    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, width: f64) {
        self.state.borrow_mut().draws.push(DrawCommand::Line {
            x1: x1 as f32,
            y1: y1 as f32,
            x2: x2 as f32,
            y2: y2 as f32,
            width: width as f32,
        });
    }

    fn circle(&mut self, x: f64, y: f64, radius: f64) {
        self.state.borrow_mut().draws.push(DrawCommand::Circle {
            x: x as f32,
            y: y as f32,
            radius: radius as f32,
        });
    }

    fn body_x(&mut self, handle: BodyId) -> f64 {
        self.state.borrow().poses.get(&handle).map_or(0.0, |p| p.0 as f64)
    }

    fn body_y(&mut self, handle: BodyId) -> f64 {
        self.state.borrow().poses.get(&handle).map_or(0.0, |p| p.1 as f64)
    }

    fn body_angle(&mut self, handle: BodyId) -> f64 {
        self.state.borrow().poses.get(&handle).map_or(0.0, |p| p.2 as f64)
    }
}

/// Check whether a source text defines all three required hooks.
///
/// Used by the registry's validity probe; the loader re-verifies on its
/// own fresh compile.
pub fn source_defines_hooks(source: &str) -> bool {
    let engine = Engine::new();
    match engine.compile(source) {
        Ok(ast) => REQUIRED_HOOKS.iter().all(|(name, arity)| {
            ast.iter_functions()
                .any(|f| f.name == *name && f.params.len() == *arity)
        }),
        Err(_) => false,
    }
}

/// A compiled plugin script with its engine, AST, and persistent scope.
///
/// Compiling is a full re-read of the entry file, so a fresh `GameScript`
/// always reflects on-disk source.
pub struct GameScript {
    plugin: String,
    engine: Engine,
    ast: AST,
    scope: Scope<'static>,
    shared: Rc<RefCell<ProxyState>>,
}

impl GameScript {
    /// Read and compile the entry file, verifying the three-hook contract.
    pub fn compile(plugin: &str, entry: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(entry)?;
        Self::compile_source(plugin, &source)
    }

    /// Compile from source text directly.
    pub fn compile_source(plugin: &str, source: &str) -> Result<Self> {
        let mut engine = Engine::new();
        engine.set_fast_operators(true);
        register_api(&mut engine);

        let ast = engine
            .compile(source)
            .map_err(|e| Error::compilation(plugin, e.to_string()))?;

        for (name, arity) in REQUIRED_HOOKS {
            let defined = ast
                .iter_functions()
                .any(|f| f.name == name && f.params.len() == arity);
            if !defined {
                return Err(Error::MissingHook { plugin: plugin.to_string(), hook: name });
            }
        }

        let mut scope = Scope::new();
        engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|e| Error::compilation(plugin, e.to_string()))?;

        Ok(Self {
            plugin: plugin.to_string(),
            engine,
            ast,
            scope,
            shared: Rc::new(RefCell::new(ProxyState::default())),
        })
    }

    /// Plugin name this script belongs to.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Install the pose snapshot answered by `body_x`/`body_y`/`body_angle`.
    pub fn set_poses(&mut self, poses: HashMap<BodyId, (f32, f32, f32)>) {
        self.shared.borrow_mut().poses = poses;
    }

    /// Call `setup(world)` and return the plugin's state value.
    pub fn call_setup(&mut self) -> Result<Dynamic> {
        let world = WorldApi::new(self.shared.clone());
        self.engine
            .call_fn::<Dynamic>(&mut self.scope, &self.ast, "setup", (world,))
            .map_err(|e| Error::setup_failed(&self.plugin, e.to_string()))
    }

    /// Call `update(state, world, dt)` and return the new state value.
    pub fn call_update(&mut self, state: Dynamic, dt: f64) -> Result<Dynamic> {
        let world = WorldApi::new(self.shared.clone());
        self.engine
            .call_fn::<Dynamic>(&mut self.scope, &self.ast, "update", (state, world, dt))
            .map_err(|e| Error::hook_failed("update", e.to_string()))
    }

    /// Call `draw(state, surface)`; recorded primitives are drained with
    /// [`drain_draws`](Self::drain_draws).
    pub fn call_draw(&mut self, state: Dynamic) -> Result<()> {
        let surface = SurfaceApi::new(self.shared.clone());
        self.engine
            .call_fn::<Dynamic>(&mut self.scope, &self.ast, "draw", (state, surface))
            .map(|_| ())
            .map_err(|e| Error::hook_failed("draw", e.to_string()))
    }

    /// Take the world commands recorded since the last drain.
    pub fn drain_commands(&mut self) -> Vec<WorldCommand> {
        self.shared.borrow_mut().commands.drain(..).collect()
    }

    /// Take the draw primitives recorded since the last drain.
    pub fn drain_draws(&mut self) -> Vec<DrawCommand> {
        self.shared.borrow_mut().draws.drain(..).collect()
    }
}

impl std::fmt::Debug for GameScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameScript").field("plugin", &self.plugin).finish()
    }
}

fn register_api(engine: &mut Engine) {
    engine.register_type_with_name::<WorldApi>("World");
    engine.register_fn("spawn_dynamic", WorldApi::spawn_dynamic);
    engine.register_fn("add_segment", WorldApi::add_segment);
    engine.register_fn("add_ball", WorldApi::add_ball);
    engine.register_fn("add_box", WorldApi::add_box);
    engine.register_fn("pin_to_world", WorldApi::pin_to_world);
    engine.register_fn("apply_impulse", WorldApi::apply_impulse);
    engine.register_fn("body_x", WorldApi::body_x);
    engine.register_fn("body_y", WorldApi::body_y);
    engine.register_fn("body_angle", WorldApi::body_angle);

    engine.register_type_with_name::<SurfaceApi>("Surface");
    engine.register_fn("line", SurfaceApi::line);
    engine.register_fn("circle", SurfaceApi::circle);
    engine.register_fn("body_x", SurfaceApi::body_x);
    engine.register_fn("body_y", SurfaceApi::body_y);
    engine.register_fn("body_angle", SurfaceApi::body_angle);
}
