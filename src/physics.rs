//! Ownership wrapper around the 2D rigid-body simulation.
//!
//! A [`PhysicsWorld`] is created fresh for every plugin load and never
//! outlives the instance it was built for. The host steps it with a fixed
//! interval regardless of measured frame time, so simulation stays
//! deterministic across render hiccups.

use rapier2d::prelude::*;

/// A self-contained rapier2d world: bodies, colliders, joints, and the
/// pipeline state needed to step them.
///
/// Screen coordinates, y-down; the default gravity therefore points at
/// positive y.
pub struct PhysicsWorld {
    bodies: RigidBodySet,
    colliders: ColliderSet,
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: BroadPhaseMultiSap,
    narrow_phase: NarrowPhase,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    /// Fixed anchor body that world-pinned joints attach to.
    ground: RigidBodyHandle,
}

impl PhysicsWorld {
    /// Create an empty world with the given gravity vector.
    pub fn new(gravity: (f32, f32)) -> Self {
        let mut bodies = RigidBodySet::new();
        let ground = bodies.insert(RigidBodyBuilder::fixed().build());
        Self {
            bodies,
            colliders: ColliderSet::new(),
            gravity: vector![gravity.0, gravity.1],
            integration_parameters: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseMultiSap::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            ground,
        }
    }

    /// Advance bodies, constraints, and collision resolution by `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
    }

    /// Insert a dynamic body at the given position and rotation.
    pub fn spawn_dynamic(&mut self, x: f32, y: f32, angle: f32) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(vector![x, y])
            .rotation(angle)
            .build();
        self.bodies.insert(body)
    }

    /// Attach a capsule collider spanning two body-local points.
    ///
    /// This is the rod/segment primitive: a thin capsule between the
    /// endpoints, with density-derived mass.
    pub fn add_segment_collider(
        &mut self,
        body: RigidBodyHandle,
        a: (f32, f32),
        b: (f32, f32),
        radius: f32,
    ) {
        let shape = SharedShape::capsule(point![a.0, a.1], point![b.0, b.1], radius);
        let collider = ColliderBuilder::new(shape).density(1.0).build();
        self.colliders
            .insert_with_parent(collider, body, &mut self.bodies);
    }

    /// Attach a ball collider centered on the body origin.
    pub fn add_ball_collider(&mut self, body: RigidBodyHandle, radius: f32) {
        let collider = ColliderBuilder::ball(radius).density(1.0).build();
        self.colliders
            .insert_with_parent(collider, body, &mut self.bodies);
    }

    /// Attach an axis-aligned box collider centered on the body origin.
    pub fn add_box_collider(&mut self, body: RigidBodyHandle, half_x: f32, half_y: f32) {
        let collider = ColliderBuilder::cuboid(half_x, half_y).density(1.0).build();
        self.colliders
            .insert_with_parent(collider, body, &mut self.bodies);
    }

    /// Pin the body's local origin to a fixed world-space point with a
    /// revolute joint. The classic pendulum pivot.
    pub fn pin_to_world(&mut self, body: RigidBodyHandle, x: f32, y: f32) {
        let joint = RevoluteJointBuilder::new()
            .local_anchor1(point![x, y])
            .local_anchor2(point![0.0, 0.0]);
        self.impulse_joints.insert(self.ground, body, joint, true);
    }

    /// Apply an impulse at the body's center of mass.
    pub fn apply_impulse(&mut self, body: RigidBodyHandle, x: f32, y: f32) {
        if let Some(rb) = self.bodies.get_mut(body) {
            rb.apply_impulse(vector![x, y], true);
        }
    }

    /// Position and rotation of a body, or `None` if the handle is stale.
    pub fn body_pose(&self, body: RigidBodyHandle) -> Option<(f32, f32, f32)> {
        self.bodies.get(body).map(|rb| {
            let t = rb.translation();
            (t.x, t.y, rb.rotation().angle())
        })
    }

    /// Number of dynamic bodies registered by the plugin.
    ///
    /// The internal fixed anchor body is excluded.
    pub fn body_count(&self) -> usize {
        self.bodies.iter().filter(|(_, b)| b.is_dynamic()).count()
    }

    /// Number of colliders attached to bodies.
    pub fn collider_count(&self) -> usize {
        self.colliders.len()
    }

    /// Number of impulse joints (pivots and pins).
    pub fn joint_count(&self) -> usize {
        self.impulse_joints.len()
    }
}

impl std::fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("bodies", &self.body_count())
            .field("colliders", &self.collider_count())
            .field("joints", &self.joint_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_world_counts() {
        let world = PhysicsWorld::new((0.0, 900.0));
        assert_eq!(world.body_count(), 0);
        assert_eq!(world.collider_count(), 0);
        assert_eq!(world.joint_count(), 0);
    }

    #[test]
    fn test_pendulum_registration() {
        let mut world = PhysicsWorld::new((0.0, 900.0));
        let rod = world.spawn_dynamic(400.0, 300.0, 3.14);
        world.add_segment_collider(rod, (0.0, 0.0), (0.0, 100.0), 5.0);
        world.pin_to_world(rod, 400.0, 300.0);

        assert_eq!(world.body_count(), 1);
        assert_eq!(world.collider_count(), 1);
        assert_eq!(world.joint_count(), 1);
    }

    #[test]
    fn test_step_moves_free_body() {
        let mut world = PhysicsWorld::new((0.0, 900.0));
        let body = world.spawn_dynamic(0.0, 0.0, 0.0);
        world.add_ball_collider(body, 1.0);

        for _ in 0..60 {
            world.step(1.0 / 60.0);
        }

        let (_, y, _) = world.body_pose(body).unwrap();
        assert!(y > 0.0, "gravity should pull the body down-screen, got y={y}");
    }

    #[test]
    fn test_pinned_body_stays_near_pivot() {
        let mut world = PhysicsWorld::new((0.0, 900.0));
        let rod = world.spawn_dynamic(400.0, 300.0, 0.0);
        world.add_segment_collider(rod, (0.0, 0.0), (0.0, 100.0), 5.0);
        world.pin_to_world(rod, 400.0, 300.0);

        for _ in 0..120 {
            world.step(1.0 / 60.0);
        }

        let (x, y, _) = world.body_pose(rod).unwrap();
        let dist = ((x - 400.0).powi(2) + (y - 300.0).powi(2)).sqrt();
        assert!(dist < 10.0, "pinned origin drifted {dist} from the pivot");
    }

    #[test]
    fn test_stale_handle_pose_is_none() {
        let world_a = {
            let mut w = PhysicsWorld::new((0.0, 900.0));
            let h = w.spawn_dynamic(0.0, 0.0, 0.0);
            (w, h)
        };
        let fresh = PhysicsWorld::new((0.0, 900.0));
        // Handle from another world's generation does not resolve here.
        assert!(fresh.body_pose(world_a.1).is_none());
    }
}
