//! Rapier3D 物理后端
//!
//! | 接口概念 | Rapier |
//! |---------|--------|
//! | 物理世界 | PhysicsPipeline + RigidBodySet + ColliderSet + ImpulseJointSet |
//! | 刚体 | RigidBody + Collider |
//! | 6 自由度弹簧关节 | GenericJoint（limits + motors） |
//! | 软体 | 不支持 |

use glam::{Mat4, Quat, Vec3};
use rapier3d::na::{Quaternion, Translation3, UnitQuaternion};
use rapier3d::prelude::*;
use std::num::NonZeroUsize;

use super::config::{get_config, PhysicsConfig};
use super::engine::{
    BodyId, JointDescriptor, JointId, PhysicsEngine, RigidBodyDescriptor, RigidBodyShape,
    RigidBodyTransformType, SoftBodyDescriptor, SoftBodyId, SoftBodyVertex,
};
use crate::{MmdError, Result};

/// 关节限制视为相等的阈值
const LIMIT_EPSILON: f32 = 1.0e-4;

struct BodySlot {
    handle: RigidBodyHandle,
    initial: Mat4,
    /// 创建时的类型，取消运动学时恢复
    dynamic: bool,
}

/// Rapier 物理世界
pub struct MmdPhysics {
    physics_pipeline: PhysicsPipeline,
    integration_parameters: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    bodies: Vec<Option<BodySlot>>,
    joints: Vec<Option<ImpulseJointHandle>>,
    config: PhysicsConfig,
    gravity: Vector<Real>,
}

impl MmdPhysics {
    /// 以当前全局配置创建物理世界
    pub fn new() -> Self {
        Self::with_config(get_config())
    }

    pub fn with_config(config: PhysicsConfig) -> Self {
        let mut rigid_body_set = RigidBodySet::new();
        let mut collider_set = ColliderSet::new();

        if config.ground_enabled {
            let ground = RigidBodyBuilder::fixed()
                .translation(vector![0.0, -50.0, 0.0])
                .build();
            let ground_handle = rigid_body_set.insert(ground);
            let ground_collider = ColliderBuilder::cuboid(1000.0, 50.0, 1000.0).build();
            collider_set.insert_with_parent(ground_collider, ground_handle, &mut rigid_body_set);
        }

        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = 1.0 / config.physics_fps.max(1.0);
        integration_parameters.num_solver_iterations =
            NonZeroUsize::new(config.solver_iterations).unwrap_or(NonZeroUsize::MIN);
        integration_parameters.num_internal_pgs_iterations = config.pgs_iterations;
        integration_parameters.normalized_max_corrective_velocity = config.max_corrective_velocity;

        if config.debug_log {
            log::info!(
                "[物理配置] FPS={}, 重力Y={}, 求解器迭代={}, PGS迭代={}",
                config.physics_fps,
                config.gravity_y,
                config.solver_iterations,
                config.pgs_iterations
            );
        }

        Self {
            physics_pipeline: PhysicsPipeline::new(),
            integration_parameters,
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set,
            collider_set,
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            bodies: Vec::new(),
            joints: Vec::new(),
            gravity: vector![0.0, config.gravity_y, 0.0],
            config,
        }
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = vector![gravity.x, gravity.y, gravity.z];
    }

    pub fn rigid_body_count(&self) -> usize {
        self.bodies.iter().flatten().count()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.iter().flatten().count()
    }

    fn slot(&self, body: BodyId) -> Option<&BodySlot> {
        self.bodies.get(body.0 as usize).and_then(Option::as_ref)
    }

    fn rigid_body(&self, body: BodyId) -> Option<&RigidBody> {
        let handle = self.slot(body)?.handle;
        self.rigid_body_set.get(handle)
    }

    fn rigid_body_mut(&mut self, body: BodyId) -> Option<&mut RigidBody> {
        let handle = self.slot(body)?.handle;
        self.rigid_body_set.get_mut(handle)
    }

    fn build_collider(&self, descriptor: &RigidBodyDescriptor) -> Collider {
        let shape = match descriptor.shape {
            RigidBodyShape::Sphere { radius } => SharedShape::ball(radius),
            RigidBodyShape::Box { half_extents } => {
                SharedShape::cuboid(half_extents.x, half_extents.y, half_extents.z)
            }
            RigidBodyShape::Capsule { radius, height } => SharedShape::capsule_y(height * 0.5, radius),
        };
        let groups = InteractionGroups::new(
            Group::from_bits_truncate(1 << (descriptor.collision_group.min(15) as u32)),
            Group::from_bits_truncate(descriptor.collision_mask as u32),
        );
        let builder = ColliderBuilder::new(shape)
            .restitution(descriptor.restitution)
            .friction(descriptor.friction)
            .collision_groups(groups)
            .solver_groups(groups);
        if descriptor.transform_type == RigidBodyTransformType::FromBoneToSimulation {
            builder.density(0.0).build()
        } else {
            builder.mass(descriptor.mass * self.config.mass_scale).build()
        }
    }

    /// 6 自由度弹簧：上下限相等的线性轴锁定，角度轴用限制与电机
    fn build_joint(&self, descriptor: &JointDescriptor, frame_a: Mat4, frame_b: Mat4) -> GenericJoint {
        let config = &self.config;
        let linear_axes = [
            (JointAxis::LinX, JointAxesMask::LIN_X, 0),
            (JointAxis::LinY, JointAxesMask::LIN_Y, 1),
            (JointAxis::LinZ, JointAxesMask::LIN_Z, 2),
        ];
        let mut locked = JointAxesMask::empty();
        for &(_, mask, i) in &linear_axes {
            if (descriptor.linear_upper[i] - descriptor.linear_lower[i]).abs() < LIMIT_EPSILON {
                locked |= mask;
            }
        }
        let mut joint = GenericJointBuilder::new(locked)
            .local_frame1(mat4_to_isometry(frame_a))
            .local_frame2(mat4_to_isometry(frame_b))
            .build();
        joint.contacts_enabled = false;

        for &(axis, mask, i) in &linear_axes {
            if locked.contains(mask) {
                continue;
            }
            let (lower, upper) = (descriptor.linear_lower[i], descriptor.linear_upper[i]);
            if lower <= upper {
                joint.set_limits(axis, [lower, upper]);
            }
            let stiffness = descriptor.linear_stiffness[i] * config.linear_spring_stiffness_scale;
            if stiffness != 0.0 {
                let damping = (stiffness * config.linear_spring_damping_factor).abs().sqrt();
                joint.set_motor(axis, 0.0, 0.0, stiffness, damping);
            }
        }

        // 上下限相等时给一个小范围，[0, 0] 会完全锁死
        const MIN_ANGULAR_RANGE: f32 = 0.1;
        let angular_axes = [(JointAxis::AngX, 0), (JointAxis::AngY, 1), (JointAxis::AngZ, 2)];
        for &(axis, i) in &angular_axes {
            let (lower, upper) = (descriptor.angular_lower[i], descriptor.angular_upper[i]);
            if lower <= upper {
                if (upper - lower).abs() < LIMIT_EPSILON {
                    joint.set_limits(axis, [lower - MIN_ANGULAR_RANGE, lower + MIN_ANGULAR_RANGE]);
                } else {
                    joint.set_limits(axis, [lower, upper]);
                }
            }
            let stiffness = descriptor.angular_stiffness[i] * config.angular_spring_stiffness_scale;
            if stiffness != 0.0 {
                let damping = (stiffness * config.angular_spring_damping_factor).abs().sqrt();
                joint.set_motor(axis, 0.0, 0.0, stiffness, damping);
            }
        }
        joint
    }

    fn step_once(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
    }

    /// 限制刚体速度，防止穿透后弹飞
    fn clamp_velocities(&mut self) {
        let max_linear = self.config.max_linear_velocity;
        let max_angular = self.config.max_angular_velocity;
        for slot in self.bodies.iter().flatten() {
            let Some(rb) = self.rigid_body_set.get_mut(slot.handle) else {
                continue;
            };
            if !rb.is_dynamic() {
                continue;
            }
            let linvel = *rb.linvel();
            let speed = linvel.norm();
            if speed > max_linear {
                rb.set_linvel(linvel * (max_linear / speed), true);
            }
            let angvel = *rb.angvel();
            let speed = angvel.norm();
            if speed > max_angular {
                rb.set_angvel(angvel * (max_angular / speed), true);
            }
        }
    }
}

impl Default for MmdPhysics {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsEngine for MmdPhysics {
    fn create_rigid_body(&mut self, descriptor: &RigidBodyDescriptor) -> Result<BodyId> {
        if !descriptor.mass.is_finite() || !descriptor.origin.is_finite() {
            return Err(MmdError::Physics(format!("刚体参数无效: {}", descriptor.name)));
        }
        let initial = descriptor.initial_transform();
        let dynamic = descriptor.transform_type != RigidBodyTransformType::FromBoneToSimulation;
        let body_type = if dynamic {
            RigidBodyType::Dynamic
        } else {
            RigidBodyType::KinematicPositionBased
        };
        let rb = RigidBodyBuilder::new(body_type)
            .position(mat4_to_isometry(initial))
            .linear_damping(descriptor.linear_damping * self.config.linear_damping_scale)
            .angular_damping(descriptor.angular_damping * self.config.angular_damping_scale)
            .ccd_enabled(false)
            .can_sleep(false)
            .enabled(false)
            .build();
        let handle = self.rigid_body_set.insert(rb);
        let collider = self.build_collider(descriptor);
        self.collider_set
            .insert_with_parent(collider, handle, &mut self.rigid_body_set);

        let id = BodyId(self.bodies.len() as u32);
        self.bodies.push(Some(BodySlot {
            handle,
            initial,
            dynamic,
        }));
        if self.config.debug_log {
            log::debug!(
                "[刚体] {:?} '{}': 动态={}, 骨骼={}, 质量={}",
                id,
                descriptor.name,
                dynamic,
                descriptor.bone_index,
                descriptor.mass
            );
        }
        Ok(id)
    }

    fn destroy_rigid_body(&mut self, body: BodyId) {
        if let Some(slot) = self.bodies.get_mut(body.0 as usize).and_then(Option::take) {
            self.rigid_body_set.remove(
                slot.handle,
                &mut self.island_manager,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                true,
            );
        }
    }

    fn add_rigid_body(&mut self, body: BodyId) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.set_enabled(true);
        }
    }

    fn remove_rigid_body(&mut self, body: BodyId) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.set_enabled(false);
        }
    }

    fn disable_deactivation(&mut self, body: BodyId) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.activation_mut().sleeping = false;
            rb.wake_up(true);
        }
    }

    fn create_joint(
        &mut self,
        descriptor: &JointDescriptor,
        body_a: BodyId,
        body_b: BodyId,
    ) -> Result<JointId> {
        if !self.config.joints_enabled {
            return Err(MmdError::Physics(format!("关节已禁用: {}", descriptor.name)));
        }
        let (Some(slot_a), Some(slot_b)) = (self.slot(body_a), self.slot(body_b)) else {
            return Err(MmdError::Physics(format!("关节端点无效: {}", descriptor.name)));
        };
        let (handle_a, handle_b) = (slot_a.handle, slot_b.handle);
        let joint_world = descriptor.world_transform();
        let frame_a = slot_a.initial.inverse() * joint_world;
        let frame_b = slot_b.initial.inverse() * joint_world;
        let joint = self.build_joint(descriptor, frame_a, frame_b);
        let handle = self.impulse_joint_set.insert(handle_a, handle_b, joint, true);
        let id = JointId(self.joints.len() as u32);
        self.joints.push(Some(handle));
        Ok(id)
    }

    fn destroy_joint(&mut self, joint: JointId) {
        if let Some(handle) = self.joints.get_mut(joint.0 as usize).and_then(Option::take) {
            self.impulse_joint_set.remove(handle, true);
        }
    }

    fn create_soft_body(&mut self, descriptor: &SoftBodyDescriptor) -> Result<SoftBodyId> {
        Err(MmdError::Physics(format!(
            "Rapier 后端不支持软体: {}",
            descriptor.name
        )))
    }

    fn destroy_soft_body(&mut self, _body: SoftBodyId) {}

    fn soft_body_vertices(&self, _body: SoftBodyId) -> Vec<SoftBodyVertex> {
        Vec::new()
    }

    /// 固定步长；步数超过上限时，最后一步消化剩余时间
    fn step_simulation(&mut self, delta: f32) {
        if delta <= 0.0 {
            return;
        }
        let fixed_dt = 1.0 / self.config.physics_fps.max(1.0);
        let max_steps = self.config.max_substep_count.max(1);
        let needed_steps = (delta / fixed_dt).ceil() as i32;
        if needed_steps <= max_steps {
            for _ in 0..needed_steps {
                self.step_once(fixed_dt);
            }
        } else {
            let fixed_steps = max_steps - 1;
            for _ in 0..fixed_steps {
                self.step_once(fixed_dt);
            }
            self.step_once(delta - fixed_steps as f32 * fixed_dt);
        }
        self.clamp_velocities();
    }

    fn world_transform(&self, body: BodyId) -> Mat4 {
        self.rigid_body(body)
            .map(|rb| isometry_to_mat4(rb.position()))
            .unwrap_or(Mat4::IDENTITY)
    }

    fn set_world_transform(&mut self, body: BodyId, transform: Mat4) {
        if let Some(rb) = self.rigid_body_mut(body) {
            let pose = mat4_to_isometry(transform);
            if rb.is_kinematic() {
                rb.set_next_kinematic_position(pose);
            }
            rb.set_position(pose, true);
        }
    }

    fn initial_transform(&self, body: BodyId) -> Mat4 {
        self.slot(body).map(|slot| slot.initial).unwrap_or(Mat4::IDENTITY)
    }

    fn apply_torque_impulse(&mut self, body: BodyId, torque: Vec3) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.apply_torque_impulse(vector![torque.x, torque.y, torque.z], true);
        }
    }

    fn apply_velocity_impulse(&mut self, body: BodyId, velocity: Vec3) {
        if let Some(rb) = self.rigid_body_mut(body) {
            let linvel = *rb.linvel() + vector![velocity.x, velocity.y, velocity.z];
            rb.set_linvel(linvel, true);
        }
    }

    fn set_kinematic(&mut self, body: BodyId, kinematic: bool) {
        let Some(dynamic) = self.slot(body).map(|slot| slot.dynamic) else {
            return;
        };
        if let Some(rb) = self.rigid_body_mut(body) {
            let body_type = if kinematic || !dynamic {
                RigidBodyType::KinematicPositionBased
            } else {
                RigidBodyType::Dynamic
            };
            rb.set_body_type(body_type, true);
        }
    }

    fn is_kinematic(&self, body: BodyId) -> bool {
        self.rigid_body(body).map(RigidBody::is_kinematic).unwrap_or(false)
    }

    fn reset_states(&mut self, body: BodyId) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.set_linvel(vector![0.0, 0.0, 0.0], false);
            rb.set_angvel(vector![0.0, 0.0, 0.0], false);
            rb.reset_forces(false);
            rb.reset_torques(false);
        }
    }

    fn set_active(&mut self, body: BodyId) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.wake_up(true);
        }
    }
}

/// glam Mat4 -> Rapier Isometry
pub fn mat4_to_isometry(mat: Mat4) -> Isometry<Real> {
    let (_, rotation, translation) = mat.to_scale_rotation_translation();
    Isometry::from_parts(
        Translation3::new(translation.x, translation.y, translation.z),
        UnitQuaternion::new_normalize(Quaternion::new(rotation.w, rotation.x, rotation.y, rotation.z)),
    )
}

/// Rapier Isometry -> glam Mat4
pub fn isometry_to_mat4(iso: &Isometry<Real>) -> Mat4 {
    let t = iso.translation.vector;
    let q = iso.rotation;
    Mat4::from_rotation_translation(Quat::from_xyzw(q.i, q.j, q.k, q.w), Vec3::new(t.x, t.y, t.z))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PhysicsConfig {
        PhysicsConfig {
            ground_enabled: false,
            ..PhysicsConfig::default()
        }
    }

    #[test]
    fn test_isometry_conversion() {
        let m = Mat4::from_rotation_translation(Quat::from_rotation_y(0.7), Vec3::new(1.0, 2.0, 3.0));
        let back = isometry_to_mat4(&mat4_to_isometry(m));
        assert!(back.abs_diff_eq(m, 1e-5));
    }

    #[test]
    fn test_dynamic_body_falls_under_gravity() {
        let mut physics = MmdPhysics::with_config(config());
        let mut descriptor = RigidBodyDescriptor::new("球", -1, RigidBodyShape::Sphere { radius: 0.5 });
        descriptor.origin = Vec3::new(0.0, 10.0, 0.0);
        descriptor.transform_type = RigidBodyTransformType::FromSimulationToBone;
        let body = physics.create_rigid_body(&descriptor).unwrap();
        physics.add_rigid_body(body);
        assert!(!physics.is_kinematic(body));

        physics.step_simulation(1.0 / 30.0);
        let y = physics.world_transform(body).w_axis.y;
        assert!(y < 10.0);
        assert_eq!(physics.initial_transform(body).w_axis.y, 10.0);
    }

    #[test]
    fn test_kinematic_switch_and_soft_body_rejected() {
        let mut physics = MmdPhysics::with_config(config());
        let mut descriptor = RigidBodyDescriptor::new("髪", -1, RigidBodyShape::Capsule { radius: 0.2, height: 1.0 });
        descriptor.transform_type = RigidBodyTransformType::FromSimulationToBone;
        let body = physics.create_rigid_body(&descriptor).unwrap();
        physics.set_kinematic(body, true);
        assert!(physics.is_kinematic(body));
        physics.set_kinematic(body, false);
        assert!(!physics.is_kinematic(body));

        let soft = SoftBodyDescriptor {
            name: "布".into(),
            material_index: 0,
            vertex_indices: vec![0],
            total_mass: 1.0,
            collision_margin: 0.0,
        };
        assert!(matches!(physics.create_soft_body(&soft), Err(MmdError::Physics(_))));
    }

    #[test]
    fn test_joint_between_bodies() {
        let mut physics = MmdPhysics::with_config(config());
        let shape = RigidBodyShape::Box { half_extents: Vec3::splat(0.5) };
        let a = physics.create_rigid_body(&RigidBodyDescriptor::new("A", -1, shape)).unwrap();
        let mut descriptor_b = RigidBodyDescriptor::new("B", -1, shape);
        descriptor_b.origin = Vec3::new(0.0, -1.0, 0.0);
        descriptor_b.transform_type = RigidBodyTransformType::FromSimulationToBone;
        let b = physics.create_rigid_body(&descriptor_b).unwrap();
        let mut joint = JointDescriptor::new("J", 0, 1);
        joint.angular_lower = Vec3::splat(-0.5);
        joint.angular_upper = Vec3::splat(0.5);
        joint.angular_stiffness = Vec3::splat(10.0);
        physics.create_joint(&joint, a, b).unwrap();
        assert_eq!(physics.joint_count(), 1);
        assert_eq!(physics.rigid_body_count(), 2);

        physics.destroy_rigid_body(b);
        assert_eq!(physics.rigid_body_count(), 1);
        assert_eq!(physics.world_transform(b), Mat4::IDENTITY);
    }
}
