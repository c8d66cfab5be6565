//! 模型刚体
//!
//! 描述 + 物理句柄 + 冲量 Morph 累积的力，负责骨骼与模拟之间的双向同步。

use glam::{Mat4, Quat, Vec3};

use super::engine::{
    BodyId, PhysicsEngine, RigidBodyDescriptor, RigidBodyFollowBone, RigidBodyTransformType,
};
use crate::skeleton::Bone;
use crate::Result;

/// 模型刚体
#[derive(Clone, Debug)]
pub struct MmdRigidBody {
    pub descriptor: RigidBodyDescriptor,
    handle: Option<BodyId>,
    /// 被冲量 Morph 引用
    morph_bound: bool,
    global_torque: Option<Vec3>,
    local_torque: Option<Vec3>,
    global_velocity: Option<Vec3>,
    local_velocity: Option<Vec3>,
    all_forces_should_reset: bool,
}

impl MmdRigidBody {
    pub fn new(descriptor: RigidBodyDescriptor) -> Self {
        Self {
            descriptor,
            handle: None,
            morph_bound: false,
            global_torque: None,
            local_torque: None,
            global_velocity: None,
            local_velocity: None,
            all_forces_should_reset: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn handle(&self) -> Option<BodyId> {
        self.handle
    }

    pub fn is_morph_bound(&self) -> bool {
        self.morph_bound
    }

    /// 关联骨骼的索引（越界视为无）
    pub fn bone_index(&self, bone_count: usize) -> Option<usize> {
        usize::try_from(self.descriptor.bone_index)
            .ok()
            .filter(|&i| i < bone_count)
    }

    /// 创建物理句柄并加入世界
    pub fn bind(&mut self, engine: &mut dyn PhysicsEngine, morph_bound: bool) -> Result<BodyId> {
        let handle = engine.create_rigid_body(&self.descriptor)?;
        if morph_bound {
            engine.disable_deactivation(handle);
        }
        engine.add_rigid_body(handle);
        self.handle = Some(handle);
        self.morph_bound = morph_bound;
        Ok(handle)
    }

    pub fn destroy(&mut self, engine: &mut dyn PhysicsEngine) {
        if let Some(handle) = self.handle.take() {
            engine.remove_rigid_body(handle);
            engine.destroy_rigid_body(handle);
        }
    }

    pub fn add_global_torque(&mut self, value: Vec3) {
        *self.global_torque.get_or_insert(Vec3::ZERO) += value;
    }

    pub fn add_global_velocity(&mut self, value: Vec3) {
        *self.global_velocity.get_or_insert(Vec3::ZERO) += value;
    }

    pub fn add_local_torque(&mut self, value: Vec3) {
        *self.local_torque.get_or_insert(Vec3::ZERO) += value;
    }

    pub fn add_local_velocity(&mut self, value: Vec3) {
        *self.local_velocity.get_or_insert(Vec3::ZERO) += value;
    }

    /// 下一次施力时改为清空刚体状态
    pub fn mark_all_forces_reset(&mut self) {
        self.all_forces_should_reset = true;
    }

    pub fn has_pending_forces(&self) -> bool {
        self.all_forces_should_reset
            || self.global_torque.is_some()
            || self.local_torque.is_some()
            || self.global_velocity.is_some()
            || self.local_velocity.is_some()
    }

    /// 把累积的冲量交给物理引擎，然后清空
    ///
    /// 局部力按刚体相对骨骼的旋转转换到模型空间。
    pub fn apply_all_forces(&mut self, engine: &mut dyn PhysicsEngine, bones: &[Bone]) {
        let Some(handle) = self.handle else {
            return;
        };
        if self.all_forces_should_reset {
            engine.reset_states(handle);
        } else {
            if let Some(torque) = self.global_torque {
                engine.apply_torque_impulse(handle, torque);
            }
            if let Some(torque) = self.local_torque {
                let rotation = self.local_orientation(engine, handle, bones);
                engine.apply_torque_impulse(handle, rotation * torque);
            }
            if let Some(velocity) = self.global_velocity {
                engine.apply_velocity_impulse(handle, velocity);
            }
            if let Some(velocity) = self.local_velocity {
                let rotation = self.local_orientation(engine, handle, bones);
                engine.apply_velocity_impulse(handle, rotation * velocity);
            }
        }
        self.clear_forces();
    }

    /// 丢弃累积的冲量（模拟关闭时每帧调用）
    pub fn clear_forces(&mut self) {
        self.global_torque = None;
        self.local_torque = None;
        self.global_velocity = None;
        self.local_velocity = None;
        self.all_forces_should_reset = false;
    }

    fn local_orientation(&self, engine: &dyn PhysicsEngine, handle: BodyId, bones: &[Bone]) -> Quat {
        let mut transform = engine.world_transform(handle);
        if let Some(bone) = self.bone_index(bones.len()).map(|i| &bones[i]) {
            transform = bone.world_transform.inverse() * transform;
        }
        let (_, rotation, _) = transform.to_scale_rotation_translation();
        rotation
    }

    /// 骨骼 -> 模拟
    ///
    /// 骨骼驱动的刚体或当前为运动学的刚体，把骨骼蒙皮矩阵作用到绑定姿势上。
    pub fn synchronize_to_simulation(&self, engine: &mut dyn PhysicsEngine, bones: &[Bone]) {
        let Some(handle) = self.handle else {
            return;
        };
        if self.descriptor.transform_type == RigidBodyTransformType::FromBoneToSimulation
            || engine.is_kinematic(handle)
        {
            if let Some(bone) = self.bone_index(bones.len()).map(|i| &bones[i]) {
                let world = bone.skinning_transform * engine.initial_transform(handle);
                engine.set_world_transform(handle, world);
                engine.reset_states(handle);
            }
        }
    }

    /// 模拟 -> 骨骼
    ///
    /// 动态刚体的结果写入骨骼蒙皮矩阵，并反推骨骼的用户平移/旋转。
    pub fn synchronize_from_simulation(
        &self,
        engine: &mut dyn PhysicsEngine,
        bones: &mut [Bone],
        follow: RigidBodyFollowBone,
    ) {
        let Some(handle) = self.handle else {
            return;
        };
        let transform_type = self.descriptor.transform_type;
        if transform_type == RigidBodyTransformType::FromBoneToSimulation || engine.is_kinematic(handle) {
            return;
        }
        let Some(bone_index) = self.bone_index(bones.len()) else {
            return;
        };
        let initial = engine.initial_transform(handle);
        let mut world = engine.world_transform(handle);
        if transform_type == RigidBodyTransformType::FromBoneOrientationAndSimulationToBone
            && self.should_follow_bone(follow)
        {
            // 位置拉回骨骼，只保留模拟出的旋转
            let delta = bones[bone_index].world_transform_origin() - world.w_axis.truncate();
            world = Mat4::from_translation(delta) * world;
            engine.set_world_transform(handle, world);
        }
        let skinning = world * initial.inverse();
        bones[bone_index].update_skinning_transform(skinning);

        let parent = bones[bone_index].parent_index;
        let (local, offset) = match usize::try_from(parent).ok().filter(|&p| p < bones.len() && p != bone_index) {
            Some(p) => (
                bones[p].world_transform.inverse() * bones[bone_index].world_transform,
                bones[bone_index].origin - bones[p].origin,
            ),
            None => (bones[bone_index].world_transform, bones[bone_index].origin),
        };
        let (_, orientation, translation) = local.to_scale_rotation_translation();
        let bone = &mut bones[bone_index];
        bone.set_local_user_translation(translation - offset);
        bone.set_local_user_orientation(orientation);
        engine.set_active(handle);
    }

    fn should_follow_bone(&self, follow: RigidBodyFollowBone) -> bool {
        match follow {
            RigidBodyFollowBone::Always => true,
            RigidBodyFollowBone::Never => false,
            RigidBodyFollowBone::SkipIfMorphBound => !self.is_morph_bound(),
        }
    }

    /// 模拟开始前把刚体放到骨骼当前姿势
    pub fn initialize_transform_feedback(&self, engine: &mut dyn PhysicsEngine, bones: &[Bone]) {
        let Some(handle) = self.handle else {
            return;
        };
        if let Some(bone) = self.bone_index(bones.len()).map(|i| &bones[i]) {
            let world = bone.skinning_transform * engine.initial_transform(handle);
            engine.set_world_transform(handle, world);
            engine.reset_states(handle);
        }
    }

    /// 重置模拟：刚体回到骨骼姿势并清空速度
    pub fn reset_transform_feedback(&self, engine: &mut dyn PhysicsEngine, bones: &[Bone]) {
        self.initialize_transform_feedback(engine, bones);
    }

    pub fn enable(&self, engine: &mut dyn PhysicsEngine) {
        if let Some(handle) = self.handle {
            engine.add_rigid_body(handle);
        }
    }

    pub fn disable(&self, engine: &mut dyn PhysicsEngine) {
        if let Some(handle) = self.handle {
            engine.remove_rigid_body(handle);
        }
    }

    pub fn enable_kinematic(&self, engine: &mut dyn PhysicsEngine) {
        if let Some(handle) = self.handle {
            if !engine.is_kinematic(handle) {
                engine.set_kinematic(handle, true);
            }
        }
    }

    pub fn disable_kinematic(&self, engine: &mut dyn PhysicsEngine) {
        if let Some(handle) = self.handle {
            if engine.is_kinematic(handle) {
                engine.set_kinematic(handle, false);
            }
        }
    }
}
