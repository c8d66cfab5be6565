//! MMD 运行时模型
//!
//! 每帧顺序：材质/包围盒重置 -> Morph -> 物理前骨骼 -> IK -> 刚体运动学
//! -> 推送到物理 -> [物理步进] -> 拉回骨骼 -> 物理后骨骼 -> 标记顶点缓冲区为脏。

use std::collections::{HashMap, HashSet};

use glam::{Mat4, Quat, Vec3, Vec4};

use super::config::{self, ModelConfig};
use super::staging::{BufferHandle, StagingBuffers, VertexBufferSink};
use super::{Material, ModelId, Vertex};
use crate::animation::{coefficient, lerp_f32, seek_bone_transform, seek_morph_weight, MotionSource};
use crate::morph::{MorphCategory, MorphManager, MorphTargets};
use crate::physics::{
    self, MmdJoint, MmdRigidBody, MmdSoftBody, PhysicsEngine, RigidBodyFollowBone,
    RigidBodyTransformType,
};
use crate::skeleton::{BoneManager, DeformTiming};
use crate::skinning::{compute_skinning, BonePalette, SkinningContext, VertexDrawMode, VertexUnit};
use crate::Result;

/// 外部亲骨骼：另一个模型中的骨骼
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutsideParent {
    pub model: ModelId,
    pub bone_index: usize,
}

/// 其他模型的只读视图，用于解析外部亲骨骼
#[derive(Clone, Copy, Default)]
pub struct OtherModels<'a> {
    before: &'a [MmdModel],
    after: &'a [MmdModel],
}

impl<'a> OtherModels<'a> {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(models: &'a [MmdModel]) -> Self {
        Self {
            before: models,
            after: &[],
        }
    }

    pub(crate) fn split(before: &'a [MmdModel], after: &'a [MmdModel]) -> Self {
        Self { before, after }
    }

    pub fn find(&self, id: ModelId) -> Option<&'a MmdModel> {
        self.before
            .iter()
            .chain(self.after.iter())
            .find(|model| model.id == id)
    }
}

/// 构建器交给运行时的全部数据
pub(super) struct ModelParts {
    pub name: String,
    pub bone_manager: BoneManager,
    pub morph_manager: MorphManager,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub materials: Vec<Material>,
    pub rigid_bodies: Vec<MmdRigidBody>,
    pub joints: Vec<MmdJoint>,
    pub soft_bodies: Vec<MmdSoftBody>,
}

/// MMD 运行时模型
pub struct MmdModel {
    pub name: String,
    id: ModelId,

    // 静态数据
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub materials: Vec<Material>,

    // 子系统
    pub bone_manager: BoneManager,
    pub morph_manager: MorphManager,

    // 物理
    pub rigid_bodies: Vec<MmdRigidBody>,
    pub joints: Vec<MmdJoint>,
    pub soft_bodies: Vec<MmdSoftBody>,
    physics: Option<Box<dyn PhysicsEngine>>,
    physics_simulation_enabled: bool,
    rigid_body_follow_bone: RigidBodyFollowBone,
    /// 骨骼 -> 绑定的刚体
    bone_to_rigid_body: HashMap<usize, usize>,
    /// 软体读回的 顶点 -> (位置, 法线)
    soft_body_vertices: HashMap<usize, (Vec3, Vec3)>,

    /// 每个材质的 骨骼索引 -> 材质内索引
    bone_index_hashes: Vec<HashMap<i32, i32>>,
    outside_parents: HashMap<usize, OutsideParent>,

    active_bone: Option<usize>,
    active_morphs: HashMap<MorphCategory, usize>,
    edge_color: Vec4,
    edge_size_scale_factor: f32,
    visible: bool,
    draw_mode: VertexDrawMode,
    bounding_box: (Vec3, Vec3),

    dirty_staging_buffer: bool,
    staging: StagingBuffers,
    config: ModelConfig,
}

impl MmdModel {
    pub(super) fn new(parts: ModelParts) -> Self {
        let config = config::get_config();
        let bone_count = parts.bone_manager.bone_count();
        let bone_to_rigid_body = parts
            .rigid_bodies
            .iter()
            .enumerate()
            .filter_map(|(i, body)| body.bone_index(bone_count).map(|bone| (bone, i)))
            .collect();
        let active_morphs = MorphCategory::ALL
            .iter()
            .filter_map(|&category| {
                parts
                    .morph_manager
                    .first_in_category(category)
                    .map(|index| (category, index))
            })
            .collect();
        let draw_mode = if config.weight_visualization {
            VertexDrawMode::WeightColor
        } else {
            VertexDrawMode::Skinning
        };
        Self {
            name: parts.name,
            id: ModelId::default(),
            vertices: parts.vertices,
            indices: parts.indices,
            materials: parts.materials,
            bone_manager: parts.bone_manager,
            morph_manager: parts.morph_manager,
            rigid_bodies: parts.rigid_bodies,
            joints: parts.joints,
            soft_bodies: parts.soft_bodies,
            physics: None,
            physics_simulation_enabled: true,
            rigid_body_follow_bone: physics::get_config().follow_bone,
            bone_to_rigid_body,
            soft_body_vertices: HashMap::new(),
            bone_index_hashes: Vec::new(),
            outside_parents: HashMap::new(),
            active_bone: None,
            active_morphs,
            edge_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            edge_size_scale_factor: config.edge_size_scale_factor,
            visible: true,
            draw_mode,
            bounding_box: (Vec3::ZERO, Vec3::ZERO),
            dirty_staging_buffer: true,
            staging: StagingBuffers::default(),
            config,
        }
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: ModelId) {
        self.id = id;
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    // ========== 物理 ==========

    /// 绑定物理后端
    ///
    /// 先创建全部刚体，再创建关节。任何刚体创建失败时放弃物理，模型只做运动学动画。
    pub fn bind_physics(&mut self, mut engine: Box<dyn PhysicsEngine>) -> bool {
        self.unbind_physics();
        for index in 0..self.rigid_bodies.len() {
            let morph_bound = self.morph_manager.is_impulse_target(index);
            if let Err(err) = self.rigid_bodies[index].bind(engine.as_mut(), morph_bound) {
                log::warn!(
                    "刚体 {} 创建失败，模型 {} 不使用物理: {}",
                    self.rigid_bodies[index].name(),
                    self.name,
                    err
                );
                for body in &mut self.rigid_bodies {
                    body.destroy(engine.as_mut());
                }
                return false;
            }
        }

        let mut joint_count = 0;
        for (index, joint) in self.joints.iter_mut().enumerate() {
            match joint.bind(engine.as_mut(), &self.rigid_bodies, index) {
                Ok(_) => joint_count += 1,
                Err(err) => log::warn!("跳过关节 {}: {}", joint.name(), err),
            }
        }

        for (index, soft_body) in self.soft_bodies.iter_mut().enumerate() {
            match soft_body.bind(engine.as_mut()) {
                Ok(_) => {
                    for &vertex_index in &soft_body.descriptor.vertex_indices {
                        if let Some(vertex) = self.vertices.get_mut(vertex_index as usize) {
                            vertex.soft_body_index = index as i32;
                        }
                    }
                }
                Err(err) => log::warn!("软体 {} 回退到蒙皮: {}", soft_body.descriptor.name, err),
            }
        }

        let bones = self.bone_manager.bones();
        for body in &self.rigid_bodies {
            body.initialize_transform_feedback(engine.as_mut(), bones);
            if !self.physics_simulation_enabled {
                body.disable(engine.as_mut());
            }
        }
        log::info!(
            "模型 {} 物理绑定完成: {} 个刚体, {}/{} 个关节",
            self.name,
            self.rigid_bodies.len(),
            joint_count,
            self.joints.len()
        );
        self.physics = Some(engine);
        true
    }

    /// 销毁物理句柄并交回后端
    pub fn unbind_physics(&mut self) -> Option<Box<dyn PhysicsEngine>> {
        let mut engine = self.physics.take()?;
        for joint in &mut self.joints {
            joint.destroy(engine.as_mut());
        }
        for soft_body in &mut self.soft_bodies {
            soft_body.destroy(engine.as_mut());
        }
        for body in &mut self.rigid_bodies {
            body.destroy(engine.as_mut());
        }
        for vertex in &mut self.vertices {
            vertex.soft_body_index = -1;
        }
        self.soft_body_vertices.clear();
        Some(engine)
    }

    pub fn has_physics(&self) -> bool {
        self.physics.is_some()
    }

    pub fn physics_engine(&self) -> Option<&(dyn PhysicsEngine + 'static)> {
        self.physics.as_deref()
    }

    pub fn physics_engine_mut(&mut self) -> Option<&mut (dyn PhysicsEngine + 'static)> {
        self.physics.as_deref_mut()
    }

    /// 物理已绑定且模拟开启
    pub fn is_physics_active(&self) -> bool {
        self.physics.is_some() && self.physics_simulation_enabled
    }

    pub fn is_physics_simulation_enabled(&self) -> bool {
        self.physics_simulation_enabled
    }

    /// 开关模拟；刚体加入/移出世界，句柄保留
    pub fn set_physics_simulation_enabled(&mut self, enabled: bool) {
        if self.physics_simulation_enabled == enabled {
            return;
        }
        self.physics_simulation_enabled = enabled;
        let Some(engine) = self.physics.as_mut() else {
            return;
        };
        let bones = self.bone_manager.bones();
        for body in &self.rigid_bodies {
            if enabled {
                body.enable(engine.as_mut());
                body.reset_transform_feedback(engine.as_mut(), bones);
            } else {
                body.disable(engine.as_mut());
            }
        }
    }

    pub fn rigid_body_follow_bone(&self) -> RigidBodyFollowBone {
        self.rigid_body_follow_bone
    }

    pub fn set_rigid_body_follow_bone(&mut self, follow: RigidBodyFollowBone) {
        self.rigid_body_follow_bone = follow;
    }

    /// 刚体回到骨骼当前姿势，速度清零
    pub fn reset_physics(&mut self) {
        let Some(engine) = self.physics.as_mut() else {
            return;
        };
        let bones = self.bone_manager.bones();
        for body in &self.rigid_bodies {
            body.reset_transform_feedback(engine.as_mut(), bones);
        }
    }

    /// 骨骼绑定的刚体索引
    pub fn find_rigid_body_by_bone(&self, bone_index: usize) -> Option<usize> {
        self.bone_to_rigid_body.get(&bone_index).copied()
    }

    /// 按动画里物理开关切换刚体的运动学状态
    ///
    /// 前帧交给物理、后帧不交：转为运动学；前后都交给物理：恢复动态。
    pub fn synchronize_all_rigid_body_kinematics(&mut self, motion: &dyn MotionSource, frame_index: u32) {
        if !self.physics_simulation_enabled {
            return;
        }
        let Some(engine) = self.physics.as_mut() else {
            return;
        };
        let bones = self.bone_manager.bones();
        for body in &self.rigid_bodies {
            if body.descriptor.transform_type == RigidBodyTransformType::FromBoneToSimulation {
                continue;
            }
            let Some(bone_index) = body.bone_index(bones.len()) else {
                continue;
            };
            let name = bones[bone_index].name.as_str();
            let states = match (
                motion.find_bone_keyframe(name, frame_index),
                motion.find_bone_keyframe(name, frame_index.saturating_add(1)),
            ) {
                (Some(prev), Some(next)) => Some((prev, next)),
                _ => match motion.search_closest_bone_keyframes(name, frame_index) {
                    (Some(prev), Some(next)) => Some((prev, next)),
                    _ => None,
                },
            };
            match states.map(|(prev, next)| {
                (prev.physics_simulation_enabled, next.physics_simulation_enabled)
            }) {
                Some((true, false)) => body.enable_kinematic(engine.as_mut()),
                Some((true, true)) => body.disable_kinematic(engine.as_mut()),
                _ => {}
            }
        }
    }

    /// 冲量生效，然后把骨骼驱动的刚体推送到物理世界
    ///
    /// 模拟未运行时丢弃本帧冲量，重新开启后不会一次性补上。
    pub fn synchronize_all_rigid_bodies_to_simulation(&mut self) {
        let engine = match self.physics.as_mut() {
            Some(engine) if self.physics_simulation_enabled => engine,
            _ => {
                for body in &mut self.rigid_bodies {
                    body.clear_forces();
                }
                return;
            }
        };
        let bones = self.bone_manager.bones();
        for body in &mut self.rigid_bodies {
            body.apply_all_forces(engine.as_mut(), bones);
            body.synchronize_to_simulation(engine.as_mut(), bones);
        }
    }

    /// 物理步进并把结果拉回骨骼
    pub fn step_physics(&mut self, delta: f32) {
        if !self.physics_simulation_enabled {
            return;
        }
        let Some(engine) = self.physics.as_mut() else {
            return;
        };
        engine.step_simulation(delta);
        self.synchronize_all_rigid_bodies_from_simulation(self.rigid_body_follow_bone);
    }

    /// 模拟结果写回骨骼，并刷新被物理骨骼带动的非物理子骨骼
    pub fn synchronize_all_rigid_bodies_from_simulation(&mut self, follow: RigidBodyFollowBone) {
        let Some(engine) = self.physics.as_mut() else {
            return;
        };
        let bones = self.bone_manager.bones_mut();
        let mut driven = HashSet::new();
        for body in &self.rigid_bodies {
            body.synchronize_from_simulation(engine.as_mut(), bones, follow);
            let dynamic = body.descriptor.transform_type != RigidBodyTransformType::FromBoneToSimulation
                && body.handle().is_some_and(|handle| !engine.is_kinematic(handle));
            if let Some(bone_index) = body.bone_index(bones.len()).filter(|_| dynamic) {
                driven.insert(bone_index);
            }
        }
        self.bone_manager.update_non_physics_children(&driven);

        self.soft_body_vertices.clear();
        for soft_body in &self.soft_bodies {
            for vertex in soft_body.pull_vertices(&**engine) {
                self.soft_body_vertices
                    .insert(vertex.vertex_index, (vertex.position, vertex.normal));
            }
        }
        if self.config.debug_log {
            log::debug!("模型 {} 物理写回: {} 个骨骼", self.name, driven.len());
        }
        self.mark_staging_vertex_buffer_dirty();
    }

    // ========== 动画 ==========

    /// 按动画同步一帧
    ///
    /// 物理前阶段完成 Morph、骨骼、IK 与刚体推送；物理后阶段只评估物理后骨骼。
    /// `amount > 0` 时与下一帧按该比例混合。
    pub fn synchronize_motion(
        &mut self,
        motion: &dyn MotionSource,
        frame_index: u32,
        amount: f32,
        timing: DeformTiming,
        others: &OtherModels<'_>,
    ) {
        match timing {
            DeformTiming::BeforePhysics => {
                self.synchronize_model_motion(motion, frame_index, others);
                if !self.visible {
                    return;
                }
                self.reset_all_materials();
                self.reset_bounding_box();
                self.bone_manager.reset_all_local_transforms();
                self.synchronize_morph_motion(motion, frame_index, amount);
                self.synchronize_bone_motion(motion, frame_index, amount, timing, others);
                self.synchronize_all_rigid_body_kinematics(motion, frame_index);
                self.synchronize_all_rigid_bodies_to_simulation();
            }
            DeformTiming::AfterPhysics => {
                if !self.visible {
                    return;
                }
                self.synchronize_bone_motion(motion, frame_index, amount, timing, others);
            }
        }
        self.mark_staging_vertex_buffer_dirty();
    }

    /// 模型关键帧：显示、边缘、物理开关、IK 开关与外部亲骨骼
    ///
    /// 关键帧之间只插值边缘颜色与大小。
    pub fn synchronize_model_motion(
        &mut self,
        motion: &dyn MotionSource,
        frame_index: u32,
        others: &OtherModels<'_>,
    ) {
        if let Some(keyframe) = motion.find_model_keyframe(frame_index) {
            self.visible = keyframe.visible;
            self.edge_color = keyframe.edge_color;
            self.edge_size_scale_factor = keyframe.edge_scale_factor;
            self.set_physics_simulation_enabled(keyframe.physics_simulation_enabled);
            for (name, &enabled) in &keyframe.constraint_states {
                if let Some(bone_index) = self.bone_manager.find_bone_by_name(name) {
                    self.bone_manager.set_constraint_enabled(bone_index, enabled);
                }
            }
            self.outside_parents.clear();
            for (subject, target) in &keyframe.outside_parents {
                let Some(subject_index) = self.bone_manager.find_bone_by_name(subject) else {
                    continue;
                };
                let resolved = others
                    .find(target.model)
                    .and_then(|model| model.bone_manager.find_bone_by_name(&target.bone_name));
                if let Some(bone_index) = resolved {
                    self.outside_parents.insert(
                        subject_index,
                        OutsideParent {
                            model: target.model,
                            bone_index,
                        },
                    );
                }
            }
        } else if let (Some(prev), Some(next)) = motion.search_closest_model_keyframes(frame_index) {
            let coef = coefficient(prev.frame_index, next.frame_index, frame_index);
            self.edge_color = prev.edge_color.lerp(next.edge_color, coef);
            self.edge_size_scale_factor =
                lerp_f32(prev.edge_scale_factor, next.edge_scale_factor, coef);
        }
    }

    /// 采样全部 Morph 权重并变形
    pub fn synchronize_morph_motion(&mut self, motion: &dyn MotionSource, frame_index: u32, amount: f32) {
        self.reset_all_morph_deforms();
        let weights: Vec<f32> = self
            .morph_manager
            .morphs()
            .iter()
            .map(|morph| {
                let weight = seek_morph_weight(motion, &morph.name, frame_index);
                if amount > 0.0 {
                    let next = seek_morph_weight(motion, &morph.name, frame_index.saturating_add(1));
                    lerp_f32(weight, next, amount)
                } else {
                    weight
                }
            })
            .collect();
        for (index, weight) in weights.into_iter().enumerate() {
            self.morph_manager.set_morph_weight(index, weight);
        }
        self.deform_all_morphs(true);
        self.morph_manager.clear_dirty();
    }

    /// 采样该阶段骨骼的用户变换，然后评估骨骼与 IK
    pub fn synchronize_bone_motion(
        &mut self,
        motion: &dyn MotionSource,
        frame_index: u32,
        amount: f32,
        timing: DeformTiming,
        others: &OtherModels<'_>,
    ) {
        for index in 0..self.bone_manager.bone_count() {
            let rigid_body_bound = self.bone_to_rigid_body.contains_key(&index);
            let Some(bone) = self.bone_manager.get_bone_mut(index) else {
                continue;
            };
            if !timing.includes(bone) {
                continue;
            }
            let sample = seek_bone_transform(motion, &bone.name, frame_index, rigid_body_bound);
            let mut translation = sample.mixed_translation(bone.local_user_translation);
            let mut orientation = sample.mixed_orientation(bone.local_user_orientation);
            if amount > 0.0 {
                let next_frame = frame_index.saturating_add(1);
                let next = seek_bone_transform(motion, &bone.name, next_frame, rigid_body_bound);
                translation = translation.lerp(next.mixed_translation(bone.local_user_translation), amount);
                orientation = orientation.slerp(next.mixed_orientation(bone.local_user_orientation), amount);
            }
            bone.set_local_user_translation(translation);
            bone.set_local_user_orientation(orientation);
        }
        self.apply_all_bones_transform(timing, others);
    }

    fn apply_all_bones_transform(&mut self, timing: DeformTiming, others: &OtherModels<'_>) {
        let outside = self.resolve_outside_parents(others);
        self.bone_manager.apply_all_bones_transform(timing, &outside);
        self.bone_manager.solve_constraints(timing, &outside);
    }

    /// 不依赖动画，按当前用户变换评估全部骨骼
    ///
    /// 物理开启时以零时间步同步一次，使刚体跟上骨骼。
    pub fn perform_all_bones_transform(&mut self, others: &OtherModels<'_>) {
        self.apply_all_bones_transform(DeformTiming::BeforePhysics, others);
        if self.is_physics_active() {
            self.synchronize_all_rigid_bodies_to_simulation();
            if let Some(engine) = self.physics.as_mut() {
                engine.step_simulation(0.0);
            }
            self.synchronize_all_rigid_bodies_from_simulation(RigidBodyFollowBone::SkipIfMorphBound);
        }
        self.apply_all_bones_transform(DeformTiming::AfterPhysics, others);
        self.mark_staging_vertex_buffer_dirty();
    }

    /// 重新求解全部 IK（两个阶段）
    pub fn solve_all_constraints(&mut self, others: &OtherModels<'_>) {
        let outside = self.resolve_outside_parents(others);
        self.bone_manager
            .solve_constraints(DeformTiming::BeforePhysics, &outside);
        self.bone_manager
            .solve_constraints(DeformTiming::AfterPhysics, &outside);
        self.mark_staging_vertex_buffer_dirty();
    }

    /// 执行全部 Morph
    pub fn deform_all_morphs(&mut self, check_dirty: bool) {
        let mut targets = MorphTargets {
            vertices: &mut self.vertices,
            bones: self.bone_manager.bones_mut(),
            materials: &mut self.materials,
            rigid_bodies: &mut self.rigid_bodies,
        };
        self.morph_manager.deform_all(check_dirty, &mut targets);
        self.mark_staging_vertex_buffer_dirty();
    }

    // ========== 重置 ==========

    pub fn reset_all_materials(&mut self) {
        for material in &mut self.materials {
            material.reset_deform();
        }
    }

    pub fn reset_all_vertices(&mut self) {
        for vertex in &mut self.vertices {
            vertex.reset();
        }
    }

    /// 清空 Morph 写入的增量（权重保留）
    pub fn reset_all_morph_deforms(&mut self) {
        self.reset_all_vertices();
        self.reset_all_materials();
        self.bone_manager.reset_all_morph_transforms();
    }

    /// 权重归零并清空增量
    pub fn reset_all_morphs(&mut self) {
        self.morph_manager.reset_all_weights();
        self.reset_all_morph_deforms();
        self.mark_staging_vertex_buffer_dirty();
    }

    /// 清空骨骼的用户、Morph 与合成分量
    pub fn reset_all_bone_transforms(&mut self) {
        self.bone_manager.reset_all_user_transforms();
        self.bone_manager.reset_all_morph_transforms();
        self.bone_manager.reset_all_local_transforms();
        self.mark_staging_vertex_buffer_dirty();
    }

    pub fn reset_bounding_box(&mut self) {
        self.bounding_box = (Vec3::ZERO, Vec3::ZERO);
    }

    /// 回到绑定姿势
    pub fn reset(&mut self, others: &OtherModels<'_>) {
        self.reset_all_bone_transforms();
        self.reset_all_morphs();
        self.reset_bounding_box();
        self.perform_all_bones_transform(others);
        self.reset_physics();
    }

    // ========== 外部亲骨骼 ==========

    pub fn set_outside_parent(&mut self, bone_index: usize, parent: OutsideParent) {
        if bone_index < self.bone_manager.bone_count() {
            self.outside_parents.insert(bone_index, parent);
        }
    }

    pub fn remove_outside_parent(&mut self, bone_index: usize) -> Option<OutsideParent> {
        self.outside_parents.remove(&bone_index)
    }

    pub fn find_outside_parent(&self, bone_index: usize) -> Option<OutsideParent> {
        self.outside_parents.get(&bone_index).copied()
    }

    /// 解析外部亲骨骼的世界变换；目标模型或骨骼不存在时忽略
    fn resolve_outside_parents(&self, others: &OtherModels<'_>) -> HashMap<usize, Mat4> {
        self.outside_parents
            .iter()
            .filter_map(|(&bone_index, parent)| {
                let model = others.find(parent.model)?;
                let bone = model.bone_manager.get_bone(parent.bone_index)?;
                Some((bone_index, bone.world_transform))
            })
            .collect()
    }

    // ========== 状态 ==========

    pub fn active_bone(&self) -> Option<usize> {
        self.active_bone
    }

    pub fn set_active_bone(&mut self, bone_index: Option<usize>) {
        self.active_bone = bone_index.filter(|&i| i < self.bone_manager.bone_count());
        if self.draw_mode == VertexDrawMode::WeightColor {
            self.mark_staging_vertex_buffer_dirty();
        }
    }

    /// 各分类当前选中的 Morph
    pub fn active_morph(&self, category: MorphCategory) -> Option<usize> {
        self.active_morphs.get(&category).copied()
    }

    /// 选中 Morph；分类不符时忽略
    pub fn set_active_morph(&mut self, category: MorphCategory, morph_index: Option<usize>) {
        match morph_index {
            Some(index) => {
                if self
                    .morph_manager
                    .get_morph(index)
                    .is_some_and(|morph| morph.category == category)
                {
                    self.active_morphs.insert(category, index);
                }
            }
            None => {
                self.active_morphs.remove(&category);
            }
        }
    }

    pub fn draw_mode(&self) -> VertexDrawMode {
        self.draw_mode
    }

    pub fn set_draw_mode(&mut self, draw_mode: VertexDrawMode) {
        if self.draw_mode != draw_mode {
            self.draw_mode = draw_mode;
            self.mark_staging_vertex_buffer_dirty();
        }
    }

    pub fn edge_color(&self) -> Vec4 {
        self.edge_color
    }

    pub fn set_edge_color(&mut self, color: Vec4) {
        self.edge_color = color;
    }

    pub fn edge_size_scale_factor(&self) -> f32 {
        self.edge_size_scale_factor
    }

    pub fn set_edge_size_scale_factor(&mut self, factor: f32) {
        self.edge_size_scale_factor = factor;
        self.mark_staging_vertex_buffer_dirty();
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// 最近一次蒙皮结果的 (最小, 最大)
    pub fn bounding_box(&self) -> (Vec3, Vec3) {
        self.bounding_box
    }

    pub fn bone_index_hashes(&self) -> &[HashMap<i32, i32>] {
        &self.bone_index_hashes
    }

    /// IK 骨骼的约束是否启用；不是 IK 骨骼时返回 `None`
    pub fn is_constraint_enabled(&self, bone_index: usize) -> Option<bool> {
        self.bone_manager
            .find_constraint(bone_index)
            .map(|constraint| constraint.enabled)
    }

    /// 设置骨骼的用户变换（编辑器操作）
    pub fn set_bone_user_transform(&mut self, bone_index: usize, translation: Vec3, orientation: Quat) {
        if let Some(bone) = self.bone_manager.get_bone_mut(bone_index) {
            bone.set_local_user_translation(translation);
            bone.set_local_user_orientation(orientation);
            self.mark_staging_vertex_buffer_dirty();
        }
    }

    // ========== 顶点缓冲区 ==========

    pub fn mark_staging_vertex_buffer_dirty(&mut self) {
        self.dirty_staging_buffer = true;
    }

    pub fn is_staging_vertex_buffer_dirty(&self) -> bool {
        self.dirty_staging_buffer
    }

    /// 渲染端可以读取的缓冲区
    pub fn ready_vertex_buffer(&self) -> Option<BufferHandle> {
        self.staging.ready_handle()
    }

    /// 材质骨骼数超过上限时拆分
    ///
    /// 影响顶点最多的骨骼保留在材质骨骼表中，其余骨骼影响到的顶点改为 CPU 蒙皮。
    pub fn split_bones_per_material(&mut self, max_bone_uniforms: usize) {
        self.bone_index_hashes.clear();
        let mut offset = 0;
        for (material_index, material) in self.materials.iter().enumerate() {
            let end = (offset + material.index_count).min(self.indices.len());
            let mut referenced = Vec::new();
            let mut seen = HashSet::new();
            let mut counts: HashMap<i32, usize> = HashMap::new();
            for &vertex_index in &self.indices[offset.min(end)..end] {
                let vertex_index = vertex_index as usize;
                if vertex_index >= self.vertices.len() || !seen.insert(vertex_index) {
                    continue;
                }
                referenced.push(vertex_index);
                for bone in self.vertices[vertex_index].weight.bone_indices() {
                    if bone >= 0 {
                        *counts.entry(bone).or_insert(0) += 1;
                    }
                }
            }

            let mut ranked: Vec<(i32, usize)> = counts.into_iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            let hash: HashMap<i32, i32> = ranked
                .iter()
                .take(max_bone_uniforms)
                .enumerate()
                .map(|(slot, &(bone, _))| (bone, slot as i32))
                .collect();
            if ranked.len() > max_bone_uniforms {
                log::debug!(
                    "材质 {} 使用 {} 个骨骼，超过上限 {}，拆分",
                    material.name,
                    ranked.len(),
                    max_bone_uniforms
                );
            }
            for &vertex_index in &referenced {
                let vertex = &mut self.vertices[vertex_index];
                vertex.material_index = material_index as i32;
                vertex.skinning_enabled = vertex
                    .weight
                    .bone_indices()
                    .iter()
                    .any(|&bone| bone >= 0 && !hash.contains_key(&bone));
            }
            self.bone_index_hashes.push(hash);
            offset = end;
        }
    }

    /// 蒙皮并写入暂存缓冲区
    ///
    /// 不脏时返回 `None`；否则写入后翻转，返回刚写好的缓冲区序号。
    pub fn update_staging_vertex_buffer(
        &mut self,
        sink: &mut dyn VertexBufferSink,
    ) -> Result<Option<usize>> {
        if !self.dirty_staging_buffer {
            return Ok(None);
        }
        self.bone_manager.update_skinning_matrices();
        let handle = self.staging.stage_handle(sink, self.vertices.len())?;

        let context = SkinningContext {
            palette: BonePalette::new(
                self.bone_manager.get_skinning_matrices(),
                self.bone_manager.get_normal_matrices(),
            ),
            draw_mode: self.draw_mode,
            active_bone: self.active_bone,
            edge_size: self.edge_size_scale_factor,
            bone_index_hashes: self
                .config
                .gpu_skinning
                .then_some(self.bone_index_hashes.as_slice()),
            soft_body_vertices: &self.soft_body_vertices,
        };
        let parallel = self.config.parallel_skinning;

        let mapped = if let Some(output) = sink.map_buffer(handle) {
            compute_skinning(&self.vertices, &context, output, parallel);
            self.bounding_box = bounds(output);
            true
        } else {
            false
        };
        if mapped {
            sink.unmap_buffer(handle);
        } else {
            let scratch = &mut self.staging.scratch;
            scratch.resize(self.vertices.len(), VertexUnit::default());
            compute_skinning(&self.vertices, &context, scratch, parallel);
            self.bounding_box = bounds(scratch);
            sink.update_buffer(handle, scratch)?;
        }

        let ready = self.staging.flip();
        self.dirty_staging_buffer = false;
        if self.config.debug_log {
            log::debug!("模型 {} 顶点缓冲区 {} 写入完成", self.name, ready);
        }
        Ok(Some(ready))
    }
}

fn bounds(units: &[VertexUnit]) -> (Vec3, Vec3) {
    if units.is_empty() {
        return (Vec3::ZERO, Vec3::ZERO);
    }
    units.iter().fold(
        (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
        |(min, max), unit| {
            let position = unit.position.truncate();
            (min.min(position), max.max(position))
        },
    )
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Quat, Vec2, Vec3};

    use super::*;
    use crate::animation::{BoneKeyframe, Motion, MorphKeyframe, ModelKeyframe};
    use crate::model::{MemoryVertexBuffer, ModelBuilder, VertexWeight};
    use crate::morph::{GroupMorphOffset, ImpulseMorphOffset, Morph, MorphKind, VertexMorphOffset};
    use crate::physics::{RecordingEngine, RigidBodyDescriptor, RigidBodyShape, SoftBodyDescriptor};
    use crate::skeleton::{Bone, IkConfig, IkLink};

    fn vertex(origin: Vec3, bone: i32) -> Vertex {
        Vertex::new(origin, Vec3::Y, Vec2::ZERO, VertexWeight::Bdef1 { bone })
    }

    /// センター(原点) -> 髪(0,1,0) -> 毛先(0,2,0)，每个骨骼上一个顶点
    fn builder() -> ModelBuilder {
        let mut builder = ModelBuilder::new("テスト");
        builder.add_bone(Bone::with_parent("センター", -1, Vec3::ZERO));
        builder.add_bone(Bone::with_parent("髪", 0, Vec3::new(0.0, 1.0, 0.0)));
        builder.add_bone(Bone::with_parent("毛先", 1, Vec3::new(0.0, 2.0, 0.0)));
        builder.add_vertex(vertex(Vec3::ZERO, 0));
        builder.add_vertex(vertex(Vec3::new(0.0, 1.0, 0.0), 1));
        builder.add_vertex(vertex(Vec3::new(0.0, 2.0, 0.0), 2));
        builder.add_indices(&[0, 1, 2]);
        builder.add_material(Material::new("体", 3));
        builder
    }

    fn hair_body() -> RigidBodyDescriptor {
        let mut descriptor = RigidBodyDescriptor::new("髪", 1, RigidBodyShape::Sphere { radius: 0.5 });
        descriptor.origin = Vec3::new(0.0, 1.0, 0.0);
        descriptor.transform_type = RigidBodyTransformType::FromSimulationToBone;
        descriptor
    }

    fn staged_position(model: &mut MmdModel, sink: &mut MemoryVertexBuffer, vertex_index: usize) -> Vec3 {
        model.mark_staging_vertex_buffer_dirty();
        model.update_staging_vertex_buffer(sink).unwrap();
        let handle = model.ready_vertex_buffer().unwrap();
        sink.buffer(handle).unwrap()[vertex_index].position.truncate()
    }

    fn assert_near(actual: Vec3, expected: Vec3) {
        assert!(
            actual.abs_diff_eq(expected, 1e-4),
            "expected {:?}, got {:?}",
            expected,
            actual
        );
    }

    #[test]
    fn test_root_translation_moves_child_vertex() {
        let mut model = builder().build().unwrap();
        model.set_bone_user_transform(0, Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY);
        model.perform_all_bones_transform(&OtherModels::none());

        let mut sink = MemoryVertexBuffer::new(true);
        assert_near(staged_position(&mut model, &mut sink, 1), Vec3::new(1.0, 1.0, 0.0));
        let (min, max) = model.bounding_box();
        assert_near(min, Vec3::new(1.0, 0.0, 0.0));
        assert_near(max, Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_staging_buffers_alternate() {
        for mappable in [true, false] {
            let mut model = builder().build().unwrap();
            let mut sink = MemoryVertexBuffer::new(mappable);
            let mut written = Vec::new();
            for _ in 0..4 {
                model.mark_staging_vertex_buffer_dirty();
                written.push(model.update_staging_vertex_buffer(&mut sink).unwrap());
            }
            assert_eq!(written, vec![Some(0), Some(1), Some(0), Some(1)]);
            assert_eq!(model.update_staging_vertex_buffer(&mut sink).unwrap(), None);
            assert_eq!(sink.buffer_count(), 2);
            assert_eq!(sink.uploads, if mappable { 0 } else { 4 });
        }
    }

    #[test]
    fn test_split_bones_per_material() {
        let mut model = builder().build().unwrap();
        model.vertices.push(vertex(Vec3::ZERO, 0));
        model.indices.push(3);
        model.materials[0].index_count = 4;

        model.split_bones_per_material(2);
        let hash = &model.bone_index_hashes()[0];
        assert_eq!(hash.len(), 2);
        assert_eq!(hash.get(&0), Some(&0));
        assert_eq!(hash.get(&1), Some(&1));
        assert!(!model.vertices[0].skinning_enabled);
        assert!(!model.vertices[1].skinning_enabled);
        assert!(model.vertices[2].skinning_enabled);
        assert!(model.vertices.iter().all(|v| v.material_index == 0));
    }

    #[test]
    fn test_morph_motion_moves_vertex() {
        let mut builder = builder();
        builder.add_morph(Morph::new(
            "あ",
            MorphCategory::Lip,
            MorphKind::Vertex(vec![VertexMorphOffset {
                vertex_index: 1,
                offset: Vec3::X,
            }]),
        ));
        builder.add_morph(Morph::new(
            "まとめ",
            MorphCategory::Other,
            MorphKind::Group(vec![GroupMorphOffset {
                morph_index: 0,
                coefficient: 0.5,
            }]),
        ));
        let mut model = builder.build().unwrap();
        assert_eq!(model.active_morph(MorphCategory::Lip), Some(0));
        assert_eq!(model.active_morph(MorphCategory::Eye), None);

        let mut motion = Motion::new();
        motion.insert_morph_keyframe("あ", MorphKeyframe::new(0, 1.0));
        let others = OtherModels::none();
        model.synchronize_motion(&motion, 0, 0.0, DeformTiming::BeforePhysics, &others);
        model.synchronize_motion(&motion, 0, 0.0, DeformTiming::AfterPhysics, &others);
        let mut sink = MemoryVertexBuffer::new(true);
        assert_near(staged_position(&mut model, &mut sink, 1), Vec3::new(1.0, 1.0, 0.0));

        // 组 Morph 以系数带动子 Morph
        let mut motion = Motion::new();
        motion.insert_morph_keyframe("まとめ", MorphKeyframe::new(0, 1.0));
        model.synchronize_motion(&motion, 0, 0.0, DeformTiming::BeforePhysics, &others);
        assert_near(model.vertices[1].delta, Vec3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn test_bone_motion_blends_with_next_frame() {
        let mut model = builder().build().unwrap();
        let mut motion = Motion::new();
        motion.insert_bone_keyframe("センター", BoneKeyframe::new(0));
        motion.insert_bone_keyframe(
            "センター",
            BoneKeyframe::with_transform(10, Vec3::new(10.0, 0.0, 0.0), Quat::IDENTITY),
        );
        model.synchronize_motion(&motion, 5, 0.5, DeformTiming::BeforePhysics, &OtherModels::none());
        let root = model.bone_manager.get_bone(0).unwrap();
        assert!((root.local_user_translation.x - 5.5).abs() < 1e-4);
        assert_near(
            model.bone_manager.get_bone(2).unwrap().world_transform_origin(),
            Vec3::new(5.5, 2.0, 0.0),
        );
        assert!(model.is_staging_vertex_buffer_dirty());
    }

    #[test]
    fn test_model_keyframes_drive_visibility_and_edge() {
        let mut model = builder().build().unwrap();
        let mut motion = Motion::new();
        let mut hidden = ModelKeyframe::new(0);
        hidden.visible = false;
        hidden.edge_scale_factor = 1.0;
        motion.insert_model_keyframe(hidden);
        let mut last = ModelKeyframe::new(10);
        last.edge_scale_factor = 3.0;
        motion.insert_model_keyframe(last);

        let others = OtherModels::none();
        model.synchronize_motion(&motion, 0, 0.0, DeformTiming::BeforePhysics, &others);
        assert!(!model.is_visible());

        model.synchronize_motion(&motion, 5, 0.0, DeformTiming::BeforePhysics, &others);
        assert!((model.edge_size_scale_factor() - 2.0).abs() < 1e-4);
        assert!(!model.is_visible());

        model.synchronize_motion(&motion, 10, 0.0, DeformTiming::BeforePhysics, &others);
        assert!(model.is_visible());
    }

    #[test]
    fn test_rigid_body_failure_falls_back_to_kinematic_animation() {
        let mut builder = builder();
        builder.add_rigid_body(hair_body());
        builder.set_physics_engine(Box::new(RecordingEngine {
            fail_rigid_bodies: true,
            ..Default::default()
        }));
        let mut model = builder.build().unwrap();
        assert!(!model.has_physics());
        assert!(model.rigid_bodies[0].handle().is_none());

        model.set_bone_user_transform(0, Vec3::new(0.0, 0.0, 1.0), Quat::IDENTITY);
        model.perform_all_bones_transform(&OtherModels::none());
        let mut sink = MemoryVertexBuffer::new(false);
        assert_near(staged_position(&mut model, &mut sink, 1), Vec3::new(0.0, 1.0, 1.0));
    }

    #[test]
    fn test_simulation_result_drives_bone_and_children() {
        let mut builder = builder();
        builder.add_rigid_body(hair_body());
        builder.set_physics_engine(Box::new(RecordingEngine::default()));
        let mut model = builder.build().unwrap();
        assert!(model.is_physics_active());
        assert_eq!(model.find_rigid_body_by_bone(1), Some(0));

        let handle = model.rigid_bodies[0].handle().unwrap();
        model
            .physics_engine_mut()
            .unwrap()
            .set_world_transform(handle, Mat4::from_translation(Vec3::new(0.0, 1.0, 0.5)));
        model.step_physics(1.0 / 60.0);

        assert_near(
            model.bone_manager.get_bone(1).unwrap().world_transform_origin(),
            Vec3::new(0.0, 1.0, 0.5),
        );
        assert_near(
            model.bone_manager.get_bone(2).unwrap().world_transform_origin(),
            Vec3::new(0.0, 2.0, 0.5),
        );
        let mut sink = MemoryVertexBuffer::new(true);
        assert_near(staged_position(&mut model, &mut sink, 1), Vec3::new(0.0, 1.0, 0.5));
    }

    #[test]
    fn test_disabled_simulation_skips_step() {
        let mut builder = builder();
        builder.add_rigid_body(hair_body());
        builder.set_physics_engine(Box::new(RecordingEngine::default()));
        let mut model = builder.build().unwrap();
        model.set_physics_simulation_enabled(false);
        assert!(!model.is_physics_active());
        assert!(model.has_physics());

        let handle = model.rigid_bodies[0].handle().unwrap();
        model
            .physics_engine_mut()
            .unwrap()
            .set_world_transform(handle, Mat4::from_translation(Vec3::new(0.0, 1.0, 0.5)));
        model.step_physics(1.0 / 60.0);
        assert_near(
            model.bone_manager.get_bone(1).unwrap().world_transform_origin(),
            Vec3::new(0.0, 1.0, 0.0),
        );
    }

    #[test]
    fn test_keyframe_physics_flags_switch_kinematic_state() {
        let mut builder = builder();
        builder.add_rigid_body(hair_body());
        builder.set_physics_engine(Box::new(RecordingEngine::default()));
        let mut model = builder.build().unwrap();
        let handle = model.rigid_bodies[0].handle().unwrap();
        let others = OtherModels::none();

        let mut motion = Motion::new();
        motion.insert_bone_keyframe("髪", BoneKeyframe::new(0));
        let mut released = BoneKeyframe::new(1);
        released.physics_simulation_enabled = false;
        motion.insert_bone_keyframe("髪", released);
        model.synchronize_motion(&motion, 0, 0.0, DeformTiming::BeforePhysics, &others);
        assert!(model.physics_engine().unwrap().is_kinematic(handle));

        let mut motion = Motion::new();
        motion.insert_bone_keyframe("髪", BoneKeyframe::new(0));
        motion.insert_bone_keyframe("髪", BoneKeyframe::new(1));
        model.synchronize_motion(&motion, 0, 0.0, DeformTiming::BeforePhysics, &others);
        assert!(!model.physics_engine().unwrap().is_kinematic(handle));
    }

    #[test]
    fn test_soft_body_vertices_replace_skinning() {
        let mut builder = builder();
        builder.add_soft_body(SoftBodyDescriptor {
            name: "スカート".into(),
            material_index: 0,
            vertex_indices: vec![2],
            total_mass: 1.0,
            collision_margin: 0.01,
        });
        builder.set_physics_engine(Box::new(RecordingEngine::default()));
        let mut model = builder.build().unwrap();
        assert_eq!(model.vertices[2].soft_body_index, 0);

        model.step_physics(1.0 / 60.0);
        let mut sink = MemoryVertexBuffer::new(true);
        assert_near(staged_position(&mut model, &mut sink, 2), Vec3::splat(9.0));
        assert_near(staged_position(&mut model, &mut sink, 1), Vec3::new(0.0, 1.0, 0.0));

        model.unbind_physics().unwrap();
        assert_eq!(model.vertices[2].soft_body_index, -1);
        assert_near(staged_position(&mut model, &mut sink, 2), Vec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn test_reset_returns_to_bind_pose() {
        let mut model = builder().build().unwrap();
        model.set_bone_user_transform(1, Vec3::new(0.0, 0.0, 2.0), Quat::from_rotation_x(0.5));
        model.perform_all_bones_transform(&OtherModels::none());
        model.reset(&OtherModels::none());
        assert_near(
            model.bone_manager.get_bone(2).unwrap().world_transform_origin(),
            Vec3::new(0.0, 2.0, 0.0),
        );
    }

    #[test]
    fn test_motion_frame_pipeline_stages_child_vertex() {
        let mut model = builder().build().unwrap();
        let mut motion = Motion::new();
        motion.insert_bone_keyframe(
            "センター",
            BoneKeyframe::with_transform(0, Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY),
        );
        let others = OtherModels::none();
        model.synchronize_motion(&motion, 0, 0.0, DeformTiming::BeforePhysics, &others);
        model.step_physics(1.0 / 60.0);
        model.synchronize_motion(&motion, 0, 0.0, DeformTiming::AfterPhysics, &others);

        let mut sink = MemoryVertexBuffer::new(true);
        assert_eq!(model.update_staging_vertex_buffer(&mut sink).unwrap(), Some(0));
        let handle = model.ready_vertex_buffer().unwrap();
        let staged = sink.buffer(handle).unwrap()[1].position.truncate();
        assert_near(staged, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_last_frame_blend_does_not_overflow() {
        let mut builder = builder();
        builder.add_morph(Morph::new("あ", MorphCategory::Lip, MorphKind::Vertex(Vec::new())));
        builder.add_rigid_body(hair_body());
        builder.set_physics_engine(Box::new(RecordingEngine::default()));
        let mut model = builder.build().unwrap();

        let mut motion = Motion::new();
        motion.insert_bone_keyframe(
            "センター",
            BoneKeyframe::with_transform(10, Vec3::new(2.0, 0.0, 0.0), Quat::IDENTITY),
        );
        motion.insert_bone_keyframe("髪", BoneKeyframe::new(10));
        motion.insert_morph_keyframe("あ", MorphKeyframe::new(10, 1.0));
        let others = OtherModels::none();
        model.synchronize_motion(&motion, u32::MAX, 0.5, DeformTiming::BeforePhysics, &others);
        model.synchronize_motion(&motion, u32::MAX, 0.5, DeformTiming::AfterPhysics, &others);

        let root = model.bone_manager.get_bone(0).unwrap();
        assert_near(root.local_user_translation, Vec3::new(2.0, 0.0, 0.0));
        assert!((model.morph_manager.morphs()[0].weight() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_impulses_are_dropped_while_simulation_is_off() {
        let mut builder = builder();
        builder.add_rigid_body(hair_body());
        builder.add_morph(Morph::new(
            "風",
            MorphCategory::Other,
            MorphKind::Impulse(vec![ImpulseMorphOffset {
                rigid_body_index: 0,
                is_local: false,
                velocity: Vec3::Y,
                torque: Vec3::ZERO,
            }]),
        ));
        let engine = RecordingEngine::default();
        let velocities = engine.shared_velocities.clone();
        builder.set_physics_engine(Box::new(engine));
        let mut model = builder.build().unwrap();
        assert!(model.rigid_bodies[0].is_morph_bound());
        let handle = model.rigid_bodies[0].handle().unwrap();

        let mut motion = Motion::new();
        motion.insert_morph_keyframe("風", MorphKeyframe::new(0, 1.0));
        let others = OtherModels::none();
        model.set_physics_simulation_enabled(false);
        for frame in 0..5 {
            model.synchronize_motion(&motion, frame, 0.0, DeformTiming::BeforePhysics, &others);
        }
        assert!(!model.rigid_bodies[0].has_pending_forces());
        assert!(velocities.lock().unwrap().is_empty());

        model.set_physics_simulation_enabled(true);
        model.synchronize_motion(&motion, 5, 0.0, DeformTiming::BeforePhysics, &others);
        assert_eq!(*velocities.lock().unwrap(), vec![(handle, Vec3::Y)]);
    }

    #[test]
    fn test_model_keyframe_toggles_constraint() {
        let mut builder = builder();
        let mut ik = Bone::with_parent("足IK", -1, Vec3::new(0.0, 2.0, 0.0));
        ik.ik_config = Some(IkConfig {
            effector_bone: 2,
            iterations: 4,
            limit_angle: 1.0,
            links: vec![IkLink::new(1)],
        });
        let ik_index = builder.add_bone(ik);
        let mut model = builder.build().unwrap();
        assert_eq!(model.is_constraint_enabled(ik_index), Some(true));
        assert_eq!(model.is_constraint_enabled(0), None);

        let mut motion = Motion::new();
        let mut keyframe = ModelKeyframe::new(0);
        keyframe.constraint_states.insert("足IK".into(), false);
        motion.insert_model_keyframe(keyframe);
        model.synchronize_motion(&motion, 0, 0.0, DeformTiming::BeforePhysics, &OtherModels::none());
        assert_eq!(model.is_constraint_enabled(ik_index), Some(false));
    }

    #[test]
    fn test_vertex_count_change_releases_staging_buffers() {
        let mut model = builder().build().unwrap();
        let mut sink = MemoryVertexBuffer::new(true);
        model.update_staging_vertex_buffer(&mut sink).unwrap();
        model.mark_staging_vertex_buffer_dirty();
        model.update_staging_vertex_buffer(&mut sink).unwrap();
        assert_eq!(sink.buffer_count(), 2);

        model.vertices.push(vertex(Vec3::ZERO, 0));
        model.mark_staging_vertex_buffer_dirty();
        model.update_staging_vertex_buffer(&mut sink).unwrap();
        assert_eq!(sink.buffer_count(), 1);
        let handle = model.ready_vertex_buffer().unwrap();
        assert_eq!(sink.buffer(handle).unwrap().len(), 4);
    }

    #[test]
    fn test_active_selection_is_validated() {
        let mut builder = builder();
        builder.add_morph(Morph::new("まばたき", MorphCategory::Eye, MorphKind::Vertex(Vec::new())));
        let mut model = builder.build().unwrap();

        model.set_active_bone(Some(7));
        assert_eq!(model.active_bone(), None);
        model.set_active_bone(Some(1));
        assert_eq!(model.active_bone(), Some(1));

        model.set_active_morph(MorphCategory::Lip, Some(0));
        assert_eq!(model.active_morph(MorphCategory::Lip), None);
        model.set_active_morph(MorphCategory::Eye, None);
        assert_eq!(model.active_morph(MorphCategory::Eye), None);
    }
}
