//! 骨骼管理器

use glam::{Mat4, Quat, Vec3};
use std::collections::{HashMap, HashSet};

use super::ik_solver::parent_frame;
use super::{Bone, Constraint, DeformTiming};
use crate::{MmdError, Result};

/// 骨骼管理器
///
/// 负责评估顺序、IK 约束与蒙皮矩阵缓冲区。
#[derive(Clone, Debug, Default)]
pub struct BoneManager {
    bones: Vec<Bone>,
    name_to_index: HashMap<String, usize>,
    sorted_indices: Vec<usize>,
    constraints: Vec<Constraint>,
    /// IK 骨骼 -> 约束
    target_to_constraint: HashMap<usize, usize>,
    /// 链关节骨骼 -> 约束
    joint_to_constraint: HashMap<usize, usize>,
    skinning_matrices: Vec<Mat4>,
    normal_matrices: Vec<Mat4>,
}

impl BoneManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加骨骼，返回其索引
    pub fn add_bone(&mut self, bone: Bone) -> usize {
        let index = self.bones.len();
        self.name_to_index.entry(bone.name.clone()).or_insert(index);
        self.bones.push(bone);
        index
    }

    /// 构建评估顺序、IK 约束并初始化绑定姿势
    ///
    /// 按变换层级与索引排序，并保证父骨骼先于子骨骼；父子关系成环时报错。
    pub fn build_hierarchy(&mut self) -> Result<()> {
        let bone_count = self.bones.len();
        let mut candidates: Vec<usize> = (0..bone_count).collect();
        candidates.sort_by_key(|&i| {
            let bone = &self.bones[i];
            (bone.transform_level, bone.deform_after_physics, i)
        });
        for bone in &self.bones {
            if bone.parent_index >= bone_count as i32 {
                log::warn!("骨骼 {} 的父骨骼索引越界: {}", bone.name, bone.parent_index);
            }
            if bone.has_inherent_parent() && bone.inherent_parent_index >= bone_count as i32 {
                log::warn!("骨骼 {} 的附加亲骨骼索引越界: {}", bone.name, bone.inherent_parent_index);
            }
        }

        let mut state = vec![VisitState::Unvisited; bone_count];
        let mut sorted = Vec::with_capacity(bone_count);
        for &index in &candidates {
            self.visit(index, &mut state, &mut sorted)?;
        }
        self.sorted_indices = sorted;

        self.constraints.clear();
        self.target_to_constraint.clear();
        self.joint_to_constraint.clear();
        for &index in &self.sorted_indices {
            if let Some(config) = &self.bones[index].ik_config {
                let constraint = Constraint::new(index, config.clone());
                let slot = self.constraints.len();
                for joint in constraint.joint_bone_indices(bone_count) {
                    self.joint_to_constraint.insert(joint, slot);
                }
                self.target_to_constraint.insert(index, slot);
                self.constraints.push(constraint);
            }
        }

        for bone in &mut self.bones {
            bone.local_transform = Mat4::IDENTITY;
            bone.world_transform = Mat4::from_translation(bone.origin);
            bone.skinning_transform = Mat4::IDENTITY;
            bone.normal_transform = Mat4::IDENTITY;
        }
        self.skinning_matrices = vec![Mat4::IDENTITY; bone_count];
        self.normal_matrices = vec![Mat4::IDENTITY; bone_count];

        log::debug!(
            "骨骼层级构建完成: {} 个骨骼, {} 个 IK 约束",
            bone_count,
            self.constraints.len()
        );
        Ok(())
    }

    fn visit(&self, index: usize, state: &mut [VisitState], sorted: &mut Vec<usize>) -> Result<()> {
        match state[index] {
            VisitState::Done => return Ok(()),
            VisitState::Visiting => {
                return Err(MmdError::InvalidModel(format!(
                    "骨骼父子关系存在循环: {}",
                    self.bones[index].name
                )))
            }
            VisitState::Unvisited => {}
        }
        state[index] = VisitState::Visiting;
        let parent = self.bones[index].parent_index;
        if parent >= 0 && (parent as usize) < self.bones.len() {
            self.visit(parent as usize, state, sorted)?;
        }
        state[index] = VisitState::Done;
        sorted.push(index);
        Ok(())
    }

    /// 通过名称查找骨骼
    pub fn find_bone_by_name(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    pub fn get_bone(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    pub fn get_bone_mut(&mut self, index: usize) -> Option<&mut Bone> {
        self.bones.get_mut(index)
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn bones_mut(&mut self) -> &mut [Bone] {
        &mut self.bones
    }

    /// 评估顺序
    pub fn sorted_indices(&self) -> &[usize] {
        &self.sorted_indices
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// 以 IK 骨骼索引查找约束
    pub fn find_constraint(&self, target_bone_index: usize) -> Option<&Constraint> {
        self.target_to_constraint
            .get(&target_bone_index)
            .map(|&slot| &self.constraints[slot])
    }

    /// 启用/禁用 IK 骨骼的约束；找不到时返回 false
    pub fn set_constraint_enabled(&mut self, target_bone_index: usize, enabled: bool) -> bool {
        match self.target_to_constraint.get(&target_bone_index) {
            Some(&slot) => {
                self.constraints[slot].enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// 骨骼是否是启用中约束的链关节
    pub fn is_constraint_joint_active(&self, index: usize) -> bool {
        self.joint_to_constraint
            .get(&index)
            .map(|&slot| self.constraints[slot].enabled)
            .unwrap_or(false)
    }

    pub fn reset_all_local_transforms(&mut self) {
        for bone in &mut self.bones {
            bone.reset_local_transform();
        }
    }

    pub fn reset_all_morph_transforms(&mut self) {
        for bone in &mut self.bones {
            bone.reset_morph_transform();
        }
    }

    pub fn reset_all_user_transforms(&mut self) {
        for bone in &mut self.bones {
            bone.reset_user_transform();
        }
    }

    /// 附加亲骨骼提供的旋转
    fn inherent_orientation_source(&self, index: usize) -> Option<Quat> {
        let bone = &self.bones[index];
        let parent_index = self.inherent_parent(bone)?;
        let parent = &self.bones[parent_index];
        let source = if parent.is_inherit_local {
            Quat::from_mat4(&parent.local_transform)
        } else if self.is_constraint_joint_active(parent_index) {
            parent.constraint_joint_orientation
        } else if parent.is_inherit_rotation && self.inherent_parent(parent).is_some() {
            parent.local_inherent_orientation
        } else {
            parent.local_user_orientation
        };
        Some(source)
    }

    /// 附加亲骨骼提供的平移
    fn inherent_translation_source(&self, index: usize) -> Option<Vec3> {
        let bone = &self.bones[index];
        let parent_index = self.inherent_parent(bone)?;
        let parent = &self.bones[parent_index];
        let source = if parent.is_inherit_local {
            parent.local_transform.w_axis.truncate()
        } else if parent.is_inherit_translation && self.inherent_parent(parent).is_some() {
            parent.local_inherent_translation
        } else {
            parent.local_translation
        };
        Some(source)
    }

    fn inherent_parent(&self, bone: &Bone) -> Option<usize> {
        let index = bone.inherent_parent_index;
        if bone.has_inherent_parent() && (index as usize) < self.bones.len() {
            Some(index as usize)
        } else {
            None
        }
    }

    /// 计算单个骨骼的本地与世界变换
    fn update_bone(&mut self, index: usize, outside_parents: &HashMap<usize, Mat4>) {
        let orientation_source = self.inherent_orientation_source(index);
        let translation_source = self.inherent_translation_source(index);
        let joint_active = self.is_constraint_joint_active(index);
        let parent = parent_frame(&self.bones, index);
        let bone = &mut self.bones[index];
        bone.update_local_orientation(orientation_source, joint_active);
        bone.update_local_translation(translation_source);
        bone.update_local_transform(parent);
        if let Some(parent_world) = outside_parents.get(&index) {
            bone.apply_outside_parent_transform(*parent_world);
        }
    }

    /// 按评估顺序更新指定阶段的所有骨骼
    ///
    /// `outside_parents` 为已解析的外部亲骨骼世界变换（骨骼索引 -> 变换）。
    pub fn apply_all_bones_transform(
        &mut self,
        timing: DeformTiming,
        outside_parents: &HashMap<usize, Mat4>,
    ) {
        for position in 0..self.sorted_indices.len() {
            let index = self.sorted_indices[position];
            if timing.includes(&self.bones[index]) {
                self.update_bone(index, outside_parents);
            }
        }
    }

    /// 按 IK 骨骼的评估顺序求解指定阶段的约束
    ///
    /// 每个约束求解后重新评估该阶段的骨骼，后续约束读取到最新位置。
    pub fn solve_constraints(&mut self, timing: DeformTiming, outside_parents: &HashMap<usize, Mat4>) {
        for slot in 0..self.constraints.len() {
            let target = self.constraints[slot].target_bone_index;
            if !timing.includes(&self.bones[target]) {
                continue;
            }
            if self.constraints[slot].enabled {
                self.constraints[slot].solve(&mut self.bones);
            } else {
                self.constraints[slot].reset_joints(&mut self.bones);
            }
            self.apply_all_bones_transform(timing, outside_parents);
        }
    }

    /// 物理写回骨骼后，更新这些骨骼下非物理子孙的世界变换
    pub fn update_non_physics_children(&mut self, physics_bone_indices: &HashSet<usize>) {
        let mut refreshed: HashSet<usize> = physics_bone_indices.clone();
        for position in 0..self.sorted_indices.len() {
            let index = self.sorted_indices[position];
            if physics_bone_indices.contains(&index) {
                continue;
            }
            let parent = self.bones[index].parent_index;
            if parent >= 0 && refreshed.contains(&(parent as usize)) {
                let frame = parent_frame(&self.bones, index);
                self.bones[index].update_local_transform(frame);
                refreshed.insert(index);
            }
        }
    }

    /// 把骨骼当前的蒙皮/法线矩阵复制到缓冲区
    pub fn update_skinning_matrices(&mut self) {
        self.skinning_matrices.resize(self.bones.len(), Mat4::IDENTITY);
        self.normal_matrices.resize(self.bones.len(), Mat4::IDENTITY);
        for (i, bone) in self.bones.iter().enumerate() {
            self.skinning_matrices[i] = bone.skinning_transform;
            self.normal_matrices[i] = bone.normal_transform;
        }
    }

    pub fn get_skinning_matrices(&self) -> &[Mat4] {
        &self.skinning_matrices
    }

    pub fn get_normal_matrices(&self) -> &[Mat4] {
        &self.normal_matrices
    }

    pub fn get_world_transform(&self, index: usize) -> Mat4 {
        self.bones
            .get(index)
            .map(|b| b.world_transform)
            .unwrap_or(Mat4::IDENTITY)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Unvisited,
    Visiting,
    Done,
}
