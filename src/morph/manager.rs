//! Morph 管理器

use std::collections::{HashMap, HashSet};

use super::{GroupMorphOffset, Morph, MorphCategory, MorphKind, MorphType};
use crate::model::{Material, Vertex};
use crate::physics::MmdRigidBody;
use crate::skeleton::Bone;

/// Morph 写入的目标集合
pub struct MorphTargets<'a> {
    pub vertices: &'a mut [Vertex],
    pub bones: &'a mut [Bone],
    pub materials: &'a mut [Material],
    pub rigid_bodies: &'a mut [MmdRigidBody],
}

/// Morph 管理器
#[derive(Clone, Debug, Default)]
pub struct MorphManager {
    morphs: Vec<Morph>,
    name_to_index: HashMap<String, usize>,
}

impl MorphManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加 Morph，返回其索引
    pub fn add_morph(&mut self, morph: Morph) -> usize {
        let index = self.morphs.len();
        self.name_to_index.entry(morph.name.clone()).or_insert(index);
        self.morphs.push(morph);
        index
    }

    /// 通过名称查找 Morph
    pub fn find_morph_by_name(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn morph_count(&self) -> usize {
        self.morphs.len()
    }

    pub fn get_morph(&self, index: usize) -> Option<&Morph> {
        self.morphs.get(index)
    }

    pub fn get_morph_mut(&mut self, index: usize) -> Option<&mut Morph> {
        self.morphs.get_mut(index)
    }

    pub fn morphs(&self) -> &[Morph] {
        &self.morphs
    }

    /// 设置 Morph 权重
    pub fn set_morph_weight(&mut self, index: usize, weight: f32) {
        if let Some(morph) = self.morphs.get_mut(index) {
            morph.set_weight(weight);
        }
    }

    /// 重置所有 Morph 权重
    pub fn reset_all_weights(&mut self) {
        for morph in &mut self.morphs {
            morph.reset();
        }
    }

    pub fn clear_dirty(&mut self) {
        for morph in &mut self.morphs {
            morph.set_dirty(false);
        }
    }

    /// 指定分类中的第一个 Morph
    pub fn first_in_category(&self, category: MorphCategory) -> Option<usize> {
        self.morphs.iter().position(|m| m.category == category)
    }

    /// 刚体是否被某个冲量 Morph 引用
    pub fn is_impulse_target(&self, rigid_body_index: usize) -> bool {
        self.morphs.iter().any(|morph| match &morph.kind {
            MorphKind::Impulse(offsets) => offsets
                .iter()
                .any(|o| o.rigid_body_index >= 0 && o.rigid_body_index as usize == rigid_body_index),
            _ => false,
        })
    }

    /// 执行全部 Morph
    ///
    /// 先对组/翻转 Morph 预变形，再逐个变形。`check_dirty` 为真时跳过未变化的 Morph。
    pub fn deform_all(&mut self, check_dirty: bool, targets: &mut MorphTargets<'_>) {
        for index in 0..self.morphs.len() {
            let mut visited = HashSet::new();
            self.pre_deform(index, &mut visited);
        }
        for index in 0..self.morphs.len() {
            let mut visited = HashSet::new();
            self.deform(index, check_dirty, targets, &mut visited);
        }
    }

    fn child_index(&self, child: &GroupMorphOffset) -> Option<usize> {
        let index = child.morph_index;
        (index >= 0 && (index as usize) < self.morphs.len()).then_some(index as usize)
    }

    fn pre_deform(&mut self, index: usize, visited: &mut HashSet<usize>) {
        if !visited.insert(index) {
            return;
        }
        let weight = self.morphs[index].weight();
        match &self.morphs[index].kind {
            MorphKind::Group(children) => {
                let flips: Vec<(usize, f32)> = children
                    .iter()
                    .filter_map(|child| self.child_index(child).map(|i| (i, child.coefficient)))
                    .filter(|&(i, _)| self.morphs[i].morph_type() == MorphType::Flip)
                    .collect();
                for (child, coefficient) in flips {
                    self.morphs[child].set_forced_weight(weight * coefficient);
                    self.pre_deform(child, visited);
                }
            }
            MorphKind::Flip(children) => {
                if weight > 0.0 && !children.is_empty() {
                    let count = children.len() as i32;
                    let selected = ((((count + 1) as f32) * weight) as i32 - 1).clamp(0, count - 1);
                    let child = &children[selected as usize];
                    if let Some(target) = self.child_index(child) {
                        let coefficient = child.coefficient;
                        self.morphs[target].set_weight(coefficient);
                    }
                }
            }
            _ => {}
        }
    }

    fn deform(
        &mut self,
        index: usize,
        check_dirty: bool,
        targets: &mut MorphTargets<'_>,
        visited: &mut HashSet<usize>,
    ) {
        if !visited.insert(index) {
            return;
        }
        let morph = &self.morphs[index];
        if check_dirty && !morph.is_dirty() {
            return;
        }
        let weight = morph.weight();
        match &morph.kind {
            MorphKind::Group(children) => {
                let members: Vec<(usize, f32)> = children
                    .iter()
                    .filter_map(|child| self.child_index(child).map(|i| (i, child.coefficient)))
                    .filter(|&(i, _)| i != index && self.morphs[i].morph_type() != MorphType::Flip)
                    .collect();
                for (child, coefficient) in members {
                    self.morphs[child].set_forced_weight(weight * coefficient);
                    self.deform(child, false, targets, visited);
                }
            }
            MorphKind::Flip(_) => {}
            MorphKind::Impulse(offsets) => {
                for offset in offsets {
                    let Some(body) = usize::try_from(offset.rigid_body_index)
                        .ok()
                        .and_then(|i| targets.rigid_bodies.get_mut(i))
                    else {
                        continue;
                    };
                    if offset.torque.abs_diff_eq(glam::Vec3::ZERO, f32::EPSILON)
                        && offset.velocity.abs_diff_eq(glam::Vec3::ZERO, f32::EPSILON)
                    {
                        body.mark_all_forces_reset();
                    } else if offset.is_local {
                        body.add_local_torque(offset.torque * weight);
                        body.add_local_velocity(offset.velocity * weight);
                    } else {
                        body.add_global_torque(offset.torque * weight);
                        body.add_global_velocity(offset.velocity * weight);
                    }
                }
            }
            MorphKind::Material(offsets) => {
                for offset in offsets {
                    if offset.material_index < 0 {
                        for material in targets.materials.iter_mut() {
                            material.apply_morph(offset, weight);
                        }
                    } else if let Some(material) =
                        targets.materials.get_mut(offset.material_index as usize)
                    {
                        material.apply_morph(offset, weight);
                    }
                }
            }
            MorphKind::Bone(offsets) => {
                for offset in offsets {
                    if let Some(bone) = usize::try_from(offset.bone_index)
                        .ok()
                        .and_then(|i| targets.bones.get_mut(i))
                    {
                        bone.update_local_morph_transform(offset.translation, offset.orientation, weight);
                    }
                }
            }
            MorphKind::Vertex(offsets) => {
                for offset in offsets {
                    if let Some(vertex) = targets.vertices.get_mut(offset.vertex_index as usize) {
                        vertex.add_delta(offset.offset, weight);
                    }
                }
            }
            MorphKind::Uv { layer, offsets } => {
                for offset in offsets {
                    if let Some(vertex) = targets.vertices.get_mut(offset.vertex_index as usize) {
                        vertex.add_uv_delta(*layer, offset.offset, weight);
                    }
                }
            }
        }
    }
}
