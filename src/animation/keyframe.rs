//! 动画关键帧

use std::collections::HashMap;

use glam::{Quat, Vec3, Vec4};

use super::BezierCurve;
use crate::model::ModelId;

/// 轨道中按帧号排序的元素
pub trait Keyframe {
    fn frame_index(&self) -> u32;
}

/// 骨骼关键帧的四条插值曲线
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoneKeyframeInterpolation {
    pub translation_x: BezierCurve,
    pub translation_y: BezierCurve,
    pub translation_z: BezierCurve,
    pub orientation: BezierCurve,
}

/// 骨骼关键帧
#[derive(Clone, Debug)]
pub struct BoneKeyframe {
    pub frame_index: u32,
    pub translation: Vec3,
    pub orientation: Quat,
    pub interpolation: BoneKeyframeInterpolation,
    /// 该帧是否交给物理模拟
    pub physics_simulation_enabled: bool,
}

impl BoneKeyframe {
    pub fn new(frame_index: u32) -> Self {
        Self {
            frame_index,
            translation: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            interpolation: BoneKeyframeInterpolation::default(),
            physics_simulation_enabled: true,
        }
    }

    pub fn with_transform(frame_index: u32, translation: Vec3, orientation: Quat) -> Self {
        Self {
            translation,
            orientation,
            ..Self::new(frame_index)
        }
    }
}

impl Keyframe for BoneKeyframe {
    fn frame_index(&self) -> u32 {
        self.frame_index
    }
}

/// Morph 关键帧
#[derive(Clone, Debug)]
pub struct MorphKeyframe {
    pub frame_index: u32,
    pub weight: f32,
}

impl MorphKeyframe {
    pub fn new(frame_index: u32, weight: f32) -> Self {
        Self { frame_index, weight }
    }
}

impl Keyframe for MorphKeyframe {
    fn frame_index(&self) -> u32 {
        self.frame_index
    }
}

/// 外部亲骨骼的目标（其他模型的骨骼名）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutsideParentTarget {
    pub model: ModelId,
    pub bone_name: String,
}

/// 模型关键帧（显示、边缘、物理开关、IK 开关、外部亲）
#[derive(Clone, Debug)]
pub struct ModelKeyframe {
    pub frame_index: u32,
    pub visible: bool,
    pub edge_scale_factor: f32,
    pub edge_color: Vec4,
    pub physics_simulation_enabled: bool,
    /// IK 骨骼名 -> 是否启用
    pub constraint_states: HashMap<String, bool>,
    /// 被附着的骨骼名 -> 目标
    pub outside_parents: HashMap<String, OutsideParentTarget>,
}

impl ModelKeyframe {
    pub fn new(frame_index: u32) -> Self {
        Self {
            frame_index,
            visible: true,
            edge_scale_factor: 1.0,
            edge_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            physics_simulation_enabled: true,
            constraint_states: HashMap::new(),
            outside_parents: HashMap::new(),
        }
    }
}

impl Keyframe for ModelKeyframe {
    fn frame_index(&self) -> u32 {
        self.frame_index
    }
}
