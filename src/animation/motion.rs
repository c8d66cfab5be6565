//! Motion 数据与采样
//!
//! `MotionSource` 是运行时消费动画数据的唯一入口；`Motion` 为内存实现。

use std::collections::HashMap;

use glam::{Quat, Vec3};

use super::keyframe::{BoneKeyframe, ModelKeyframe, MorphKeyframe};
use super::motion_track::MotionTrack;

/// 动画数据提供者
pub trait MotionSource: Send + Sync {
    fn find_bone_keyframe(&self, name: &str, frame_index: u32) -> Option<&BoneKeyframe>;

    fn search_closest_bone_keyframes(
        &self,
        name: &str,
        frame_index: u32,
    ) -> (Option<&BoneKeyframe>, Option<&BoneKeyframe>);

    fn find_morph_keyframe(&self, name: &str, frame_index: u32) -> Option<&MorphKeyframe>;

    fn search_closest_morph_keyframes(
        &self,
        name: &str,
        frame_index: u32,
    ) -> (Option<&MorphKeyframe>, Option<&MorphKeyframe>);

    fn find_model_keyframe(&self, frame_index: u32) -> Option<&ModelKeyframe>;

    fn search_closest_model_keyframes(
        &self,
        frame_index: u32,
    ) -> (Option<&ModelKeyframe>, Option<&ModelKeyframe>);
}

/// 前后关键帧之间的插值系数
pub fn coefficient(prev_frame_index: u32, next_frame_index: u32, frame_index: u32) -> f32 {
    let interval = next_frame_index.saturating_sub(prev_frame_index);
    if interval == 0 {
        return 0.0;
    }
    let offset = frame_index.saturating_sub(prev_frame_index);
    (offset as f32 / interval as f32).clamp(0.0, 1.0)
}

/// 骨骼帧采样结果
#[derive(Debug, Clone, Copy)]
pub struct BoneFrameTransform {
    pub translation: Vec3,
    pub orientation: Quat,
    /// 物理交接时从当前用户变换向目标混合的系数
    pub local_transform_mix: Option<f32>,
}

impl Default for BoneFrameTransform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            local_transform_mix: None,
        }
    }
}

impl BoneFrameTransform {
    fn from_keyframe(keyframe: &BoneKeyframe) -> Self {
        Self {
            translation: keyframe.translation,
            orientation: keyframe.orientation,
            local_transform_mix: None,
        }
    }

    /// 混合平移（考虑 local_transform_mix）
    pub fn mixed_translation(&self, local_user_translation: Vec3) -> Vec3 {
        match self.local_transform_mix {
            Some(coef) => local_user_translation.lerp(self.translation, coef),
            None => self.translation,
        }
    }

    /// 混合旋转（考虑 local_transform_mix）
    pub fn mixed_orientation(&self, local_user_orientation: Quat) -> Quat {
        match self.local_transform_mix {
            Some(coef) => local_user_orientation.slerp(self.orientation, coef),
            None => self.orientation,
        }
    }
}

/// 采样骨骼在指定帧的变换
///
/// `rigid_body_bound` 为真且前帧交给物理、后帧不交给物理时，
/// 结果携带混合系数，由调用者从当前用户变换过渡到后帧。
pub fn seek_bone_transform(
    motion: &dyn MotionSource,
    name: &str,
    frame_index: u32,
    rigid_body_bound: bool,
) -> BoneFrameTransform {
    if let Some(keyframe) = motion.find_bone_keyframe(name, frame_index) {
        return BoneFrameTransform::from_keyframe(keyframe);
    }
    match motion.search_closest_bone_keyframes(name, frame_index) {
        (Some(prev), Some(next)) => {
            let coef = coefficient(prev.frame_index, next.frame_index, frame_index);
            if rigid_body_bound
                && prev.physics_simulation_enabled
                && !next.physics_simulation_enabled
            {
                return BoneFrameTransform {
                    translation: next.translation,
                    orientation: next.orientation,
                    local_transform_mix: Some(coef),
                };
            }
            let interpolation = &next.interpolation;
            let translation = Vec3::new(
                lerp_f32(
                    prev.translation.x,
                    next.translation.x,
                    interpolation.translation_x.ease(coef),
                ),
                lerp_f32(
                    prev.translation.y,
                    next.translation.y,
                    interpolation.translation_y.ease(coef),
                ),
                lerp_f32(
                    prev.translation.z,
                    next.translation.z,
                    interpolation.translation_z.ease(coef),
                ),
            );
            let orientation = prev
                .orientation
                .slerp(next.orientation, interpolation.orientation.ease(coef));
            BoneFrameTransform {
                translation,
                orientation,
                local_transform_mix: None,
            }
        }
        // 最后一帧之后保持最后一帧，第一帧之前使用第一帧
        (Some(keyframe), None) | (None, Some(keyframe)) => BoneFrameTransform::from_keyframe(keyframe),
        (None, None) => BoneFrameTransform::default(),
    }
}

/// 采样 Morph 在指定帧的权重
pub fn seek_morph_weight(motion: &dyn MotionSource, name: &str, frame_index: u32) -> f32 {
    if let Some(keyframe) = motion.find_morph_keyframe(name, frame_index) {
        return keyframe.weight;
    }
    match motion.search_closest_morph_keyframes(name, frame_index) {
        (Some(prev), Some(next)) => {
            let coef = coefficient(prev.frame_index, next.frame_index, frame_index);
            lerp_f32(prev.weight, next.weight, coef)
        }
        (Some(keyframe), None) | (None, Some(keyframe)) => keyframe.weight,
        (None, None) => 0.0,
    }
}

pub(crate) fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// 动画数据
#[derive(Debug, Clone, Default)]
pub struct Motion {
    /// 骨骼名称 -> 轨道
    bone_tracks: HashMap<String, MotionTrack<BoneKeyframe>>,
    /// Morph 名称 -> 轨道
    morph_tracks: HashMap<String, MotionTrack<MorphKeyframe>>,
    model_track: MotionTrack<ModelKeyframe>,
}

impl Motion {
    pub fn new() -> Self {
        Self::default()
    }

    /// 动画长度（最大帧号）
    pub fn duration(&self) -> u32 {
        let bone_max = self
            .bone_tracks
            .values()
            .map(|t| t.max_frame_index())
            .max()
            .unwrap_or(0);
        let morph_max = self
            .morph_tracks
            .values()
            .map(|t| t.max_frame_index())
            .max()
            .unwrap_or(0);
        bone_max.max(morph_max).max(self.model_track.max_frame_index())
    }

    pub fn insert_bone_keyframe(&mut self, name: &str, keyframe: BoneKeyframe) {
        self.bone_tracks
            .entry(name.to_string())
            .or_default()
            .insert_keyframe(keyframe);
    }

    pub fn insert_morph_keyframe(&mut self, name: &str, keyframe: MorphKeyframe) {
        self.morph_tracks
            .entry(name.to_string())
            .or_default()
            .insert_keyframe(keyframe);
    }

    pub fn insert_model_keyframe(&mut self, keyframe: ModelKeyframe) {
        self.model_track.insert_keyframe(keyframe);
    }

    pub fn bone_track(&self, name: &str) -> Option<&MotionTrack<BoneKeyframe>> {
        self.bone_tracks.get(name)
    }

    pub fn morph_track(&self, name: &str) -> Option<&MotionTrack<MorphKeyframe>> {
        self.morph_tracks.get(name)
    }
}

impl MotionSource for Motion {
    fn find_bone_keyframe(&self, name: &str, frame_index: u32) -> Option<&BoneKeyframe> {
        self.bone_tracks.get(name)?.find(frame_index)
    }

    fn search_closest_bone_keyframes(
        &self,
        name: &str,
        frame_index: u32,
    ) -> (Option<&BoneKeyframe>, Option<&BoneKeyframe>) {
        self.bone_tracks
            .get(name)
            .map(|t| t.search_closest(frame_index))
            .unwrap_or((None, None))
    }

    fn find_morph_keyframe(&self, name: &str, frame_index: u32) -> Option<&MorphKeyframe> {
        self.morph_tracks.get(name)?.find(frame_index)
    }

    fn search_closest_morph_keyframes(
        &self,
        name: &str,
        frame_index: u32,
    ) -> (Option<&MorphKeyframe>, Option<&MorphKeyframe>) {
        self.morph_tracks
            .get(name)
            .map(|t| t.search_closest(frame_index))
            .unwrap_or((None, None))
    }

    fn find_model_keyframe(&self, frame_index: u32) -> Option<&ModelKeyframe> {
        self.model_track.find(frame_index)
    }

    fn search_closest_model_keyframes(
        &self,
        frame_index: u32,
    ) -> (Option<&ModelKeyframe>, Option<&ModelKeyframe>) {
        self.model_track.search_closest(frame_index)
    }
}
