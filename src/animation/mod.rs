//! 动画数据接口
//!
//! 关键帧、轨道与采样；文件解析不在本 crate 内。

mod bezier;
mod keyframe;
mod motion;
mod motion_track;

pub use bezier::BezierCurve;
pub use keyframe::{
    BoneKeyframe, BoneKeyframeInterpolation, Keyframe, ModelKeyframe, MorphKeyframe,
    OutsideParentTarget,
};
pub use motion::{
    coefficient, seek_bone_transform, seek_morph_weight, BoneFrameTransform, Motion,
    MotionSource,
};
pub use motion_track::MotionTrack;

pub(crate) use motion::lerp_f32;
