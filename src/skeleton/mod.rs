//! 骨骼系统和 IK 求解器

mod bone;
mod ik_solver;
mod manager;

pub use bone::{Bone, IkConfig, IkLink};
pub use ik_solver::{Constraint, ConstraintJointResult};
pub use manager::BoneManager;

pub(crate) use bone::shrink_3x3;

/// 骨骼评估阶段（物理前 / 物理后）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeformTiming {
    BeforePhysics,
    AfterPhysics,
}

impl DeformTiming {
    /// 骨骼是否属于该阶段
    pub fn includes(self, bone: &Bone) -> bool {
        match self {
            DeformTiming::BeforePhysics => !bone.deform_after_physics,
            DeformTiming::AfterPhysics => bone.deform_after_physics,
        }
    }
}
