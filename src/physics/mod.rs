//! 物理系统模块
//!
//! 模型侧只依赖 `PhysicsEngine` 接口；`MmdPhysics` 是 Rapier3D 实现。
//!
//! ## 对应关系
//! | 模型侧 | Rapier |
//! |--------|--------|
//! | MmdRigidBody | RigidBody + Collider |
//! | MmdJoint | GenericJoint with limits/motors |
//! | MmdSoftBody | 不支持，回退到蒙皮 |

pub mod config;
mod engine;
mod mmd_joint;
mod mmd_physics;
mod mmd_rigid_body;

pub use config::{get_config, reset_config, set_config, PhysicsConfig};
pub use engine::{
    BodyId, JointDescriptor, JointId, PhysicsEngine, RigidBodyDescriptor, RigidBodyFollowBone,
    RigidBodyShape, RigidBodyTransformType, SoftBodyDescriptor, SoftBodyId, SoftBodyVertex,
};
pub use mmd_joint::{MmdJoint, MmdSoftBody};
pub use mmd_physics::{isometry_to_mat4, mat4_to_isometry, MmdPhysics};
pub use mmd_rigid_body::MmdRigidBody;

#[cfg(test)]
pub(crate) use mmd_rigid_body::tests::RecordingEngine;
