//! MMD Runtime - MMD 兼容模型的逐帧变形运行时
//!
//! 提供：
//! - 骨骼层级求值（附加变换、外部亲骨骼）
//! - IK 约束求解
//! - Morph 变形（组/翻转/顶点/骨骼/UV/材质/冲量）
//! - 顶点蒙皮（BDEF1/2/4、SDEF、QDEF）与双缓冲顶点上传
//! - 刚体/关节物理同步（Rapier3D 后端）

pub mod animation;
pub mod model;
pub mod morph;
pub mod physics;
pub mod skeleton;
pub mod skinning;

pub use animation::{Motion, MotionSource};
pub use model::{
    MemoryVertexBuffer, MmdModel, ModelBuilder, ModelId, ModelRegistry, OtherModels,
    VertexBufferSink,
};
pub use morph::{Morph, MorphManager};
pub use physics::{MmdJoint, MmdPhysics, MmdRigidBody, PhysicsEngine};
pub use skeleton::{Bone, BoneManager, Constraint};
pub use skinning::VertexUnit;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MmdError {
    #[error("Physics error: {0}")]
    Physics(String),

    #[error("Joint {joint} references rigid body {body} without a native handle")]
    UnboundRigidBody { joint: usize, body: i32 },

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Vertex buffer error: {0}")]
    VertexBuffer(String),
}

pub type Result<T> = std::result::Result<T, MmdError>;
