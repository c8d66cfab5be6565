//! MMD 模型运行时管理

mod builder;
pub mod config;
mod material;
mod registry;
mod runtime;
mod staging;
mod vertex;

pub use builder::ModelBuilder;
pub use material::{Material, MaterialDeform};
pub use registry::ModelRegistry;
pub use runtime::{MmdModel, OtherModels, OutsideParent};
pub use staging::{BufferHandle, MemoryVertexBuffer, VertexBufferSink};
pub use vertex::{Vertex, VertexWeight};

/// 模型在注册表中的标识
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(pub u32);
