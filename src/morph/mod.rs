//! Morph 变形系统
//!
//! 组/翻转 Morph 先做预变形，再把各类偏移写入顶点、骨骼、材质与刚体。

mod manager;
mod morph;

pub use manager::{MorphManager, MorphTargets};
pub use morph::Morph;

use glam::{Quat, Vec3, Vec4};

/// Morph 分类（面板）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MorphCategory {
    Base,
    Eyebrow,
    Eye,
    Lip,
    Other,
}

impl MorphCategory {
    pub const ALL: [MorphCategory; 5] = [
        MorphCategory::Base,
        MorphCategory::Eyebrow,
        MorphCategory::Eye,
        MorphCategory::Lip,
        MorphCategory::Other,
    ];
}

/// Morph 类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MorphType {
    Group,
    Flip,
    Vertex,
    Bone,
    Uv,
    Material,
    Impulse,
}

/// 顶点 Morph 偏移
#[derive(Clone, Debug)]
pub struct VertexMorphOffset {
    pub vertex_index: u32,
    pub offset: Vec3,
}

/// UV Morph 偏移
#[derive(Clone, Debug)]
pub struct UvMorphOffset {
    pub vertex_index: u32,
    pub offset: Vec4,
}

/// 骨骼 Morph 偏移
#[derive(Clone, Debug)]
pub struct BoneMorphOffset {
    pub bone_index: i32,
    pub translation: Vec3,
    pub orientation: Quat,
}

/// 材质 Morph 运算
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterialMorphOperation {
    Multiply,
    Add,
}

/// 材质 Morph 偏移
#[derive(Clone, Debug)]
pub struct MaterialMorphOffset {
    /// -1 表示所有材质
    pub material_index: i32,
    pub operation: MaterialMorphOperation,
    pub diffuse: Vec4,
    pub specular: Vec3,
    pub specular_power: f32,
    pub ambient: Vec3,
    pub edge_color: Vec4,
    pub edge_size: f32,
    pub diffuse_texture_blend: Vec4,
    pub sphere_texture_blend: Vec4,
    pub toon_texture_blend: Vec4,
}

impl MaterialMorphOffset {
    /// 运算的单位元（乘法全 1，加法全 0）
    pub fn identity(material_index: i32, operation: MaterialMorphOperation) -> Self {
        let v = match operation {
            MaterialMorphOperation::Multiply => 1.0,
            MaterialMorphOperation::Add => 0.0,
        };
        Self {
            material_index,
            operation,
            diffuse: Vec4::splat(v),
            specular: Vec3::splat(v),
            specular_power: v,
            ambient: Vec3::splat(v),
            edge_color: Vec4::splat(v),
            edge_size: v,
            diffuse_texture_blend: Vec4::splat(v),
            sphere_texture_blend: Vec4::splat(v),
            toon_texture_blend: Vec4::splat(v),
        }
    }
}

/// 组/翻转 Morph 的子项
#[derive(Clone, Debug)]
pub struct GroupMorphOffset {
    pub morph_index: i32,
    pub coefficient: f32,
}

/// 冲量 Morph 偏移
#[derive(Clone, Debug)]
pub struct ImpulseMorphOffset {
    pub rigid_body_index: i32,
    pub is_local: bool,
    pub velocity: Vec3,
    pub torque: Vec3,
}

/// Morph 内容
#[derive(Clone, Debug)]
pub enum MorphKind {
    Group(Vec<GroupMorphOffset>),
    Flip(Vec<GroupMorphOffset>),
    Vertex(Vec<VertexMorphOffset>),
    Bone(Vec<BoneMorphOffset>),
    /// layer 0 为纹理坐标，1..=4 为追加 UV
    Uv {
        layer: usize,
        offsets: Vec<UvMorphOffset>,
    },
    Material(Vec<MaterialMorphOffset>),
    Impulse(Vec<ImpulseMorphOffset>),
}

impl MorphKind {
    pub fn morph_type(&self) -> MorphType {
        match self {
            MorphKind::Group(_) => MorphType::Group,
            MorphKind::Flip(_) => MorphType::Flip,
            MorphKind::Vertex(_) => MorphType::Vertex,
            MorphKind::Bone(_) => MorphType::Bone,
            MorphKind::Uv { .. } => MorphType::Uv,
            MorphKind::Material(_) => MorphType::Material,
            MorphKind::Impulse(_) => MorphType::Impulse,
        }
    }
}
