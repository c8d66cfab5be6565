//! 顶点蒙皮计算

mod dual_quat;
mod skinning;

pub use dual_quat::DualQuat;
pub use skinning::{compute_skinning, jet_color, skin_vertex, write_vertex_unit, SkinningContext};

use glam::{Mat4, Vec4};

/// 写入 GPU 顶点缓冲区的顶点（13 个 vec4）
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VertexUnit {
    pub position: Vec4,
    pub normal: Vec4,
    pub texcoord: Vec4,
    pub edge: Vec4,
    pub uva: [Vec4; 4],
    pub weights: Vec4,
    pub indices: Vec4,
    pub info: Vec4,
}

/// 顶点输出模式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VertexDrawMode {
    #[default]
    Skinning,
    /// 以 jet 色表显示当前骨骼的影响权重
    WeightColor,
}

/// 每个骨骼的蒙皮矩阵与法线矩阵
#[derive(Clone, Copy, Debug)]
pub struct BonePalette<'a> {
    pub skinning: &'a [Mat4],
    pub normal: &'a [Mat4],
}

impl<'a> BonePalette<'a> {
    pub fn new(skinning: &'a [Mat4], normal: &'a [Mat4]) -> Self {
        Self { skinning, normal }
    }

    /// 缺失的骨骼按单位矩阵处理
    pub fn skinning_matrix(&self, index: i32) -> Mat4 {
        get_matrix(self.skinning, index)
    }

    pub fn normal_matrix(&self, index: i32) -> Mat4 {
        get_matrix(self.normal, index)
    }
}

fn get_matrix(matrices: &[Mat4], index: i32) -> Mat4 {
    if index < 0 {
        return Mat4::IDENTITY;
    }
    matrices.get(index as usize).copied().unwrap_or(Mat4::IDENTITY)
}
