//! 模型顶点

use glam::{Vec2, Vec3, Vec4};

/// 模型顶点骨骼权重
#[derive(Clone, Debug, PartialEq)]
pub enum VertexWeight {
    Bdef1 { bone: i32 },
    Bdef2 { bones: [i32; 2], weight: f32 },
    Bdef4 { bones: [i32; 4], weights: [f32; 4] },
    Sdef { bones: [i32; 2], weight: f32, c: Vec3, r0: Vec3, r1: Vec3 },
    Qdef { bones: [i32; 4], weights: [f32; 4] },
}

impl VertexWeight {
    /// 类型编号（写入 VertexUnit.info.y）
    pub fn type_index(&self) -> u32 {
        match self {
            VertexWeight::Bdef1 { .. } => 0,
            VertexWeight::Bdef2 { .. } => 1,
            VertexWeight::Bdef4 { .. } => 2,
            VertexWeight::Sdef { .. } => 3,
            VertexWeight::Qdef { .. } => 4,
        }
    }

    /// 四个骨骼槽位，未使用的为 -1
    pub fn bone_indices(&self) -> [i32; 4] {
        match self {
            VertexWeight::Bdef1 { bone } => [*bone, -1, -1, -1],
            VertexWeight::Bdef2 { bones, .. } | VertexWeight::Sdef { bones, .. } => {
                [bones[0], bones[1], -1, -1]
            }
            VertexWeight::Bdef4 { bones, .. } | VertexWeight::Qdef { bones, .. } => *bones,
        }
    }

    /// 四个槽位的权重；两骨骼类型存为 [w0, 1 - w0, 0, 0]
    pub fn weights(&self) -> Vec4 {
        match self {
            VertexWeight::Bdef1 { .. } => Vec4::new(1.0, 0.0, 0.0, 0.0),
            VertexWeight::Bdef2 { weight, .. } | VertexWeight::Sdef { weight, .. } => {
                Vec4::new(*weight, 1.0 - *weight, 0.0, 0.0)
            }
            VertexWeight::Bdef4 { weights, .. } | VertexWeight::Qdef { weights, .. } => {
                Vec4::from_array(*weights)
            }
        }
    }
}

impl Default for VertexWeight {
    fn default() -> Self {
        VertexWeight::Bdef1 { bone: 0 }
    }
}

/// 运行时顶点
///
/// 原始数据在绑定时写入，`delta` 与 `delta_uva` 是每帧由 Morph 累加、蒙皮后清零的增量。
#[derive(Clone, Debug, Default)]
pub struct Vertex {
    pub origin: Vec3,
    pub normal: Vec3,
    pub texcoord: Vec2,
    pub origin_uva: [Vec4; 4],
    pub edge_size: f32,
    pub weight: VertexWeight,
    pub material_index: i32,
    pub soft_body_index: i32,
    /// 所在材质骨骼数超出上限，需要 CPU 蒙皮
    pub skinning_enabled: bool,

    pub delta: Vec3,
    /// [0] 为纹理坐标，[1..=4] 为追加 UV
    pub delta_uva: [Vec4; 5],
}

impl Vertex {
    pub fn new(origin: Vec3, normal: Vec3, texcoord: Vec2, weight: VertexWeight) -> Self {
        Self {
            origin,
            normal,
            texcoord,
            edge_size: 1.0,
            weight,
            material_index: -1,
            soft_body_index: -1,
            ..Default::default()
        }
    }

    pub fn has_soft_body(&self) -> bool {
        self.soft_body_index >= 0
    }

    pub fn add_delta(&mut self, offset: Vec3, weight: f32) {
        self.delta += offset * weight;
    }

    pub fn add_uv_delta(&mut self, layer: usize, offset: Vec4, weight: f32) {
        if let Some(delta) = self.delta_uva.get_mut(layer) {
            *delta += offset * weight;
        }
    }

    /// 清空本帧增量
    pub fn reset(&mut self) {
        self.delta = Vec3::ZERO;
        self.delta_uva = [Vec4::ZERO; 5];
    }

    /// 顶点属性向量：边缘大小、类型、索引、需要变换
    pub fn info(&self, index: usize) -> Vec4 {
        Vec4::new(
            self.edge_size,
            self.weight.type_index() as f32,
            index as f32,
            1.0,
        )
    }
}
