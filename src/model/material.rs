//! MMD 材质定义

use glam::{Vec3, Vec4};

use crate::morph::{MaterialMorphOffset, MaterialMorphOperation};

const MINIMUM_SPECULAR_POWER: f32 = 0.1;

/// 材质 Morph 的乘/加累积量
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialDeform {
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

impl MaterialDeform {
    pub fn splat(v: f32) -> Self {
        Self {
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

/// MMD 材质
#[derive(Clone, Debug)]
pub struct Material {
    pub name: String,
    pub english_name: String,
    /// rgb + 不透明度
    pub diffuse: Vec4,
    pub specular: Vec3,
    pub specular_power: f32,
    pub ambient: Vec3,
    pub edge_color: Vec4,
    pub edge_size: f32,
    pub texture_index: i32,
    pub sphere_texture_index: i32,
    pub toon_index: i32,
    pub draw_flags: u8,
    /// 在模型索引缓冲区中占用的索引数
    pub index_count: usize,
    pub visible: bool,

    pub mul: MaterialDeform,
    pub add: MaterialDeform,
}

impl Material {
    pub fn new(name: impl Into<String>, index_count: usize) -> Self {
        Self {
            name: name.into(),
            index_count,
            ..Default::default()
        }
    }

    /// 是否双面渲染
    pub fn is_double_sided(&self) -> bool {
        (self.draw_flags & 0x01) != 0
    }

    /// 是否投射阴影
    pub fn casts_shadow(&self) -> bool {
        (self.draw_flags & 0x02) != 0
    }

    /// 是否接收阴影
    pub fn receives_shadow(&self) -> bool {
        (self.draw_flags & 0x04) != 0
    }

    /// 是否绘制边缘
    pub fn has_edge(&self) -> bool {
        (self.draw_flags & 0x10) != 0
    }

    /// 清空 Morph 累积
    pub fn reset_deform(&mut self) {
        self.mul = MaterialDeform::splat(1.0);
        self.add = MaterialDeform::splat(0.0);
    }

    /// 累加一个材质 Morph 偏移
    pub fn apply_morph(&mut self, offset: &MaterialMorphOffset, weight: f32) {
        match offset.operation {
            MaterialMorphOperation::Multiply => {
                let m = &mut self.mul;
                m.diffuse *= Vec4::ONE.lerp(offset.diffuse, weight);
                m.specular *= Vec3::ONE.lerp(offset.specular, weight);
                m.specular_power *= 1.0 + (offset.specular_power - 1.0) * weight;
                m.ambient *= Vec3::ONE.lerp(offset.ambient, weight);
                m.edge_color *= Vec4::ONE.lerp(offset.edge_color, weight);
                m.edge_size *= 1.0 + (offset.edge_size - 1.0) * weight;
                m.diffuse_texture_blend *= Vec4::ONE.lerp(offset.diffuse_texture_blend, weight);
                m.sphere_texture_blend *= Vec4::ONE.lerp(offset.sphere_texture_blend, weight);
                m.toon_texture_blend *= Vec4::ONE.lerp(offset.toon_texture_blend, weight);
            }
            MaterialMorphOperation::Add => {
                let a = &mut self.add;
                a.diffuse += offset.diffuse * weight;
                a.specular += offset.specular * weight;
                a.specular_power += offset.specular_power * weight;
                a.ambient += offset.ambient * weight;
                a.edge_color += offset.edge_color * weight;
                a.edge_size += offset.edge_size * weight;
                a.diffuse_texture_blend += offset.diffuse_texture_blend * weight;
                a.sphere_texture_blend += offset.sphere_texture_blend * weight;
                a.toon_texture_blend += offset.toon_texture_blend * weight;
            }
        }
    }

    pub fn effective_diffuse(&self) -> Vec4 {
        self.diffuse * self.mul.diffuse + self.add.diffuse
    }

    pub fn effective_specular(&self) -> Vec3 {
        self.specular * self.mul.specular + self.add.specular
    }

    pub fn effective_specular_power(&self) -> f32 {
        (self.specular_power * self.mul.specular_power + self.add.specular_power)
            .max(MINIMUM_SPECULAR_POWER)
    }

    pub fn effective_ambient(&self) -> Vec3 {
        self.ambient * self.mul.ambient + self.add.ambient
    }

    pub fn effective_edge_color(&self) -> Vec4 {
        self.edge_color * self.mul.edge_color + self.add.edge_color
    }

    pub fn effective_edge_size(&self) -> f32 {
        self.edge_size * self.mul.edge_size + self.add.edge_size
    }

    /// 贴图混合系数（基准为 1）
    pub fn effective_texture_blends(&self) -> [Vec4; 3] {
        [
            self.mul.diffuse_texture_blend + self.add.diffuse_texture_blend,
            self.mul.sphere_texture_blend + self.add.sphere_texture_blend,
            self.mul.toon_texture_blend + self.add.toon_texture_blend,
        ]
    }
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            english_name: String::new(),
            diffuse: Vec4::new(1.0, 1.0, 1.0, 1.0),
            specular: Vec3::new(0.0, 0.0, 0.0),
            specular_power: 1.0,
            ambient: Vec3::new(0.5, 0.5, 0.5),
            edge_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            edge_size: 1.0,
            texture_index: -1,
            sphere_texture_index: -1,
            toon_index: -1,
            draw_flags: 0,
            index_count: 0,
            visible: true,
            mul: MaterialDeform::splat(1.0),
            add: MaterialDeform::splat(0.0),
        }
    }
}
