//! 顶点蒙皮计算

use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3, Vec4};
use rayon::prelude::*;

use super::{BonePalette, VertexDrawMode, VertexUnit};
use crate::model::{Vertex, VertexWeight};

/// 蒙皮上下文
pub struct SkinningContext<'a> {
    pub palette: BonePalette<'a>,
    pub draw_mode: VertexDrawMode,
    /// 权重显示模式下的当前骨骼
    pub active_bone: Option<usize>,
    pub edge_size: f32,
    /// GPU 蒙皮时每个材质的 骨骼索引 -> 材质内索引
    pub bone_index_hashes: Option<&'a [HashMap<i32, i32>]>,
    /// 软体读回的 顶点索引 -> (位置, 法线)
    pub soft_body_vertices: &'a HashMap<usize, (Vec3, Vec3)>,
}

/// 计算蒙皮，写入输出缓冲区
///
/// 每个任务只写自己对应的槽位。
pub fn compute_skinning(
    vertices: &[Vertex],
    context: &SkinningContext<'_>,
    output: &mut [VertexUnit],
    parallel: bool,
) {
    if parallel {
        output
            .par_iter_mut()
            .zip(vertices.par_iter())
            .enumerate()
            .for_each(|(index, (unit, vertex))| write_vertex_unit(unit, index, vertex, context));
    } else {
        for (index, (unit, vertex)) in output.iter_mut().zip(vertices.iter()).enumerate() {
            write_vertex_unit(unit, index, vertex, context);
        }
    }
}

/// 填充单个顶点的输出
pub fn write_vertex_unit(
    unit: &mut VertexUnit,
    index: usize,
    vertex: &Vertex,
    context: &SkinningContext<'_>,
) {
    let bone_indices = vertex.weight.bone_indices();
    let weights = vertex.weight.weights();
    let info = vertex.info(index);
    unit.weights = weights;
    unit.indices = Vec4::new(
        bone_indices[0] as f32,
        bone_indices[1] as f32,
        bone_indices[2] as f32,
        bone_indices[3] as f32,
    );
    unit.info = info;

    // 软体读回的顶点在两种模式下都替代蒙皮结果
    let pulled = context.soft_body_vertices.get(&index).copied();
    let (position, normal) = match context.draw_mode {
        VertexDrawMode::WeightColor => {
            let (position, normal) =
                pulled.unwrap_or_else(|| skin_vertex(vertex, &context.palette));
            let color = context
                .active_bone
                .and_then(|bone| bone_indices.iter().position(|&i| i >= 0 && i as usize == bone))
                .map(|slot| jet_color(weights[slot]))
                .unwrap_or(Vec3::ZERO);
            unit.info = color.extend(1.0);
            unit.edge = position.extend(1.0);
            (position, normal)
        }
        VertexDrawMode::Skinning => {
            let gpu_hash = context
                .bone_index_hashes
                .filter(|_| !vertex.skinning_enabled && pulled.is_none())
                .and_then(|hashes| usize::try_from(vertex.material_index).ok().and_then(|i| hashes.get(i)));
            let (position, normal) = if let Some(hash) = gpu_hash {
                let remap = |i: i32| hash.get(&i).copied().unwrap_or(-1) as f32;
                unit.indices = Vec4::new(
                    remap(bone_indices[0]),
                    remap(bone_indices[1]),
                    remap(bone_indices[2]),
                    remap(bone_indices[3]),
                );
                (vertex.origin + vertex.delta, vertex.normal)
            } else if let Some(pulled) = pulled {
                pulled
            } else {
                skin_vertex(vertex, &context.palette)
            };
            let edge = normal * (info.x * context.edge_size) + position;
            unit.edge = edge.extend(1.0);
            (position, normal)
        }
    };

    unit.position = position.extend(1.0);
    unit.normal = normal.extend(0.0);
    unit.texcoord = Vec4::new(vertex.texcoord.x, vertex.texcoord.y, 0.0, 0.0) + vertex.delta_uva[0];
    for (layer, uva) in unit.uva.iter_mut().enumerate() {
        *uva = vertex.origin_uva[layer] + vertex.delta_uva[layer + 1];
    }
}

/// 按权重类型计算蒙皮后的位置与法线
///
/// 输入位置为原始位置加上 Morph 增量。
pub fn skin_vertex(vertex: &Vertex, palette: &BonePalette<'_>) -> (Vec3, Vec3) {
    let op = vertex.origin + vertex.delta;
    let on = vertex.normal;
    let (position, normal) = match &vertex.weight {
        VertexWeight::Bdef1 { bone } => bdef1(palette, *bone, op, on),
        VertexWeight::Bdef2 { bones, weight } => bdef2(palette, *bones, *weight, op, on),
        VertexWeight::Bdef4 { bones, weights } => bdef4(palette, *bones, *weights, op, on),
        VertexWeight::Sdef {
            bones,
            weight,
            c,
            r0,
            r1,
        } => sdef(palette, *bones, *weight, [*c, *r0, *r1], op, on),
        VertexWeight::Qdef { bones, weights } => qdef(palette, *bones, *weights, op, on),
    };
    (position, normal.normalize_or_zero())
}

fn bdef1(palette: &BonePalette<'_>, bone: i32, op: Vec3, on: Vec3) -> (Vec3, Vec3) {
    let m = palette.skinning_matrix(bone);
    let n = palette.normal_matrix(bone);
    (m.transform_point3(op), n.transform_vector3(on))
}

/// 权重恰为 0 或 1 时只用一个骨骼
fn bdef2(palette: &BonePalette<'_>, bones: [i32; 2], weight: f32, op: Vec3, on: Vec3) -> (Vec3, Vec3) {
    if weight == 0.0 {
        return bdef1(palette, bones[1], op, on);
    }
    if weight == 1.0 {
        return bdef1(palette, bones[0], op, on);
    }
    let (p0, n0) = bdef1(palette, bones[0], op, on);
    let (p1, n1) = bdef1(palette, bones[1], op, on);
    (p1.lerp(p0, weight), n1.lerp(n0, weight))
}

fn bdef4(palette: &BonePalette<'_>, bones: [i32; 4], weights: [f32; 4], op: Vec3, on: Vec3) -> (Vec3, Vec3) {
    let mut position = Vec3::ZERO;
    let mut normal = Vec3::ZERO;
    for i in 0..4 {
        let (p, n) = bdef1(palette, bones[i], op, on);
        position += p * weights[i];
        normal += n * weights[i];
    }
    (position, normal)
}

#[cfg(feature = "sdef")]
fn sdef(
    palette: &BonePalette<'_>,
    bones: [i32; 2],
    weight: f32,
    [c, r0, r1]: [Vec3; 3],
    op: Vec3,
    on: Vec3,
) -> (Vec3, Vec3) {
    let (w0, w1) = (weight, 1.0 - weight);
    let m0 = palette.skinning_matrix(bones[0]);
    let m1 = palette.skinning_matrix(bones[1]);
    let i = r0 * w0 + r1 * w1;
    let r0n = c + r0 - i;
    let r1n = c + r1 - i;
    let delta = (m0.transform_point3(r0n) + m0.transform_point3(c) - c) * w0
        + (m1.transform_point3(r1n) + m1.transform_point3(c) - c) * w1;
    let t = (c + delta) * 0.5;
    let q0 = rotation_of(&m0);
    let q1 = rotation_of(&m1);
    let q = q0.slerp(q1, w1);
    (q * (op - c) + t, q * on)
}

#[cfg(not(feature = "sdef"))]
fn sdef(
    palette: &BonePalette<'_>,
    bones: [i32; 2],
    weight: f32,
    _params: [Vec3; 3],
    op: Vec3,
    on: Vec3,
) -> (Vec3, Vec3) {
    bdef2(palette, bones, weight, op, on)
}

#[cfg(feature = "dual-quaternion")]
fn qdef(palette: &BonePalette<'_>, bones: [i32; 4], weights: [f32; 4], op: Vec3, on: Vec3) -> (Vec3, Vec3) {
    use super::DualQuat;
    let items: Vec<(DualQuat, f32)> = bones
        .iter()
        .zip(weights.iter())
        .filter(|(_, w)| **w != 0.0)
        .map(|(&bone, &w)| (DualQuat::from_mat4(&palette.skinning_matrix(bone)), w))
        .collect();
    if items.is_empty() {
        return bdef4(palette, bones, weights, op, on);
    }
    let dq = DualQuat::blend(&items);
    (dq.transform_point3(op), dq.transform_vector3(on))
}

#[cfg(not(feature = "dual-quaternion"))]
fn qdef(palette: &BonePalette<'_>, bones: [i32; 4], weights: [f32; 4], op: Vec3, on: Vec3) -> (Vec3, Vec3) {
    bdef4(palette, bones, weights, op, on)
}

#[cfg(feature = "sdef")]
fn rotation_of(m: &Mat4) -> Quat {
    let (_, rotation, _) = m.to_scale_rotation_translation();
    rotation.normalize()
}

/// jet 色表（0 蓝 -> 1 红）
pub fn jet_color(value: f32) -> Vec3 {
    let v = value * 4.0;
    Vec3::new(
        (1.5 - (v - 3.0).abs()).clamp(0.0, 1.0),
        (1.5 - (v - 2.0).abs()).clamp(0.0, 1.0),
        (1.5 - (v - 1.0).abs()).clamp(0.0, 1.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn vertex(weight: VertexWeight) -> Vertex {
        Vertex::new(Vec3::new(0.0, 1.0, 0.0), Vec3::Z, Vec2::new(0.25, 0.5), weight)
    }

    fn palette_matrices() -> Vec<Mat4> {
        vec![
            Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)),
            Mat4::from_rotation_translation(Quat::from_rotation_x(0.6), Vec3::new(0.0, 0.0, 2.0)),
        ]
    }

    fn normals_of(skinning: &[Mat4]) -> Vec<Mat4> {
        skinning.iter().map(crate::skeleton::shrink_3x3).collect()
    }

    #[test]
    fn test_bdef2_boundaries_match_bdef1() {
        let skinning = palette_matrices();
        let normal = normals_of(&skinning);
        let palette = BonePalette::new(&skinning, &normal);

        let only_first = skin_vertex(&vertex(VertexWeight::Bdef2 { bones: [0, 1], weight: 1.0 }), &palette);
        let first = skin_vertex(&vertex(VertexWeight::Bdef1 { bone: 0 }), &palette);
        assert_eq!(only_first, first);

        let only_second = skin_vertex(&vertex(VertexWeight::Bdef2 { bones: [0, 1], weight: 0.0 }), &palette);
        let second = skin_vertex(&vertex(VertexWeight::Bdef1 { bone: 1 }), &palette);
        assert_eq!(only_second, second);
    }

    #[test]
    fn test_bdef2_lerps_between_bones() {
        let skinning = vec![Mat4::IDENTITY, Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0))];
        let normal = normals_of(&skinning);
        let palette = BonePalette::new(&skinning, &normal);
        let (p, _) = skin_vertex(&vertex(VertexWeight::Bdef2 { bones: [0, 1], weight: 0.25 }), &palette);
        assert!((p - Vec3::new(1.5, 1.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_sdef_with_identity_bones_is_identity() {
        let skinning = vec![Mat4::IDENTITY; 2];
        let normal = normals_of(&skinning);
        let palette = BonePalette::new(&skinning, &normal);
        let v = vertex(VertexWeight::Sdef {
            bones: [0, 1],
            weight: 0.3,
            c: Vec3::new(0.0, 0.5, 0.0),
            r0: Vec3::new(0.0, 0.2, 0.1),
            r1: Vec3::new(0.1, 0.9, 0.0),
        });
        let (p, n) = skin_vertex(&v, &palette);
        assert!((p - v.origin).length() < 1e-6);
        assert!((n - v.normal).length() < 1e-6);
    }

    #[test]
    fn test_sdef_follows_shared_translation() {
        let skinning = vec![Mat4::from_translation(Vec3::new(0.0, 0.0, 3.0)); 2];
        let normal = normals_of(&skinning);
        let palette = BonePalette::new(&skinning, &normal);
        let v = vertex(VertexWeight::Sdef {
            bones: [0, 1],
            weight: 0.5,
            c: Vec3::ZERO,
            r0: Vec3::new(0.0, -1.0, 0.0),
            r1: Vec3::new(0.0, 1.0, 0.0),
        });
        let (p, _) = skin_vertex(&v, &palette);
        assert!((p - Vec3::new(0.0, 1.0, 3.0)).length() < 1e-5);
    }

    #[test]
    fn test_qdef_matches_bdef4_for_single_bone() {
        let skinning = palette_matrices();
        let normal = normals_of(&skinning);
        let palette = BonePalette::new(&skinning, &normal);
        let weights = [1.0, 0.0, 0.0, 0.0];
        let (pq, _) = skin_vertex(&vertex(VertexWeight::Qdef { bones: [1, 0, -1, -1], weights }), &palette);
        let (pb, _) = skin_vertex(&vertex(VertexWeight::Bdef4 { bones: [1, 0, -1, -1], weights }), &palette);
        assert!((pq - pb).length() < 1e-5);
    }

    #[test]
    fn test_missing_bone_uses_identity() {
        let palette = BonePalette::new(&[], &[]);
        let (p, n) = skin_vertex(&vertex(VertexWeight::Bdef1 { bone: 7 }), &palette);
        assert_eq!(p, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(n, Vec3::Z);
    }

    #[test]
    fn test_vertex_unit_edge_and_uv() {
        let skinning = vec![Mat4::IDENTITY];
        let normal = normals_of(&skinning);
        let soft = HashMap::new();
        let context = SkinningContext {
            palette: BonePalette::new(&skinning, &normal),
            draw_mode: VertexDrawMode::Skinning,
            active_bone: None,
            edge_size: 2.0,
            bone_index_hashes: None,
            soft_body_vertices: &soft,
        };
        let mut v = vertex(VertexWeight::Bdef1 { bone: 0 });
        v.edge_size = 0.5;
        v.origin_uva[1] = Vec4::ONE;
        v.add_uv_delta(0, Vec4::new(0.25, 0.0, 0.0, 0.0), 1.0);
        v.add_uv_delta(2, Vec4::ONE, 0.5);
        let mut unit = VertexUnit::default();
        write_vertex_unit(&mut unit, 3, &v, &context);
        // 法线 * (0.5 * 2.0) + 位置
        assert_eq!(unit.edge, Vec4::new(0.0, 1.0, 1.0, 1.0));
        assert_eq!(unit.texcoord, Vec4::new(0.5, 0.5, 0.0, 0.0));
        assert_eq!(unit.uva[1], Vec4::splat(1.5));
        assert_eq!(unit.info, Vec4::new(0.5, 0.0, 3.0, 1.0));
    }

    #[test]
    fn test_gpu_path_remaps_indices_and_skips_skinning() {
        let skinning = vec![Mat4::from_translation(Vec3::X); 3];
        let normal = normals_of(&skinning);
        let soft = HashMap::new();
        let hashes = vec![[(2, 0)].into_iter().collect::<HashMap<i32, i32>>()];
        let context = SkinningContext {
            palette: BonePalette::new(&skinning, &normal),
            draw_mode: VertexDrawMode::Skinning,
            active_bone: None,
            edge_size: 1.0,
            bone_index_hashes: Some(&hashes),
            soft_body_vertices: &soft,
        };
        let mut v = vertex(VertexWeight::Bdef2 { bones: [2, 1], weight: 0.5 });
        v.material_index = 0;
        let mut unit = VertexUnit::default();
        write_vertex_unit(&mut unit, 0, &v, &context);
        assert_eq!(unit.indices, Vec4::new(0.0, -1.0, -1.0, -1.0));
        assert_eq!(unit.position, Vec4::new(0.0, 1.0, 0.0, 1.0));

        v.skinning_enabled = true;
        write_vertex_unit(&mut unit, 0, &v, &context);
        assert_eq!(unit.position, Vec4::new(1.0, 1.0, 0.0, 1.0));
    }

    #[test]
    fn test_weight_color_mode() {
        let skinning = vec![Mat4::IDENTITY; 2];
        let normal = normals_of(&skinning);
        let soft = HashMap::new();
        let context = SkinningContext {
            palette: BonePalette::new(&skinning, &normal),
            draw_mode: VertexDrawMode::WeightColor,
            active_bone: Some(1),
            edge_size: 1.0,
            bone_index_hashes: None,
            soft_body_vertices: &soft,
        };
        let v = vertex(VertexWeight::Bdef2 { bones: [0, 1], weight: 0.75 });
        let mut unit = VertexUnit::default();
        write_vertex_unit(&mut unit, 0, &v, &context);
        // 骨骼 1 的权重为 0.25
        assert_eq!(unit.info, jet_color(0.25).extend(1.0));
        assert_eq!(jet_color(0.0), Vec3::new(0.0, 0.0, 0.5));
        assert_eq!(jet_color(1.0), Vec3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn test_soft_body_position_in_weight_color_mode() {
        let skinning = vec![Mat4::from_translation(Vec3::X); 2];
        let normal = normals_of(&skinning);
        let soft: HashMap<usize, (Vec3, Vec3)> =
            [(0, (Vec3::splat(9.0), Vec3::Y))].into_iter().collect();
        let context = SkinningContext {
            palette: BonePalette::new(&skinning, &normal),
            draw_mode: VertexDrawMode::WeightColor,
            active_bone: Some(0),
            edge_size: 1.0,
            bone_index_hashes: None,
            soft_body_vertices: &soft,
        };
        let v = vertex(VertexWeight::Bdef1 { bone: 0 });
        let mut unit = VertexUnit::default();
        write_vertex_unit(&mut unit, 0, &v, &context);
        assert_eq!(unit.position, Vec4::new(9.0, 9.0, 9.0, 1.0));
        assert_eq!(unit.edge, Vec4::new(9.0, 9.0, 9.0, 1.0));

        write_vertex_unit(&mut unit, 1, &v, &context);
        assert_eq!(unit.position, Vec4::new(1.0, 1.0, 0.0, 1.0));
    }

    #[test]
    fn test_parallel_and_serial_agree() {
        let skinning = palette_matrices();
        let normal = normals_of(&skinning);
        let soft = HashMap::new();
        let context = SkinningContext {
            palette: BonePalette::new(&skinning, &normal),
            draw_mode: VertexDrawMode::Skinning,
            active_bone: None,
            edge_size: 1.0,
            bone_index_hashes: None,
            soft_body_vertices: &soft,
        };
        let vertices: Vec<Vertex> = (0..64)
            .map(|i| vertex(VertexWeight::Bdef2 { bones: [0, 1], weight: i as f32 / 63.0 }))
            .collect();
        let mut serial = vec![VertexUnit::default(); vertices.len()];
        let mut parallel = vec![VertexUnit::default(); vertices.len()];
        compute_skinning(&vertices, &context, &mut serial, false);
        compute_skinning(&vertices, &context, &mut parallel, true);
        assert_eq!(serial, parallel);
        assert_eq!(std::mem::size_of::<VertexUnit>(), 13 * 16);
    }
}
