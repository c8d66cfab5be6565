//! 双四元数（QDEF）

use glam::{Mat4, Quat, Vec3};

/// 单位双四元数表示的刚体变换
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DualQuat {
    pub real: Quat,
    pub dual: Quat,
}

impl DualQuat {
    pub const IDENTITY: Self = Self {
        real: Quat::IDENTITY,
        dual: Quat::from_xyzw(0.0, 0.0, 0.0, 0.0),
    };

    pub fn from_rotation_translation(rotation: Quat, translation: Vec3) -> Self {
        let t = Quat::from_xyzw(translation.x, translation.y, translation.z, 0.0);
        Self {
            real: rotation,
            dual: (t * rotation) * 0.5,
        }
    }

    /// 忽略缩放
    pub fn from_mat4(m: &Mat4) -> Self {
        let (_, rotation, translation) = m.to_scale_rotation_translation();
        Self::from_rotation_translation(rotation.normalize(), translation)
    }

    pub fn translation(&self) -> Vec3 {
        let t = (self.dual * 2.0) * self.real.conjugate();
        Vec3::new(t.x, t.y, t.z)
    }

    pub fn transform_point3(&self, p: Vec3) -> Vec3 {
        self.real * p + self.translation()
    }

    pub fn transform_vector3(&self, v: Vec3) -> Vec3 {
        self.real * v
    }

    /// 线性混合后归一化；与第一个分量不在同一半球的取反
    pub fn blend(items: &[(DualQuat, f32)]) -> Self {
        let Some(&(pivot, _)) = items.first() else {
            return Self::IDENTITY;
        };
        let mut real = Quat::from_xyzw(0.0, 0.0, 0.0, 0.0);
        let mut dual = Quat::from_xyzw(0.0, 0.0, 0.0, 0.0);
        for &(dq, weight) in items {
            let w = if pivot.real.dot(dq.real) < 0.0 { -weight } else { weight };
            real = real + dq.real * w;
            dual = dual + dq.dual * w;
        }
        let length = real.length();
        if length <= f32::EPSILON {
            return Self::IDENTITY;
        }
        Self {
            real: real * (1.0 / length),
            dual: dual * (1.0 / length),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_matrix_for_rigid_transform() {
        let m = Mat4::from_rotation_translation(Quat::from_rotation_y(0.7), Vec3::new(1.0, 2.0, 3.0));
        let dq = DualQuat::from_mat4(&m);
        let p = Vec3::new(0.5, -1.0, 2.0);
        assert!((dq.transform_point3(p) - m.transform_point3(p)).length() < 1e-5);
    }

    #[test]
    fn test_blend_of_translations_is_linear() {
        let a = DualQuat::from_rotation_translation(Quat::IDENTITY, Vec3::ZERO);
        let b = DualQuat::from_rotation_translation(Quat::IDENTITY, Vec3::new(2.0, 0.0, 0.0));
        let blended = DualQuat::blend(&[(a, 0.5), (b, 0.5)]);
        assert!((blended.translation() - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);
    }
}
