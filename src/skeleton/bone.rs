//! 骨骼节点

use std::f32::consts::FRAC_PI_2;

use glam::{Mat3, Mat4, Quat, Vec3};

/// 左右ひざ：IK 求解时视为单轴（X）关节
const KNEE_BONE_NAMES: [&str; 2] = ["左ひざ", "右ひざ"];

/// IK 链接信息
#[derive(Clone, Debug)]
pub struct IkLink {
    pub bone_index: i32,
    pub has_limits: bool,
    pub limit_min: Vec3,
    pub limit_max: Vec3,
}

impl IkLink {
    pub fn new(bone_index: i32) -> Self {
        Self {
            bone_index,
            has_limits: false,
            limit_min: Vec3::ZERO,
            limit_max: Vec3::ZERO,
        }
    }

    pub fn with_limits(bone_index: i32, limit_min: Vec3, limit_max: Vec3) -> Self {
        Self {
            bone_index,
            has_limits: true,
            limit_min,
            limit_max,
        }
    }
}

/// IK 配置（挂在 IK 骨骼上，IK 骨骼本身是求解目标）
#[derive(Clone, Debug)]
pub struct IkConfig {
    /// 需要靠近 IK 骨骼的链末端骨骼
    pub effector_bone: i32,
    pub iterations: u32,
    pub limit_angle: f32,
    pub links: Vec<IkLink>,
}

/// 骨骼节点
///
/// 本地变换由多个分量合成：用户/动画、Morph、附加（继承）与 IK 关节旋转。
#[derive(Clone, Debug)]
pub struct Bone {
    pub name: String,
    pub english_name: String,
    pub parent_index: i32,
    pub transform_level: i32,

    /// 绑定姿势下的骨骼原点（模型空间）
    pub origin: Vec3,

    // 骨骼标志
    pub is_rotatable: bool,
    pub is_movable: bool,
    pub is_visible: bool,
    pub is_user_handleable: bool,
    pub is_inherit_rotation: bool,
    pub is_inherit_translation: bool,
    pub is_inherit_local: bool,
    pub is_fixed_axis: bool,
    pub is_local_axis: bool,
    pub deform_after_physics: bool,

    // 附加（继承）变换
    pub inherent_parent_index: i32,
    pub inherent_coefficient: f32,

    pub fixed_axis: Vec3,
    pub local_axis_x: Vec3,
    pub local_axis_z: Vec3,

    pub ik_config: Option<IkConfig>,

    // 本地变换分量
    pub local_user_translation: Vec3,
    pub local_user_orientation: Quat,
    pub local_morph_translation: Vec3,
    pub local_morph_orientation: Quat,
    pub local_inherent_translation: Vec3,
    pub local_inherent_orientation: Quat,
    pub local_translation: Vec3,
    pub local_orientation: Quat,
    pub constraint_joint_orientation: Quat,
    /// 用户变换被编辑过
    pub dirty: bool,

    // 变换结果
    pub local_transform: Mat4,
    pub world_transform: Mat4,
    pub skinning_transform: Mat4,
    pub normal_transform: Mat4,
}

impl Bone {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            english_name: String::new(),
            parent_index: -1,
            transform_level: 0,
            origin: Vec3::ZERO,
            is_rotatable: true,
            is_movable: false,
            is_visible: true,
            is_user_handleable: true,
            is_inherit_rotation: false,
            is_inherit_translation: false,
            is_inherit_local: false,
            is_fixed_axis: false,
            is_local_axis: false,
            deform_after_physics: false,
            inherent_parent_index: -1,
            inherent_coefficient: 1.0,
            fixed_axis: Vec3::ZERO,
            local_axis_x: Vec3::X,
            local_axis_z: Vec3::Z,
            ik_config: None,
            local_user_translation: Vec3::ZERO,
            local_user_orientation: Quat::IDENTITY,
            local_morph_translation: Vec3::ZERO,
            local_morph_orientation: Quat::IDENTITY,
            local_inherent_translation: Vec3::ZERO,
            local_inherent_orientation: Quat::IDENTITY,
            local_translation: Vec3::ZERO,
            local_orientation: Quat::IDENTITY,
            constraint_joint_orientation: Quat::IDENTITY,
            dirty: false,
            local_transform: Mat4::IDENTITY,
            world_transform: Mat4::IDENTITY,
            skinning_transform: Mat4::IDENTITY,
            normal_transform: Mat4::IDENTITY,
        }
    }

    /// 创建挂在父骨骼下的骨骼
    pub fn with_parent(name: impl Into<String>, parent_index: i32, origin: Vec3) -> Self {
        let mut bone = Self::new(name);
        bone.parent_index = parent_index;
        bone.origin = origin;
        bone.world_transform = Mat4::from_translation(origin);
        bone
    }

    pub fn has_inherent_parent(&self) -> bool {
        (self.is_inherit_rotation || self.is_inherit_translation) && self.inherent_parent_index >= 0
    }

    /// 膝盖骨骼按单轴关节处理
    pub fn has_unit_x_constraint(&self) -> bool {
        KNEE_BONE_NAMES.contains(&self.name.as_str())
    }

    pub fn world_transform_origin(&self) -> Vec3 {
        self.world_transform.w_axis.truncate()
    }

    pub fn set_local_user_translation(&mut self, translation: Vec3) {
        self.local_user_translation = translation;
        self.dirty = true;
    }

    pub fn set_local_user_orientation(&mut self, orientation: Quat) {
        self.local_user_orientation = orientation;
        self.dirty = true;
    }

    /// 合成本地旋转
    ///
    /// `inherent_source` 为附加亲骨骼提供的旋转（已由调用者按亲骨骼状态选出），
    /// `constraint_joint_active` 表示本骨骼是启用中的 IK 链关节。
    pub fn update_local_orientation(
        &mut self,
        inherent_source: Option<Quat>,
        constraint_joint_active: bool,
    ) {
        let inherent = if self.is_inherit_rotation { inherent_source } else { None };
        match inherent {
            Some(source) => {
                let orientation = if self.inherent_coefficient != 1.0 {
                    Quat::IDENTITY.slerp(source, self.inherent_coefficient)
                } else {
                    source
                };
                self.local_inherent_orientation = orientation;
                self.local_orientation = if constraint_joint_active {
                    (self.constraint_joint_orientation * self.local_morph_orientation * orientation)
                        .normalize()
                } else {
                    (self.local_morph_orientation * self.local_user_orientation * orientation)
                        .normalize()
                };
            }
            None => {
                self.local_orientation = if constraint_joint_active {
                    (self.constraint_joint_orientation * self.local_morph_orientation).normalize()
                } else {
                    (self.local_morph_orientation * self.local_user_orientation).normalize()
                };
            }
        }
    }

    /// 合成本地平移
    pub fn update_local_translation(&mut self, inherent_source: Option<Vec3>) {
        let mut translation = self.local_user_translation;
        if self.is_inherit_translation {
            if let Some(source) = inherent_source {
                let mut inherent = translation + source;
                if self.inherent_coefficient != 1.0 {
                    inherent *= self.inherent_coefficient;
                }
                self.local_inherent_translation = inherent;
                translation = inherent;
            }
        }
        self.local_translation = translation + self.local_morph_translation;
    }

    /// 用当前本地分量更新矩阵
    pub fn update_local_transform(&mut self, parent: Option<(Vec3, Mat4)>) {
        let translation = self.local_translation;
        let orientation = self.local_orientation;
        self.update_local_transform_with(parent, translation, orientation);
    }

    /// 用给定的平移与旋转更新矩阵
    ///
    /// `parent` 为父骨骼的 (原点, 世界变换)。
    pub fn update_local_transform_with(
        &mut self,
        parent: Option<(Vec3, Mat4)>,
        translation: Vec3,
        orientation: Quat,
    ) {
        let local = if translation == Vec3::ZERO && orientation == Quat::IDENTITY {
            Mat4::IDENTITY
        } else {
            Mat4::from_rotation_translation(orientation, translation)
        };
        self.world_transform = match parent {
            Some((parent_origin, parent_world)) => {
                parent_world * Mat4::from_translation(self.origin - parent_origin) * local
            }
            None => Mat4::from_translation(self.origin) * local,
        };
        self.local_transform = local;
        self.update_derived_transforms();
    }

    /// Morph 驱动的本地偏移（从零插值到目标）
    pub fn update_local_morph_transform(&mut self, translation: Vec3, orientation: Quat, weight: f32) {
        self.local_morph_translation = Vec3::ZERO.lerp(translation, weight);
        self.local_morph_orientation = Quat::IDENTITY.slerp(orientation, weight);
    }

    /// 由物理结果直接写入蒙皮矩阵
    pub fn update_skinning_transform(&mut self, skinning_transform: Mat4) {
        self.skinning_transform = skinning_transform;
        self.world_transform = skinning_transform * Mat4::from_translation(self.origin);
        self.normal_transform = shrink_3x3(&self.world_transform);
    }

    /// 外部亲骨骼：整个模型空间变换放到另一模型骨骼的坐标系下
    pub fn apply_outside_parent_transform(&mut self, parent_world_transform: Mat4) {
        self.world_transform = parent_world_transform * self.world_transform;
        self.update_derived_transforms();
    }

    fn update_derived_transforms(&mut self) {
        self.skinning_transform = self.world_transform * Mat4::from_translation(-self.origin);
        self.normal_transform = shrink_3x3(&self.world_transform);
    }

    /// 重置本地合成结果与附加分量
    pub fn reset_local_transform(&mut self) {
        self.local_orientation = Quat::IDENTITY;
        self.local_inherent_orientation = Quat::IDENTITY;
        self.local_translation = Vec3::ZERO;
        self.local_inherent_translation = Vec3::ZERO;
    }

    pub fn reset_morph_transform(&mut self) {
        self.local_morph_translation = Vec3::ZERO;
        self.local_morph_orientation = Quat::IDENTITY;
    }

    pub fn reset_user_transform(&mut self) {
        self.local_user_translation = Vec3::ZERO;
        self.local_user_orientation = Quat::IDENTITY;
        self.dirty = false;
    }

    /// 按角度上下限约束旋转
    ///
    /// 根据限制范围选择 X、Y 或 Z 主导的欧拉分解顺序，分量夹紧后重新合成。
    pub fn constrain_orientation(orientation: Quat, upper: Vec3, lower: Vec3) -> Quat {
        let m = Mat3::from_quat(orientation);
        let (x_axis, y_axis, z_axis) = (m.x_axis, m.y_axis, m.z_axis);
        if lower.x > -FRAC_PI_2 && upper.x < FRAC_PI_2 {
            let rx = y_axis.z.clamp(-1.0, 1.0).asin().clamp(lower.x, upper.x);
            let ry = (-x_axis.z).atan2(z_axis.z).clamp(lower.y, upper.y);
            let rz = (-y_axis.x).atan2(y_axis.y).clamp(lower.z, upper.z);
            Quat::from_axis_angle(Vec3::Z, rz)
                * Quat::from_axis_angle(Vec3::X, rx)
                * Quat::from_axis_angle(Vec3::Y, ry)
        } else if lower.y > -FRAC_PI_2 && upper.y < FRAC_PI_2 {
            let rx = (-z_axis.y).atan2(z_axis.z).clamp(lower.x, upper.x);
            let ry = z_axis.x.clamp(-1.0, 1.0).asin().clamp(lower.y, upper.y);
            let rz = (-y_axis.x).atan2(x_axis.x).clamp(lower.z, upper.z);
            Quat::from_axis_angle(Vec3::X, rx)
                * Quat::from_axis_angle(Vec3::Y, ry)
                * Quat::from_axis_angle(Vec3::Z, rz)
        } else {
            let rx = (-z_axis.y).atan2(y_axis.y).clamp(lower.x, upper.x);
            let ry = (-x_axis.z).atan2(x_axis.x).clamp(lower.y, upper.y);
            let rz = x_axis.y.clamp(-1.0, 1.0).asin().clamp(lower.z, upper.z);
            Quat::from_axis_angle(Vec3::Y, ry)
                * Quat::from_axis_angle(Vec3::Z, rz)
                * Quat::from_axis_angle(Vec3::X, rx)
        }
    }
}

impl Default for Bone {
    fn default() -> Self {
        Self::new(String::new())
    }
}

/// 去掉平移，只保留 3x3 部分
pub(crate) fn shrink_3x3(m: &Mat4) -> Mat4 {
    let mut result = *m;
    result.w_axis = glam::Vec4::W;
    result
}
