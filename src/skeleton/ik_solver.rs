//! IK 约束求解（CCD）

use glam::{Mat4, Quat, Vec3};

use super::bone::{Bone, IkConfig};

const EPSILON: f32 = 1.0e-5;

/// 单次关节求解的中间结果
#[derive(Clone, Copy, Debug)]
pub struct ConstraintJointResult {
    pub axis: Vec3,
    pub angle: f32,
    pub effector_direction: Vec3,
    pub target_direction: Vec3,
    /// 求解后的世界变换
    pub transform: Mat4,
}

impl Default for ConstraintJointResult {
    fn default() -> Self {
        Self {
            axis: Vec3::ZERO,
            angle: 0.0,
            effector_direction: Vec3::ZERO,
            target_direction: Vec3::ZERO,
            transform: Mat4::IDENTITY,
        }
    }
}

impl ConstraintJointResult {
    /// 计算把效应器方向转向目标方向的轴角
    ///
    /// 输入退化（位置重合、方向平行或垂直）时返回 `false`，该关节本次跳过。
    pub fn solve_axis_angle(
        &mut self,
        joint_world: &Mat4,
        effector_position: Vec3,
        target_position: Vec3,
    ) -> bool {
        let inverse = joint_world.inverse();
        let in_effector = inverse.transform_point3(effector_position);
        let in_target = inverse.transform_point3(target_position);
        if in_effector.length_squared() < EPSILON * EPSILON
            || in_target.length_squared() < EPSILON * EPSILON
        {
            return false;
        }
        let effector_direction = in_effector.normalize();
        let target_direction = in_target.normalize();
        let axis = effector_direction.cross(target_direction);
        if axis.length_squared() < EPSILON * EPSILON {
            return false;
        }
        let z = effector_direction.dot(target_direction);
        if z.abs() <= EPSILON {
            return false;
        }
        self.effector_direction = effector_direction;
        self.target_direction = target_direction;
        self.axis = axis.normalize();
        self.angle = z.clamp(-1.0, 1.0).acos();
        true
    }
}

/// IK 约束
///
/// 目标是约束所属的 IK 骨骼，效应器是链末端骨骼。
#[derive(Clone, Debug)]
pub struct Constraint {
    pub target_bone_index: usize,
    pub config: IkConfig,
    pub enabled: bool,
    /// [关节][迭代] 的求解记录
    pub joint_iteration_results: Vec<Vec<ConstraintJointResult>>,
    /// [迭代] 的效应器记录
    pub effector_iteration_results: Vec<Mat4>,
}

impl Constraint {
    pub fn new(target_bone_index: usize, config: IkConfig) -> Self {
        let iterations = config.iterations as usize;
        let joint_iteration_results = config
            .links
            .iter()
            .map(|_| vec![ConstraintJointResult::default(); iterations])
            .collect();
        Self {
            target_bone_index,
            config,
            enabled: true,
            joint_iteration_results,
            effector_iteration_results: vec![Mat4::IDENTITY; iterations],
        }
    }

    pub fn effector_bone_index(&self) -> Option<usize> {
        let index = self.config.effector_bone;
        (index >= 0).then_some(index as usize)
    }

    /// 链中的关节骨骼索引（跳过越界链接）
    pub fn joint_bone_indices(&self, bone_count: usize) -> impl Iterator<Item = usize> + '_ {
        self.config
            .links
            .iter()
            .filter(move |link| link.bone_index >= 0 && (link.bone_index as usize) < bone_count)
            .map(|link| link.bone_index as usize)
    }

    /// 禁用时把链上关节的 IK 旋转清为单位
    pub fn reset_joints(&self, bones: &mut [Bone]) {
        let count = bones.len();
        for index in self.joint_bone_indices(count) {
            bones[index].constraint_joint_orientation = Quat::IDENTITY;
        }
    }

    /// 求解一次
    ///
    /// 目标位置在迭代开始前读取一次，效应器位置在每个关节处重新读取。
    pub fn solve(&mut self, bones: &mut [Bone]) {
        let count = bones.len();
        let effector_index = match self.effector_bone_index() {
            Some(index) if index < count => index,
            _ => return,
        };
        if self.target_bone_index >= count {
            return;
        }
        let target_position = bones[self.target_bone_index].world_transform_origin();
        let iterations = self.config.iterations as usize;
        let joints: Vec<(usize, usize)> = self
            .config
            .links
            .iter()
            .enumerate()
            .filter(|(_, link)| link.bone_index >= 0 && (link.bone_index as usize) < count)
            .map(|(i, link)| (i, link.bone_index as usize))
            .collect();

        for i in 0..iterations {
            let first_iteration = i == 0;
            for (j, &(link_slot, joint_index)) in joints.iter().enumerate() {
                let effector_position = bones[effector_index].world_transform_origin();
                let joint_world = bones[joint_index].world_transform;
                let mut result = self.joint_iteration_results[link_slot][i];
                if !result.solve_axis_angle(&joint_world, effector_position, target_position) {
                    continue;
                }
                let link = &self.config.links[link_slot];
                let joint_bone = &bones[joint_index];
                if joint_bone.is_fixed_axis && joint_bone.fixed_axis.length_squared() > EPSILON {
                    result.axis = joint_bone.fixed_axis.normalize();
                } else if first_iteration && joint_bone.has_unit_x_constraint() {
                    result.axis = Vec3::X;
                } else if first_iteration && link.has_limits {
                    if let Some(axis) = infer_hinge_axis(link.limit_min, link.limit_max) {
                        result.axis = axis;
                    }
                }
                let new_limit = self.config.limit_angle * (j + 1) as f32;
                let orientation = Quat::from_axis_angle(result.axis, result.angle.min(new_limit));
                let mixed = if first_iteration {
                    orientation * joint_bone.local_user_orientation
                } else {
                    joint_bone.constraint_joint_orientation * orientation
                };
                let constrained = if link.has_limits {
                    Bone::constrain_orientation(mixed, link.limit_max, link.limit_min)
                } else if joint_bone.has_unit_x_constraint() {
                    Bone::constrain_orientation(
                        mixed,
                        Vec3::new(180f32.to_radians(), 0.0, 0.0),
                        Vec3::new(0.5f32.to_radians(), 0.0, 0.0),
                    )
                } else {
                    mixed
                };
                bones[joint_index].constraint_joint_orientation = constrained.normalize();

                for &(_, chain_index) in joints[..=j].iter().rev() {
                    let parent = parent_frame(bones, chain_index);
                    let bone = &mut bones[chain_index];
                    let translation = bone.local_translation;
                    let orientation = bone.constraint_joint_orientation;
                    bone.update_local_transform_with(parent, translation, orientation);
                }
                result.transform = bones[joint_index].world_transform;
                self.joint_iteration_results[link_slot][i] = result;

                let parent = parent_frame(bones, effector_index);
                bones[effector_index].update_local_transform(parent);
                self.effector_iteration_results[i] = bones[effector_index].world_transform;
            }
        }
    }
}

/// 只有一个轴可动的角度限制视为铰链
fn infer_hinge_axis(lower: Vec3, upper: Vec3) -> Option<Vec3> {
    let null = |a: f32, b: f32| a.abs() < EPSILON && b.abs() < EPSILON;
    if null(lower.y, upper.y) && null(lower.z, upper.z) {
        Some(Vec3::X)
    } else if null(lower.x, upper.x) && null(lower.z, upper.z) {
        Some(Vec3::Y)
    } else if null(lower.x, upper.x) && null(lower.y, upper.y) {
        Some(Vec3::Z)
    } else {
        None
    }
}

/// 父骨骼的 (原点, 世界变换)
pub(crate) fn parent_frame(bones: &[Bone], index: usize) -> Option<(Vec3, Mat4)> {
    let parent = bones[index].parent_index;
    if parent >= 0 && (parent as usize) < bones.len() && parent as usize != index {
        let parent = &bones[parent as usize];
        Some((parent.origin, parent.world_transform))
    } else {
        None
    }
}
