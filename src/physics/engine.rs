//! 物理引擎接口
//!
//! 模型只通过 `PhysicsEngine` 访问物理后端，句柄对模型不透明。

use glam::{Mat4, Vec3};

use crate::Result;

/// 刚体句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BodyId(pub u32);

/// 关节句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JointId(pub u32);

/// 软体句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SoftBodyId(pub u32);

/// 刚体形状
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RigidBodyShape {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
    /// 沿 Y 轴
    Capsule { radius: f32, height: f32 },
}

/// 刚体与骨骼之间的变换方向
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RigidBodyTransformType {
    /// 骨骼驱动刚体（运动学）
    #[default]
    FromBoneToSimulation,
    /// 物理驱动骨骼
    FromSimulationToBone,
    /// 物理驱动骨骼旋转，位置跟随骨骼
    FromBoneOrientationAndSimulationToBone,
}

/// 物理写回骨骼时，位置跟随骨骼刚体是否把刚体拉回骨骼
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RigidBodyFollowBone {
    Always,
    Never,
    /// 被冲量 Morph 驱动的刚体不拉回
    #[default]
    SkipIfMorphBound,
}

/// 刚体描述
#[derive(Clone, Debug, PartialEq)]
pub struct RigidBodyDescriptor {
    pub name: String,
    pub bone_index: i32,
    pub shape: RigidBodyShape,
    /// 模型空间位置
    pub origin: Vec3,
    /// 欧拉角（弧度）
    pub orientation: Vec3,
    pub mass: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub restitution: f32,
    pub friction: f32,
    pub collision_group: u8,
    /// 可碰撞的组掩码
    pub collision_mask: u16,
    pub transform_type: RigidBodyTransformType,
}

impl RigidBodyDescriptor {
    pub fn new(name: impl Into<String>, bone_index: i32, shape: RigidBodyShape) -> Self {
        Self {
            name: name.into(),
            bone_index,
            shape,
            origin: Vec3::ZERO,
            orientation: Vec3::ZERO,
            mass: 1.0,
            linear_damping: 0.5,
            angular_damping: 0.5,
            restitution: 0.0,
            friction: 0.5,
            collision_group: 0,
            collision_mask: 0xffff,
            transform_type: RigidBodyTransformType::FromBoneToSimulation,
        }
    }

    /// 刚体在模型空间的绑定姿势（Y·X·Z 欧拉顺序）
    pub fn initial_transform(&self) -> Mat4 {
        let rotation = glam::Quat::from_rotation_y(self.orientation.y)
            * glam::Quat::from_rotation_x(self.orientation.x)
            * glam::Quat::from_rotation_z(self.orientation.z);
        Mat4::from_rotation_translation(rotation, self.origin)
    }
}

/// 6 自由度弹簧关节描述
#[derive(Clone, Debug, PartialEq)]
pub struct JointDescriptor {
    pub name: String,
    pub rigid_body_a: i32,
    pub rigid_body_b: i32,
    pub origin: Vec3,
    /// 欧拉角（弧度）
    pub orientation: Vec3,
    pub linear_lower: Vec3,
    pub linear_upper: Vec3,
    pub angular_lower: Vec3,
    pub angular_upper: Vec3,
    pub linear_stiffness: Vec3,
    pub angular_stiffness: Vec3,
}

impl JointDescriptor {
    pub fn new(name: impl Into<String>, rigid_body_a: i32, rigid_body_b: i32) -> Self {
        Self {
            name: name.into(),
            rigid_body_a,
            rigid_body_b,
            origin: Vec3::ZERO,
            orientation: Vec3::ZERO,
            linear_lower: Vec3::ZERO,
            linear_upper: Vec3::ZERO,
            angular_lower: Vec3::ZERO,
            angular_upper: Vec3::ZERO,
            linear_stiffness: Vec3::ZERO,
            angular_stiffness: Vec3::ZERO,
        }
    }

    /// 关节在模型空间的姿势（Z·Y·X 欧拉顺序）
    pub fn world_transform(&self) -> Mat4 {
        let rotation = glam::Quat::from_rotation_z(self.orientation.z)
            * glam::Quat::from_rotation_y(self.orientation.y)
            * glam::Quat::from_rotation_x(self.orientation.x);
        Mat4::from_rotation_translation(rotation, self.origin)
    }
}

/// 软体描述
#[derive(Clone, Debug, PartialEq)]
pub struct SoftBodyDescriptor {
    pub name: String,
    pub material_index: i32,
    /// 参与软体的模型顶点
    pub vertex_indices: Vec<u32>,
    pub total_mass: f32,
    pub collision_margin: f32,
}

/// 软体读回的一个顶点
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SoftBodyVertex {
    pub vertex_index: usize,
    pub position: Vec3,
    pub normal: Vec3,
}

/// 物理后端
///
/// 变换一律为模型空间矩阵。无效句柄上的调用静默忽略。
pub trait PhysicsEngine: Send {
    fn create_rigid_body(&mut self, descriptor: &RigidBodyDescriptor) -> Result<BodyId>;

    fn destroy_rigid_body(&mut self, body: BodyId);

    /// 加入世界（启用）
    fn add_rigid_body(&mut self, body: BodyId);

    /// 移出世界（禁用，句柄保留）
    fn remove_rigid_body(&mut self, body: BodyId);

    /// 不进入休眠
    fn disable_deactivation(&mut self, body: BodyId);

    fn create_joint(
        &mut self,
        descriptor: &JointDescriptor,
        body_a: BodyId,
        body_b: BodyId,
    ) -> Result<JointId>;

    fn destroy_joint(&mut self, joint: JointId);

    fn create_soft_body(&mut self, descriptor: &SoftBodyDescriptor) -> Result<SoftBodyId>;

    fn destroy_soft_body(&mut self, body: SoftBodyId);

    /// 软体顶点的当前位置与法线
    fn soft_body_vertices(&self, body: SoftBodyId) -> Vec<SoftBodyVertex>;

    fn step_simulation(&mut self, delta: f32);

    fn world_transform(&self, body: BodyId) -> Mat4;

    fn set_world_transform(&mut self, body: BodyId, transform: Mat4);

    /// 创建时的绑定姿势
    fn initial_transform(&self, body: BodyId) -> Mat4;

    fn apply_torque_impulse(&mut self, body: BodyId, torque: Vec3);

    fn apply_velocity_impulse(&mut self, body: BodyId, velocity: Vec3);

    fn set_kinematic(&mut self, body: BodyId, kinematic: bool);

    fn is_kinematic(&self, body: BodyId) -> bool;

    /// 清空速度与力
    fn reset_states(&mut self, body: BodyId);

    /// 唤醒
    fn set_active(&mut self, body: BodyId);
}
