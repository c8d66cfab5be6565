//! 物理配置
//!
//! 所有参数扁平化，运行时通过 `set_config` 调整。

use once_cell::sync::Lazy;
use std::sync::RwLock;

use super::engine::RigidBodyFollowBone;

/// 物理配置（扁平化，不嵌套）
#[derive(Debug, Clone)]
pub struct PhysicsConfig {
    // ========== 重力 ==========
    /// 重力 Y 分量（负数向下）
    pub gravity_y: f32,

    // ========== 模拟参数 ==========
    /// 物理 FPS
    pub physics_fps: f32,
    /// 每帧最大子步数
    pub max_substep_count: i32,
    /// 求解器迭代次数
    pub solver_iterations: usize,
    /// 内部 PGS 迭代次数
    pub pgs_iterations: usize,
    /// 最大修正速度
    pub max_corrective_velocity: f32,
    /// 是否创建地面
    pub ground_enabled: bool,

    // ========== 刚体 ==========
    /// 线性阻尼缩放（乘以模型原值）
    pub linear_damping_scale: f32,
    /// 角速度阻尼缩放（乘以模型原值）
    pub angular_damping_scale: f32,
    /// 质量缩放（乘以模型原值）
    pub mass_scale: f32,

    // ========== 关节弹簧 ==========
    pub linear_spring_stiffness_scale: f32,
    pub angular_spring_stiffness_scale: f32,
    /// 阻尼 = sqrt(刚度 * 此值)
    pub linear_spring_damping_factor: f32,
    pub angular_spring_damping_factor: f32,

    // ========== 速度限制 ==========
    /// 最大线速度，防止穿模后弹飞
    pub max_linear_velocity: f32,
    /// 最大角速度
    pub max_angular_velocity: f32,

    // ========== 骨骼跟随 ==========
    pub follow_bone: RigidBodyFollowBone,

    // ========== 调试 ==========
    /// 是否启用关节
    pub joints_enabled: bool,
    /// 是否输出调试日志
    pub debug_log: bool,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            // MMD 标准重力
            gravity_y: -98.0,

            physics_fps: 60.0,
            // 低帧率时最后一步吃掉剩余时间
            max_substep_count: 4,
            solver_iterations: 4,
            pgs_iterations: 2,
            max_corrective_velocity: 0.1,
            ground_enabled: true,

            linear_damping_scale: 1.0,
            angular_damping_scale: 1.0,
            mass_scale: 1.0,

            linear_spring_stiffness_scale: 1.0,
            angular_spring_stiffness_scale: 1.0,
            linear_spring_damping_factor: 0.1,
            angular_spring_damping_factor: 0.1,

            max_linear_velocity: 50.0,
            max_angular_velocity: 20.0,

            follow_bone: RigidBodyFollowBone::SkipIfMorphBound,

            joints_enabled: true,
            debug_log: false,
        }
    }
}

/// 全局配置实例
static PHYSICS_CONFIG: Lazy<RwLock<PhysicsConfig>> =
    Lazy::new(|| RwLock::new(PhysicsConfig::default()));

/// 获取当前配置（只读）
pub fn get_config() -> PhysicsConfig {
    match PHYSICS_CONFIG.read() {
        Ok(config) => config.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// 手动设置配置（用于运行时调试）
pub fn set_config(config: PhysicsConfig) {
    match PHYSICS_CONFIG.write() {
        Ok(mut current) => *current = config,
        Err(poisoned) => *poisoned.into_inner() = config,
    }
}

/// 重置为默认配置
pub fn reset_config() {
    set_config(PhysicsConfig::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PhysicsConfig::default();
        assert!(config.gravity_y < 0.0);
        assert!(config.physics_fps > 0.0);
        assert_eq!(config.follow_bone, RigidBodyFollowBone::SkipIfMorphBound);
    }
}
