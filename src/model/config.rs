//! 模型运行时配置

use once_cell::sync::Lazy;
use std::sync::RwLock;

/// 模型配置（扁平化，不嵌套）
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// 是否用 rayon 并行蒙皮
    pub parallel_skinning: bool,
    /// 单个材质可同时使用的骨骼矩阵数
    pub max_bone_uniforms: usize,
    /// 输出 GPU 蒙皮用的材质内骨骼索引，而不是 CPU 蒙皮结果
    pub gpu_skinning: bool,
    /// 新模型的边缘大小系数
    pub edge_size_scale_factor: f32,
    /// 新模型默认以权重色显示
    pub weight_visualization: bool,
    /// 是否输出逐帧调试日志
    pub debug_log: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            parallel_skinning: true,
            max_bone_uniforms: 55,
            gpu_skinning: false,
            edge_size_scale_factor: 1.0,
            weight_visualization: false,
            debug_log: false,
        }
    }
}

static MODEL_CONFIG: Lazy<RwLock<ModelConfig>> = Lazy::new(|| RwLock::new(ModelConfig::default()));

/// 获取当前配置（只读）
pub fn get_config() -> ModelConfig {
    match MODEL_CONFIG.read() {
        Ok(config) => config.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

pub fn set_config(config: ModelConfig) {
    match MODEL_CONFIG.write() {
        Ok(mut current) => *current = config,
        Err(poisoned) => *poisoned.into_inner() = config,
    }
}

/// 重置为默认配置
pub fn reset_config() {
    set_config(ModelConfig::default());
}
