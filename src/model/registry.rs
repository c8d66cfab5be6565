//! 多模型注册表
//!
//! 按注册顺序更新；外部亲骨骼读取其他模型的只读视图，
//! 排在前面的模型在本帧已经更新过。

use std::sync::Arc;

use super::runtime::OtherModels;
use super::{MmdModel, ModelId};
use crate::animation::MotionSource;
use crate::skeleton::DeformTiming;

struct Entry {
    motion: Option<Arc<dyn MotionSource>>,
}

/// 模型注册表
#[derive(Default)]
pub struct ModelRegistry {
    models: Vec<MmdModel>,
    entries: Vec<Entry>,
    next_id: u32,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册模型，分配新的标识
    pub fn add_model(&mut self, mut model: MmdModel) -> ModelId {
        let id = ModelId(self.next_id);
        self.next_id += 1;
        model.set_id(id);
        self.models.push(model);
        self.entries.push(Entry { motion: None });
        id
    }

    pub fn remove_model(&mut self, id: ModelId) -> Option<MmdModel> {
        let position = self.position(id)?;
        self.entries.remove(position);
        Some(self.models.remove(position))
    }

    fn position(&self, id: ModelId) -> Option<usize> {
        self.models.iter().position(|model| model.id() == id)
    }

    pub fn get(&self, id: ModelId) -> Option<&MmdModel> {
        self.models.iter().find(|model| model.id() == id)
    }

    pub fn get_mut(&mut self, id: ModelId) -> Option<&mut MmdModel> {
        self.models.iter_mut().find(|model| model.id() == id)
    }

    pub fn ids(&self) -> Vec<ModelId> {
        self.models.iter().map(MmdModel::id).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut MmdModel> {
        self.models.iter_mut()
    }

    /// 设置模型的动画；找不到模型时返回 false
    pub fn set_motion(&mut self, id: ModelId, motion: Option<Arc<dyn MotionSource>>) -> bool {
        match self.position(id) {
            Some(position) => {
                self.entries[position].motion = motion;
                true
            }
            None => false,
        }
    }

    /// 按注册顺序更新全部模型
    ///
    /// 有动画的模型走完整的物理前/步进/物理后流程，没有动画的模型按当前用户变换评估。
    pub fn update(&mut self, frame_index: u32, amount: f32, delta: f32) {
        for position in 0..self.models.len() {
            let (before, rest) = self.models.split_at_mut(position);
            let Some((model, after)) = rest.split_first_mut() else {
                continue;
            };
            let others = OtherModels::split(before, after);
            match &self.entries[position].motion {
                Some(motion) => {
                    let motion = motion.as_ref();
                    model.synchronize_motion(motion, frame_index, amount, DeformTiming::BeforePhysics, &others);
                    model.step_physics(delta);
                    model.synchronize_motion(motion, frame_index, amount, DeformTiming::AfterPhysics, &others);
                }
                None => model.perform_all_bones_transform(&others),
            }
        }
    }
}
