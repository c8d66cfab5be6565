//! Morph 定义

use super::{MorphCategory, MorphKind, MorphType};

const WEIGHT_EPSILON: f32 = 1.0e-7;

/// Morph 变形
///
/// 运行时可变状态只有权重与脏标志。
#[derive(Clone, Debug)]
pub struct Morph {
    pub name: String,
    pub english_name: String,
    pub category: MorphCategory,
    pub kind: MorphKind,
    weight: f32,
    dirty: bool,
}

impl Morph {
    pub fn new(name: impl Into<String>, category: MorphCategory, kind: MorphKind) -> Self {
        Self {
            name: name.into(),
            english_name: String::new(),
            category,
            kind,
            weight: 0.0,
            dirty: false,
        }
    }

    pub fn morph_type(&self) -> MorphType {
        self.kind.morph_type()
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// 设置权重；新旧权重任一不为零时标记为脏
    ///
    /// 不做 [0, 1] 夹紧，夸张表现允许超出范围。
    pub fn set_weight(&mut self, weight: f32) {
        self.dirty = self.weight.abs() > WEIGHT_EPSILON || weight.abs() > WEIGHT_EPSILON;
        self.weight = weight;
    }

    /// 由组 Morph 强制写入的权重，不标记为脏
    pub fn set_forced_weight(&mut self, weight: f32) {
        self.dirty = false;
        self.weight = weight;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// 重置权重
    pub fn reset(&mut self) {
        self.weight = 0.0;
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex_morph() -> Morph {
        Morph::new("あ", MorphCategory::Lip, MorphKind::Vertex(Vec::new()))
    }

    #[test]
    fn test_dirty_tracks_old_and_new_weight() {
        let mut morph = vertex_morph();
        morph.set_weight(0.0);
        assert!(!morph.is_dirty());
        morph.set_weight(0.5);
        assert!(morph.is_dirty());
        // 从非零回到零仍需要一次变形
        morph.set_weight(0.0);
        assert!(morph.is_dirty());
        morph.set_weight(0.0);
        assert!(!morph.is_dirty());
    }

    #[test]
    fn test_weight_is_not_clamped() {
        let mut morph = vertex_morph();
        morph.set_weight(1.5);
        assert_eq!(morph.weight(), 1.5);
        morph.set_forced_weight(-0.5);
        assert_eq!(morph.weight(), -0.5);
        assert!(!morph.is_dirty());
        assert_eq!(morph.morph_type(), MorphType::Vertex);
    }
}
