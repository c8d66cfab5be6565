//! 动画轨道
//!
//! 存储单个骨骼或 Morph 的所有关键帧，并提供精确查找与前后帧查找

use std::collections::BTreeMap;
use std::ops::Bound;

use super::keyframe::Keyframe;

/// 动画轨道（帧号 -> 关键帧）
#[derive(Debug, Clone)]
pub struct MotionTrack<K> {
    keyframes: BTreeMap<u32, K>,
}

impl<K: Keyframe> MotionTrack<K> {
    pub fn new() -> Self {
        Self {
            keyframes: BTreeMap::new(),
        }
    }

    /// 插入关键帧，同帧号的旧关键帧被替换并返回
    pub fn insert_keyframe(&mut self, keyframe: K) -> Option<K> {
        self.keyframes.insert(keyframe.frame_index(), keyframe)
    }

    /// 移除关键帧
    pub fn remove_keyframe(&mut self, frame_index: u32) -> Option<K> {
        self.keyframes.remove(&frame_index)
    }

    /// 查找精确帧
    pub fn find(&self, frame_index: u32) -> Option<&K> {
        self.keyframes.get(&frame_index)
    }

    /// 查找严格夹住 frame_index 的前后关键帧
    pub fn search_closest(&self, frame_index: u32) -> (Option<&K>, Option<&K>) {
        let prev = self
            .keyframes
            .range(..frame_index)
            .next_back()
            .map(|(_, kf)| kf);
        let next = self
            .keyframes
            .range((Bound::Excluded(frame_index), Bound::Unbounded))
            .next()
            .map(|(_, kf)| kf);
        (prev, next)
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    /// 最大帧号
    pub fn max_frame_index(&self) -> u32 {
        self.keyframes.keys().next_back().copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.keyframes.values()
    }
}

impl<K: Keyframe> Default for MotionTrack<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::MorphKeyframe;

    #[test]
    fn test_search_closest_is_strict() {
        let mut track = MotionTrack::new();
        track.insert_keyframe(MorphKeyframe::new(0, 0.0));
        track.insert_keyframe(MorphKeyframe::new(10, 1.0));
        track.insert_keyframe(MorphKeyframe::new(20, 0.5));

        let (prev, next) = track.search_closest(10);
        assert_eq!(prev.map(|k| k.frame_index), Some(0));
        assert_eq!(next.map(|k| k.frame_index), Some(20));

        let (prev, next) = track.search_closest(25);
        assert_eq!(prev.map(|k| k.frame_index), Some(20));
        assert!(next.is_none());

        assert_eq!(track.max_frame_index(), 20);
        assert!(track.find(10).is_some());
        assert!(track.find(11).is_none());
    }
}
