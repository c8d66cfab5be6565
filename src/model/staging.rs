//! 顶点缓冲区上传
//!
//! 两个缓冲区交替写入：CPU 写暂存缓冲区时，渲染端只读另一个。

use crate::skinning::VertexUnit;
use crate::{MmdError, Result};

/// 缓冲区句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

/// 渲染端提供的顶点缓冲区
pub trait VertexBufferSink {
    /// 创建可容纳 `len` 个顶点的流式缓冲区
    fn create_buffer(&mut self, len: usize) -> Result<BufferHandle>;

    /// 直写映射；不支持时返回 `None`，改用 `update_buffer`
    fn map_buffer(&mut self, handle: BufferHandle) -> Option<&mut [VertexUnit]>;

    fn unmap_buffer(&mut self, handle: BufferHandle);

    fn update_buffer(&mut self, handle: BufferHandle, data: &[VertexUnit]) -> Result<()>;

    /// 释放不再使用的缓冲区
    fn release_buffer(&mut self, handle: BufferHandle);
}

/// 双缓冲状态
#[derive(Debug, Default)]
pub(crate) struct StagingBuffers {
    handles: [Option<BufferHandle>; 2],
    len: usize,
    stage_index: usize,
    /// 不能映射时的中转区
    pub scratch: Vec<VertexUnit>,
}

impl StagingBuffers {
    /// 当前暂存缓冲区的句柄，按需创建
    ///
    /// 顶点数变化时先释放旧的两个缓冲区。
    pub fn stage_handle(&mut self, sink: &mut dyn VertexBufferSink, len: usize) -> Result<BufferHandle> {
        if self.len != len {
            for handle in self.handles.iter_mut().filter_map(Option::take) {
                sink.release_buffer(handle);
            }
            self.len = len;
        }
        let slot = &mut self.handles[self.stage_index];
        match *slot {
            Some(handle) => Ok(handle),
            None => {
                let handle = sink.create_buffer(len)?;
                *slot = Some(handle);
                Ok(handle)
            }
        }
    }

    pub fn stage_index(&self) -> usize {
        self.stage_index
    }

    /// 写入完成后翻转，返回刚写好的缓冲区
    pub fn flip(&mut self) -> usize {
        let ready = self.stage_index;
        self.stage_index = 1 - self.stage_index;
        ready
    }

    /// 可供渲染端读取的缓冲区句柄
    pub fn ready_handle(&self) -> Option<BufferHandle> {
        self.handles[1 - self.stage_index]
    }
}

/// 内存实现，用于无 GPU 的环境
#[derive(Debug, Default)]
pub struct MemoryVertexBuffer {
    /// 已释放的槽位为 `None`
    buffers: Vec<Option<Vec<VertexUnit>>>,
    /// 为真时支持直写映射
    pub mappable: bool,
    /// update_buffer 调用次数
    pub uploads: usize,
}

impl MemoryVertexBuffer {
    pub fn new(mappable: bool) -> Self {
        Self {
            mappable,
            ..Default::default()
        }
    }

    pub fn buffer(&self, handle: BufferHandle) -> Option<&[VertexUnit]> {
        self.buffers.get(handle.0 as usize)?.as_deref()
    }

    /// 未释放的缓冲区数
    pub fn buffer_count(&self) -> usize {
        self.buffers.iter().filter(|buffer| buffer.is_some()).count()
    }
}

impl VertexBufferSink for MemoryVertexBuffer {
    fn create_buffer(&mut self, len: usize) -> Result<BufferHandle> {
        let handle = BufferHandle(self.buffers.len() as u32);
        self.buffers.push(Some(vec![VertexUnit::default(); len]));
        Ok(handle)
    }

    fn map_buffer(&mut self, handle: BufferHandle) -> Option<&mut [VertexUnit]> {
        if !self.mappable {
            return None;
        }
        self.buffers.get_mut(handle.0 as usize)?.as_deref_mut()
    }

    fn unmap_buffer(&mut self, _handle: BufferHandle) {}

    fn update_buffer(&mut self, handle: BufferHandle, data: &[VertexUnit]) -> Result<()> {
        let buffer = self
            .buffers
            .get_mut(handle.0 as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| MmdError::VertexBuffer(format!("未知缓冲区: {:?}", handle)))?;
        if buffer.len() != data.len() {
            return Err(MmdError::VertexBuffer(format!(
                "大小不一致: {} != {}",
                buffer.len(),
                data.len()
            )));
        }
        buffer.copy_from_slice(data);
        self.uploads += 1;
        Ok(())
    }

    fn release_buffer(&mut self, handle: BufferHandle) {
        if let Some(slot) = self.buffers.get_mut(handle.0 as usize) {
            *slot = None;
        }
    }
}
