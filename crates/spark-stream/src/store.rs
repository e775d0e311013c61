use bytes::Bytes;

use crate::{Offset, Result, StreamError};

/// `BackingStore` 描述“字节实际存放在哪里”的最小能力集。
///
/// # 设计背景（Why）
/// - 内存、闪存、生成序列、网络报文等数据源差异巨大，但游标层只关心三件事：总长度、
///   按位置把字节拷进调用方缓冲、以及“某位置之前已不再需要”的提示；
/// - 后端永远不暴露内部内存，读取一律拷贝到调用方持有的本地缓冲，后端可在拷贝过程中转码。
///
/// # 逻辑解析（How）
/// - 八项游标操作（定位、复位、读取、剩余长度、当前位置、释放、克隆、销毁）由
///   [`ContentOps`](crate::ops::ContentOps) 虚表统一实现，后端只需满足本 trait；
/// - `read_at` 是无状态的定位读取，同一内容块可被多个游标并发读取，因此实现必须是 `Sync` 的。
///
/// # 契约说明（What）
/// - `len()`：内容总字节数，`init` 要求大于 0，且在内容块生命周期内保持不变；
/// - `read_at(position, dst)`：`position < len()`，`dst` 非空；返回实际拷贝的字节数（可少于
///   `dst.len()`，但必须大于 0），失败时返回 [`StreamError`]，不得 panic；
/// - `release(position)`：`position` 及之前的字节已被某个游标释放。仅为提示：同一内容块上的
///   其他游标仍可能读取这些字节，后端不得因此使数据失效。
pub trait BackingStore: Send + Sync + 'static {
    /// 内容总字节数。
    fn len(&self) -> Offset;

    /// 把从 `position` 开始的字节拷贝到 `dst`。
    fn read_at(&self, position: Offset, dst: &mut [u8]) -> Result<usize>;

    /// 释放提示，默认忽略。
    fn release(&self, position: Offset) -> Result<()> {
        let _ = position;
        Ok(())
    }

    /// 诊断用名称，出现在日志字段中。
    fn name(&self) -> &'static str {
        core::any::type_name::<Self>()
    }

    /// 后端是否不含任何字节；空后端不能暴露为内容块。
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 基于 `bytes::Bytes` 的平坦内存后端。
///
/// `Bytes` 自带引用计数，`from_static` 与 `From<Vec<u8>>` 均不复制数据；释放提示被忽略，
/// 常量数据永远不会被回收。
#[derive(Clone, Debug)]
pub struct BytesStore {
    data: Bytes,
}

impl BytesStore {
    /// 包装任意可转换为 [`Bytes`] 的数据，不复制。
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// 包装静态字节切片，常用于常量数据。
    pub fn from_static(data: &'static [u8]) -> Self {
        Self {
            data: Bytes::from_static(data),
        }
    }
}

impl BackingStore for BytesStore {
    fn len(&self) -> Offset {
        self.data.len()
    }

    fn read_at(&self, position: Offset, dst: &mut [u8]) -> Result<usize> {
        let available = self.data.get(position..).ok_or_else(|| {
            StreamError::not_found(format!(
                "BytesStore::read_at position {position} beyond length {}",
                self.data.len()
            ))
        })?;
        let count = available.len().min(dst.len());
        dst[..count].copy_from_slice(&available[..count]);
        Ok(count)
    }

    fn name(&self) -> &'static str {
        "bytes"
    }
}
