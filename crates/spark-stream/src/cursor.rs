use std::{cell::Cell, fmt, io, marker::PhantomData, sync::Arc};

use crate::{
    Offset, Result,
    ops::{Binding, ContentOps},
};

/// 单次读取的结果。
///
/// 流结束是正常的控制流分支，而非错误；调用方据此停止读取或执行 `reset`。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadStatus {
    /// 实际拷贝到本地缓冲的字节数，恒大于 0。
    Read(usize),
    /// 当前位置已到达可见末尾，本地缓冲未被修改。
    EndOfStream,
}

impl ReadStatus {
    /// 本次读取的字节数，流结束时为 0。
    pub fn len(&self) -> usize {
        match self {
            Self::Read(count) => *count,
            Self::EndOfStream => 0,
        }
    }

    /// 是否为 [`ReadStatus::EndOfStream`]。
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }
}

/// `Cursor` 是绑定在共享内容块上的单持有者读取视图。
///
/// # 设计背景（Why）
/// - 数据与释放责任由内容块集中承担，游标只记录“读到哪里、哪些已释放、还能看到多少”，
///   因此克隆、拆分、拼接都不复制数据；
/// - 游标内部没有锁，同一游标禁止被两个线程同时操作：类型为 `Send + !Sync`，跨线程
///   传递时先克隆再移交。
///
/// # 逻辑解析（How）
/// - 所有操作先解析内容块的虚表（后端或组合块），再委派给 [`ContentOps`]；
/// - 逻辑位置与内部位置之间通过有符号平移量换算，克隆时可以任意指定新游标的逻辑起点。
///
/// # 契约说明（What）
/// - 显式 [`Cursor::dispose`] 与 `Drop` 等价，二者只会发生其一；
/// - 所有返回错误的操作都不修改游标状态，读取的“部分成功”除外（见 [`Cursor::read`]）。
pub struct Cursor {
    binding: Binding,
    disposed: bool,
    _not_sync: PhantomData<Cell<()>>,
}

const _: fn() = || {
    fn assert_send<T: Send>() {}
    assert_send::<Cursor>();
};

impl Cursor {
    pub(crate) fn from_binding(binding: Binding) -> Self {
        Self {
            binding,
            disposed: false,
            _not_sync: PhantomData,
        }
    }

    pub(crate) fn binding(&self) -> &Binding {
        &self.binding
    }

    pub(crate) fn binding_mut(&mut self) -> &mut Binding {
        &mut self.binding
    }

    fn ops(&self) -> &'static dyn ContentOps {
        self.binding.content.ops()
    }

    /// 当前逻辑位置。
    pub fn position(&self) -> Result<Offset> {
        self.ops().position(&self.binding)
    }

    /// 从当前位置到可见末尾的字节数。
    pub fn remaining_size(&self) -> Result<Offset> {
        self.ops().remaining_size(&self.binding)
    }

    /// 移动到逻辑位置 `position`。
    ///
    /// 目标必须位于 `[首个有效位置, 可见末尾]` 之内，否则返回 `NotFound`；
    /// 已释放区间永远不可再访问。
    pub fn set_position(&mut self, position: Offset) -> Result<()> {
        let ops = self.ops();
        ops.set_position(&mut self.binding, position)?;
        tracing::trace!(position, "set_position");
        Ok(())
    }

    /// 回到首个有效位置；全部字节均已释放时返回 `NotFound`。
    pub fn reset(&mut self) -> Result<()> {
        let ops = self.ops();
        ops.reset(&mut self.binding)
    }

    /// 从当前位置拷贝至多 `dst.len()` 字节并前移当前位置。
    ///
    /// # 契约说明
    /// - `dst` 为空时返回 `IllegalArgument`；
    /// - 已到末尾时返回 [`ReadStatus::EndOfStream`]，`dst` 保持不变；
    /// - 组合流读取中若子流失败但已取得部分字节，返回这部分字节作为成功，失败推迟到下一次调用。
    pub fn read(&mut self, dst: &mut [u8]) -> Result<ReadStatus> {
        let ops = self.ops();
        ops.read(&mut self.binding, dst)
    }

    /// 声明 `position`（含）之前的字节不再需要，首个有效位置推进到 `position + 1`。
    ///
    /// `position` 不早于当前位置时返回 `IllegalArgument`；已释放过时返回 `NotFound`。
    pub fn release(&mut self, position: Offset) -> Result<()> {
        let ops = self.ops();
        ops.release(&mut self.binding, position)
    }

    /// 在同一内容块上创建独立游标，新游标从本游标当前位置开始，其逻辑位置为 `offset`。
    ///
    /// 新游标的首个有效位置即其起点。`offset` 加剩余长度超过配置上限时返回
    /// `IllegalArgument`，引用计数不变。
    pub fn clone_at(&self, offset: Offset) -> Result<Cursor> {
        let binding = self.ops().clone_binding(&self.binding, offset)?;
        Ok(Cursor::from_binding(binding))
    }

    /// 保持逻辑位置不变的克隆。
    pub fn try_clone(&self) -> Result<Cursor> {
        self.clone_at(self.position()?)
    }

    /// 显式销毁游标，释放对内容块的引用。
    pub fn dispose(mut self) -> Result<()> {
        self.disposed = true;
        let ops = self.ops();
        ops.dispose(&mut self.binding)
    }

    /// 内容块当前的引用数（诊断用途）。组合块持有的子流同样计入。
    pub fn content_refs(&self) -> usize {
        Arc::strong_count(&self.binding.content)
    }

    /// 游标当前是否绑定在拼接生成的组合块上。
    pub fn is_composed(&self) -> bool {
        self.binding.content.as_composition().is_some()
    }

    /// 读取到流末尾，返回追加的字节数。出错时已追加的字节保留在 `out` 中。
    pub fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let mut chunk = [0u8; 4096];
        let mut total = 0;
        loop {
            match self.read(&mut chunk)? {
                ReadStatus::Read(count) => {
                    out.extend_from_slice(&chunk[..count]);
                    total += count;
                }
                ReadStatus::EndOfStream => return Ok(total),
            }
        }
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }
        let ops = self.ops();
        if let Err(err) = ops.dispose(&mut self.binding) {
            tracing::warn!(error = %err, "implicit cursor dispose failed");
        }
    }
}

impl io::Read for Cursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match Cursor::read(self, buf)? {
            ReadStatus::Read(count) => Ok(count),
            ReadStatus::EndOfStream => Ok(0),
        }
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("content", &self.binding.content.name())
            .field("position", &self.binding.position())
            .field("remaining", &self.binding.remaining())
            .field("refs", &self.content_refs())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read as _;

    use super::*;
    use crate::ErrorKind;

    const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

    #[test]
    fn end_of_stream_leaves_buffer_untouched() {
        let mut cursor = Cursor::from_static(b"xy").unwrap();
        let mut local = [7u8; 4];
        assert_eq!(cursor.read(&mut local).unwrap(), ReadStatus::Read(2));
        local = [7u8; 4];
        let status = cursor.read(&mut local).unwrap();
        assert!(status.is_end_of_stream());
        assert_eq!(status.len(), 0);
        assert_eq!(local, [7u8; 4]);
    }

    #[test]
    fn empty_destination_is_rejected() {
        let mut cursor = Cursor::from_static(ALPHABET).unwrap();
        let err = cursor.read(&mut []).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalArgument);
        assert_eq!(cursor.position().unwrap(), 0);
    }

    #[test]
    fn clone_with_offset_translates_positions() {
        let mut cursor = Cursor::from_static(ALPHABET).unwrap();
        cursor.set_position(10).unwrap();
        let mut clone = cursor.clone_at(100).unwrap();
        assert_eq!(clone.position().unwrap(), 100);
        assert_eq!(clone.remaining_size().unwrap(), 52);
        assert_eq!(cursor.content_refs(), 2);

        let err = clone.set_position(99).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound, "clone cannot see bytes before its start");
        clone.set_position(126).unwrap();
        let mut local = [0u8; 4];
        assert_eq!(clone.read(&mut local).unwrap(), ReadStatus::Read(4));
        assert_eq!(&local, b"abcd");
        clone.dispose().unwrap();
        assert_eq!(cursor.content_refs(), 1);
    }

    #[test]
    fn clone_overflow_leaves_refs_unchanged() {
        let cursor = Cursor::from_static(ALPHABET).unwrap();
        let err = cursor.clone_at(Offset::MAX - 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalArgument);
        assert_eq!(cursor.content_refs(), 1);
    }

    #[test]
    fn io_read_adapter_reports_eof_as_zero() {
        let mut cursor = Cursor::from_static(ALPHABET).unwrap();
        let mut out = String::new();
        cursor.read_to_string(&mut out).unwrap();
        assert_eq!(out.as_bytes(), ALPHABET);
        assert_eq!(io::Read::read(&mut cursor, &mut [0u8; 8]).unwrap(), 0);
    }

    #[test]
    fn read_to_end_appends_remaining_bytes() {
        let mut cursor = Cursor::from_static(ALPHABET).unwrap();
        cursor.set_position(60).unwrap();
        let mut out = b"..".to_vec();
        assert_eq!(cursor.read_to_end(&mut out).unwrap(), 2);
        assert_eq!(out, b"..yz");
    }
}
