//! 八项游标操作的虚表与通用位置算术。
//!
//! # 设计总览（Why）
//! - 定位、复位、剩余长度、当前位置、释放区间校验、克隆溢出判定等算术对所有内容块都相同，
//!   只实现一次，作为 [`ContentOps`] 的默认方法或本模块的辅助函数；
//! - 读取、释放提示、克隆与销毁对组合块需要额外维护子流引用计数，由各自虚表覆写。
//!
//! # 契约说明（What）
//! - 每个虚表方法先执行类型守卫 [`ContentOps::check`]：游标绑定的内容块变体与虚表不符时返回
//!   `IllegalArgument`，且不修改任何状态；
//! - 除读取的“部分成功”外，所有失败路径都不产生部分状态变更。

use std::sync::Arc;

use crate::{
    Offset, ReadStatus, Result, StreamError,
    content::Content,
};

/// 内部位置到逻辑位置的有符号平移量（`offset_diff`）。
///
/// 以 `i128` 保存，任意 `usize` 位置对之间的差值都可无损表示。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Translation(i128);

impl Translation {
    pub(crate) const IDENTITY: Self = Self(0);

    /// 使 `inner` 映射到 `logical` 的平移量。
    pub(crate) fn between(logical: Offset, inner: Offset) -> Self {
        Self(logical as i128 - inner as i128)
    }

    pub(crate) fn to_logical(self, inner: Offset) -> Offset {
        let logical = inner as i128 + self.0;
        debug_assert!(logical >= 0, "visible inner positions map to non-negative logical positions");
        Offset::try_from(logical).unwrap_or(Offset::MAX)
    }

    /// 逻辑位置换算为内部位置；结果为负或超出 `Offset` 范围时返回 `None`。
    pub(crate) fn to_inner(self, logical: Offset) -> Option<Offset> {
        Offset::try_from(logical as i128 - self.0).ok()
    }
}

/// 游标在内容块上的绑定状态，均以内容块坐标（内部位置）表示。
///
/// 不变式：`first_valid <= current <= length`。`Binding` 本身没有 `Drop` 语义，销毁统一经由
/// [`ContentOps::dispose`]，因此按位复制即可表达拼接时的“搬移”。
#[derive(Clone, Debug)]
pub(crate) struct Binding {
    pub(crate) content: Arc<Content>,
    pub(crate) translation: Translation,
    pub(crate) current: Offset,
    pub(crate) first_valid: Offset,
    pub(crate) length: Offset,
}

impl Binding {
    pub(crate) fn fresh(content: Arc<Content>, length: Offset) -> Self {
        Self {
            content,
            translation: Translation::IDENTITY,
            current: 0,
            first_valid: 0,
            length,
        }
    }

    pub(crate) fn position(&self) -> Offset {
        self.translation.to_logical(self.current)
    }

    pub(crate) fn remaining(&self) -> Offset {
        self.length - self.current
    }

    /// 仍可访问的内部区间 `[first_valid, length)`。
    pub(crate) fn window(&self) -> Window {
        Window {
            start: self.first_valid,
            end: self.length,
        }
    }
}

/// 半开区间 `[start, end)`。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Window {
    pub(crate) start: Offset,
    pub(crate) end: Offset,
}

impl Window {
    pub(crate) const EMPTY: Self = Self { start: 0, end: 0 };

    pub(crate) fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub(crate) fn overlaps(&self, other: &Window) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.end && other.start < self.end
    }
}

/// 内容块虚表，即后端契约的八项操作（外加拆分使用的 `shrink`）。
///
/// 游标的每次调用都经 `binding.content.ops()` 派发到这里；组合块的虚表在读取、释放提示与
/// 引用计数上逐层展开到两个子流。
pub(crate) trait ContentOps: Send + Sync {
    fn name(&self) -> &'static str;

    /// 类型守卫：绑定的内容块必须属于本虚表。
    fn check(&self, binding: &Binding, op: &'static str) -> Result<()>;

    fn set_position(&self, binding: &mut Binding, position: Offset) -> Result<()> {
        self.check(binding, "set_position")?;
        let inner = binding
            .translation
            .to_inner(position)
            .filter(|inner| (binding.first_valid..=binding.length).contains(inner))
            .ok_or_else(|| {
                StreamError::not_found(format!(
                    "position {position} is outside the valid range [{}, {}]",
                    binding.translation.to_logical(binding.first_valid),
                    binding.translation.to_logical(binding.length),
                ))
            })?;
        binding.current = inner;
        Ok(())
    }

    fn reset(&self, binding: &mut Binding) -> Result<()> {
        self.check(binding, "reset")?;
        if binding.first_valid == binding.length {
            return Err(StreamError::not_found(
                "reset: every visible byte has been released",
            ));
        }
        binding.current = binding.first_valid;
        Ok(())
    }

    fn read(&self, binding: &mut Binding, dst: &mut [u8]) -> Result<ReadStatus>;

    fn remaining_size(&self, binding: &Binding) -> Result<Offset> {
        self.check(binding, "remaining_size")?;
        Ok(binding.remaining())
    }

    fn position(&self, binding: &Binding) -> Result<Offset> {
        self.check(binding, "position")?;
        Ok(binding.position())
    }

    fn release(&self, binding: &mut Binding, position: Offset) -> Result<()>;

    fn clone_binding(&self, binding: &Binding, offset: Offset) -> Result<Binding>;

    fn dispose(&self, binding: &mut Binding) -> Result<()>;

    /// 把可见长度截断到内部位置 `length`，拆分成功后调用。
    fn shrink(&self, binding: &mut Binding, length: Offset) -> Result<()> {
        self.check(binding, "shrink")?;
        shrink_window(binding, length)
    }
}

fn mismatch(ops: &'static str, op: &'static str, content: &Content) -> StreamError {
    StreamError::illegal_argument(format!(
        "{ops}::{op} invoked on a cursor bound to `{}` content",
        content.name()
    ))
}

/// 读取前置校验：空缓冲非法，已到末尾返回 `None` 表示流结束；否则返回本次可请求的长度。
pub(crate) fn readable_len(binding: &Binding, dst: &[u8]) -> Result<Option<usize>> {
    if dst.is_empty() {
        return Err(StreamError::illegal_argument(
            "read requires a non-empty local buffer",
        ));
    }
    if binding.current >= binding.length {
        return Ok(None);
    }
    Ok(Some(dst.len().min(binding.remaining())))
}

/// 计算 `release(position)` 之后的新首个有效位置，不修改绑定。
pub(crate) fn release_target(binding: &Binding, position: Offset) -> Result<Offset> {
    let inner = binding
        .translation
        .to_inner(position)
        .filter(|inner| *inner < binding.current)
        .ok_or_else(|| {
            StreamError::illegal_argument(format!(
                "release position {position} is not before the current position {}",
                binding.position()
            ))
        })?;
    if inner < binding.first_valid {
        return Err(StreamError::not_found(format!(
            "position {position} has already been released"
        )));
    }
    Ok(inner + 1)
}

/// 通用克隆：新游标从源游标当前位置开始，逻辑位置为 `offset`，首个有效位置即起点。
pub(crate) fn clone_at(binding: &Binding, offset: Offset) -> Result<Binding> {
    let max_position = binding.content.config().max_position;
    offset
        .checked_add(binding.remaining())
        .filter(|end| *end <= max_position)
        .ok_or_else(|| {
            StreamError::illegal_argument(format!(
                "clone offset {offset} plus remaining size {} overflows max position {max_position}",
                binding.remaining()
            ))
        })?;
    Ok(Binding {
        content: Arc::clone(&binding.content),
        translation: Translation::between(offset, binding.current),
        current: binding.current,
        first_valid: binding.current,
        length: binding.length,
    })
}

/// 告知后端内部位置 `position` 及之前的字节已被释放；配置关闭提示时跳过，后端拒绝只记录告警。
pub(crate) fn forward_release_hint(content: &Content, position: Offset) {
    if !content.config().forward_release_hints {
        return;
    }
    if let Some(store) = content.as_source() {
        if let Err(err) = store.release(position) {
            tracing::warn!(
                content = store.name(),
                error = %err,
                "backing store rejected release hint"
            );
        }
    }
}

pub(crate) fn shrink_window(binding: &mut Binding, length: Offset) -> Result<()> {
    if length < binding.current || length > binding.length {
        return Err(StreamError::illegal_argument(format!(
            "cannot shrink visible length to {length}"
        )));
    }
    binding.length = length;
    Ok(())
}

/// 后端内容块的虚表。
pub(crate) struct SourceOps;

pub(crate) static SOURCE_OPS: SourceOps = SourceOps;

impl ContentOps for SourceOps {
    fn name(&self) -> &'static str {
        "SourceOps"
    }

    fn check(&self, binding: &Binding, op: &'static str) -> Result<()> {
        match binding.content.as_source() {
            Some(_) => Ok(()),
            None => Err(mismatch(self.name(), op, &binding.content)),
        }
    }

    fn read(&self, binding: &mut Binding, dst: &mut [u8]) -> Result<ReadStatus> {
        self.check(binding, "read")?;
        let Some(wanted) = readable_len(binding, dst)? else {
            return Ok(ReadStatus::EndOfStream);
        };
        let content = Arc::clone(&binding.content);
        let copied = content.read_at(binding.current, &mut dst[..wanted])?;
        if copied == 0 || copied > wanted {
            return Err(StreamError::system(format!(
                "backing store `{}` returned {copied} bytes for a {wanted}-byte request",
                content.name()
            )));
        }
        binding.current += copied;
        tracing::trace!(content = content.name(), copied, position = binding.position(), "read");
        Ok(ReadStatus::Read(copied))
    }

    fn release(&self, binding: &mut Binding, position: Offset) -> Result<()> {
        self.check(binding, "release")?;
        let first_valid = release_target(binding, position)?;
        binding.first_valid = first_valid;
        forward_release_hint(&binding.content, first_valid - 1);
        Ok(())
    }

    fn clone_binding(&self, binding: &Binding, offset: Offset) -> Result<Binding> {
        self.check(binding, "clone")?;
        clone_at(binding, offset)
    }

    fn dispose(&self, binding: &mut Binding) -> Result<()> {
        self.check(binding, "dispose")
    }
}

/// 组合块的虚表，读取与引用计数委派给 [`Composition`](crate::composition::Composition)。
pub(crate) struct CompositionOps;

pub(crate) static COMPOSITION_OPS: CompositionOps = CompositionOps;

impl ContentOps for CompositionOps {
    fn name(&self) -> &'static str {
        "CompositionOps"
    }

    fn check(&self, binding: &Binding, op: &'static str) -> Result<()> {
        match binding.content.as_composition() {
            Some(_) => Ok(()),
            None => Err(mismatch(self.name(), op, &binding.content)),
        }
    }

    fn read(&self, binding: &mut Binding, dst: &mut [u8]) -> Result<ReadStatus> {
        self.check(binding, "read")?;
        let Some(wanted) = readable_len(binding, dst)? else {
            return Ok(ReadStatus::EndOfStream);
        };
        let content = Arc::clone(&binding.content);
        let copied = content.read_at(binding.current, &mut dst[..wanted])?;
        if copied == 0 {
            return Err(StreamError::system("composition produced no data before its end"));
        }
        binding.current += copied;
        tracing::trace!(copied, position = binding.position(), "composed read");
        Ok(ReadStatus::Read(copied))
    }

    fn release(&self, binding: &mut Binding, position: Offset) -> Result<()> {
        self.check(binding, "release")?;
        let first_valid = release_target(binding, position)?;
        let before = binding.window();
        binding.first_valid = first_valid;
        if let Some(composition) = binding.content.as_composition() {
            // 先转发提示，此时即将退役的子流仍在。
            composition.forward_release(Window {
                start: before.start,
                end: first_valid,
            });
            composition.rebind(before, binding.window());
        }
        Ok(())
    }

    fn clone_binding(&self, binding: &Binding, offset: Offset) -> Result<Binding> {
        self.check(binding, "clone")?;
        let cloned = clone_at(binding, offset)?;
        if let Some(composition) = cloned.content.as_composition() {
            composition.rebind(Window::EMPTY, cloned.window());
        }
        Ok(cloned)
    }

    fn dispose(&self, binding: &mut Binding) -> Result<()> {
        self.check(binding, "dispose")?;
        if let Some(composition) = binding.content.as_composition() {
            composition.rebind(binding.window(), Window::EMPTY);
        }
        Ok(())
    }

    fn shrink(&self, binding: &mut Binding, length: Offset) -> Result<()> {
        self.check(binding, "shrink")?;
        let before = binding.window();
        shrink_window(binding, length)?;
        if let Some(composition) = binding.content.as_composition() {
            composition.rebind(before, binding.window());
        }
        Ok(())
    }
}
