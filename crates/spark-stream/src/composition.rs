//! 组合块：把两个游标首尾相接，作为一个逻辑流读取。
//!
//! # 设计背景（Why）
//! - 拼接不能复制数据，组合块只持有两个子游标，读取时按位置逐层展开到子流；
//! - 组合流可以被克隆、释放、拆分，子流是否仍被需要取决于所有组合游标的可见窗口，
//!   因此每个子流配一个“需求计数”，归零即可提前退役，尽早触发子内容块的释放回调；
//! - 逐包追加会形成很深的左倾拼接链，读取、释放提示与销毁都用显式工作表代替递归。
//!
//! # 逻辑解析（How）
//! - 组合块的内部坐标即子流 A 的逻辑坐标；子流 B 以“A 的逻辑末尾”为偏移克隆，两者自然首尾衔接；
//! - 子流快照存放在 `ArcSwapOption` 中，单子流内的读取无锁；跨越边界的读取与子流退役在
//!   边界锁下互斥，读者不会看到只退役了一半的子流对；
//! - 退役时只在锁内摘下快照，子游标的销毁（可能触发用户回调）在锁外执行。
//!
//! # 契约说明（What）
//! - 子流读取失败时：尚未取得任何字节则透传错误；已取得部分字节则作为成功返回，并记录告警；
//! - 组合游标的释放只向下转发提示，不移动子游标的首个有效位置；
//! - 组合块继承子流 A 的 [`StreamConfig`](crate::StreamConfig)。

use std::{fmt, mem, sync::Arc};

use arc_swap::ArcSwapOption;

use crate::{
    Cursor, Offset, ReleaseHook, Result, StreamError,
    content::Content,
    ops::{Binding, Translation, Window, forward_release_hint},
    sync::{AtomicUsize, BoundaryLock, Ordering},
};

/// 组合块持有的子游标快照。销毁即对子游标执行 `dispose`。
struct ChildSpan {
    binding: Binding,
    detached: bool,
}

impl ChildSpan {
    fn new(binding: Binding) -> Self {
        Self {
            binding,
            detached: false,
        }
    }

    /// 组合坐标区间 `[position, position + len)` 换算为子游标的内部起点。
    fn inner_start(&self, position: Offset, len: usize) -> Result<Offset> {
        let binding = &self.binding;
        binding
            .translation
            .to_inner(position)
            .filter(|inner| {
                *inner >= binding.first_valid
                    && inner.checked_add(len).is_some_and(|end| end <= binding.length)
            })
            .ok_or_else(|| {
                StreamError::system(format!(
                    "composed range {position}+{len} is outside the child window"
                ))
            })
    }

    /// 从后端内容块的内部位置 `start` 读取，循环直到 `dst` 填满或出错。
    ///
    /// 返回已拷贝的字节数以及（若有）中断读取的错误。
    fn read_source(&self, start: Offset, dst: &mut [u8]) -> (usize, Option<StreamError>) {
        let content = &self.binding.content;
        let mut filled = 0;
        while filled < dst.len() {
            match content.read_at(start + filled, &mut dst[filled..]) {
                Ok(0) => {
                    return (
                        filled,
                        Some(StreamError::system(format!(
                            "child `{}` returned no data before its end",
                            content.name()
                        ))),
                    );
                }
                Ok(count) => filled += count.min(dst.len() - filled),
                Err(err) => return (filled, Some(err)),
            }
        }
        (filled, None)
    }

    /// 销毁子游标。嵌套组合因此退役的子流追加到 `retired`，由调用方继续处理。
    fn detach(&mut self, retired: &mut Vec<Arc<ChildSpan>>) {
        if mem::replace(&mut self.detached, true) {
            return;
        }
        match self.binding.content.as_composition() {
            Some(nested) => nested.rebind_into(self.binding.window(), Window::EMPTY, retired),
            None => {
                let ops = self.binding.content.ops();
                if let Err(err) = ops.dispose(&mut self.binding) {
                    tracing::warn!(error = %err, "child cursor dispose failed");
                }
            }
        }
    }
}

impl Drop for ChildSpan {
    fn drop(&mut self) {
        let mut retired = Vec::new();
        self.detach(&mut retired);
        dispose_retired(retired);
    }
}

/// 逐个销毁退役子流；嵌套组合再退役的子流压回同一工作表，拼接链再深也不占用调用栈。
fn dispose_retired(mut retired: Vec<Arc<ChildSpan>>) {
    while let Some(span) = retired.pop() {
        // 仍被读者快照持有的子流，由最后一个持有者在其 `Drop` 中销毁。
        if let Ok(mut span) = Arc::try_unwrap(span) {
            span.detach(&mut retired);
        }
    }
}

/// 单个子流槽位：快照、需求计数与其在组合坐标中的区间。
struct ChildSlot {
    label: &'static str,
    span: ArcSwapOption<ChildSpan>,
    needs: AtomicUsize,
    range: Window,
}

impl ChildSlot {
    fn new(label: &'static str, binding: Binding, range: Window, composed: Window) -> Self {
        let needed = composed.overlaps(&range);
        // 组合窗口不覆盖的子流在此处随 `ChildSpan` 一起销毁。
        let span = needed.then_some(Arc::new(ChildSpan::new(binding)));
        Self {
            label,
            span: ArcSwapOption::new(span),
            needs: AtomicUsize::new(usize::from(needed)),
            range,
        }
    }
}

/// 读取工作表中的一项：组合坐标中待读的一段，或在该处中断读取的错误。
enum Pending {
    Segment {
        span: Arc<ChildSpan>,
        position: Offset,
        len: usize,
    },
    Failed(StreamError),
}

/// 组合块本体，作为 [`Content`] 的一个变体存在。
pub(crate) struct Composition {
    children: [ChildSlot; 2],
    boundary: BoundaryLock,
    a_end: Offset,
}

impl Composition {
    /// 子流 A 的逻辑末尾，即子流 B 在组合坐标中的起点。
    pub(crate) fn boundary(&self) -> Offset {
        self.a_end
    }

    fn crosses(&self, position: Offset, len: usize) -> bool {
        position < self.a_end && position + len > self.a_end
    }

    /// 定位读取，`position` 为组合坐标，`dst` 已按调用方可见长度截断。
    ///
    /// # 逻辑解析（How）
    /// - 待读区段压入工作表，按逻辑顺序弹出；落在嵌套组合上的区段就地拆成两段再压回，
    ///   落在后端上的区段才真正拷贝，因此嵌套深度不消耗调用栈；
    /// - 本层跨越边界时整个读取期间持有边界锁；嵌套层跨越边界时只在摘取两个快照期间持锁。
    pub(crate) fn read_at(&self, position: Offset, dst: &mut [u8]) -> Result<usize> {
        let _guard = self.crosses(position, dst.len()).then(|| self.boundary.lock());
        let mut pending = Vec::new();
        self.schedule(position, dst.len(), &mut pending);

        let mut filled = 0;
        while let Some(next) = pending.pop() {
            let (span, position, len) = match next {
                Pending::Segment {
                    span,
                    position,
                    len,
                } => (span, position, len),
                Pending::Failed(err) => return Self::partial(filled, err),
            };
            let start = match span.inner_start(position, len) {
                Ok(start) => start,
                Err(err) => return Self::partial(filled, err),
            };
            match span.binding.content.as_composition() {
                Some(nested) => {
                    let _guard = nested.crosses(start, len).then(|| nested.boundary.lock());
                    nested.schedule(start, len, &mut pending);
                }
                None => {
                    let (count, failure) =
                        span.read_source(start, &mut dst[filled..filled + len]);
                    filled += count;
                    if let Some(err) = failure {
                        return Self::partial(filled, err);
                    }
                }
            }
        }
        Ok(filled)
    }

    /// 把 `[position, position + len)` 拆到两个子流，先压 B 后压 A，弹出顺序即逻辑顺序。
    ///
    /// 跨越边界时调用方须已持有本组合块的边界锁。
    fn schedule(&self, position: Offset, len: usize, pending: &mut Vec<Pending>) {
        let end = position + len;
        let [child_a, child_b] = &self.children;
        if end > self.a_end {
            let start = position.max(self.a_end);
            pending.push(Self::segment(child_b, start, end - start));
        }
        if position < self.a_end {
            pending.push(Self::segment(child_a, position, end.min(self.a_end) - position));
        }
        if self.crosses(position, len) {
            tracing::trace!(position, len, "boundary read");
        }
    }

    fn segment(slot: &ChildSlot, position: Offset, len: usize) -> Pending {
        match slot.span.load_full() {
            Some(span) => Pending::Segment {
                span,
                position,
                len,
            },
            None => Pending::Failed(StreamError::system(format!(
                "child {} was retired while still referenced",
                slot.label
            ))),
        }
    }

    fn partial(filled: usize, err: StreamError) -> Result<usize> {
        if filled == 0 {
            return Err(err);
        }
        tracing::warn!(
            filled,
            error = %err,
            "composed read returned partial data after child failure"
        );
        Ok(filled)
    }

    /// 组合游标释放了组合坐标区间 `released`，把提示转发给其下各后端。
    ///
    /// 每个后端收到的是区间末尾在其自身坐标中的位置；子游标的绑定保持不变，是否转发由子内容块的
    /// [`StreamConfig::forward_release_hints`](crate::StreamConfig) 决定。
    pub(crate) fn forward_release(&self, released: Window) {
        let mut pending = Vec::new();
        self.schedule_hints(released, &mut pending);
        while let Some((span, window)) = pending.pop() {
            let binding = &span.binding;
            let (Some(start), Some(end)) = (
                binding.translation.to_inner(window.start),
                binding.translation.to_inner(window.end),
            ) else {
                continue;
            };
            match binding.content.as_composition() {
                Some(nested) => nested.schedule_hints(Window { start, end }, &mut pending),
                None => forward_release_hint(&binding.content, end - 1),
            }
        }
    }

    fn schedule_hints(&self, released: Window, pending: &mut Vec<(Arc<ChildSpan>, Window)>) {
        for slot in self.children.iter().rev() {
            if !released.overlaps(&slot.range) {
                continue;
            }
            if let Some(span) = slot.span.load_full() {
                let window = Window {
                    start: released.start.max(slot.range.start),
                    end: released.end.min(slot.range.end),
                };
                pending.push((span, window));
            }
        }
    }

    /// 组合游标的可见窗口由 `before` 变为 `after` 后调整各子流的需求计数。
    ///
    /// 窗口只会收缩或新建（克隆的窗口是源窗口的子集），因此计数归零后不会再次增长。
    pub(crate) fn rebind(&self, before: Window, after: Window) {
        let mut retired = Vec::new();
        self.rebind_into(before, after, &mut retired);
        dispose_retired(retired);
    }

    fn rebind_into(&self, before: Window, after: Window, retired: &mut Vec<Arc<ChildSpan>>) {
        // 逆序处理，工作表弹出时子流 A 先于 B 销毁。
        for slot in self.children.iter().rev() {
            match (before.overlaps(&slot.range), after.overlaps(&slot.range)) {
                (false, true) => {
                    slot.needs.fetch_add(1, Ordering::AcqRel);
                }
                (true, false) => {
                    if slot.needs.fetch_sub(1, Ordering::AcqRel) == 1 {
                        retired.extend(self.retire(slot));
                    }
                }
                _ => {}
            }
        }
    }

    /// 在边界锁下摘下快照，销毁交给调用方在锁外进行。
    fn retire(&self, slot: &ChildSlot) -> Option<Arc<ChildSpan>> {
        let retired = {
            let _guard = self.boundary.lock();
            slot.span.swap(None)
        };
        if retired.is_some() {
            tracing::debug!(child = slot.label, "composition child retired");
        }
        retired
    }

    /// 仍存活的子流数量。
    pub(crate) fn live_children(&self) -> usize {
        self.children
            .iter()
            .filter(|slot| slot.span.load().is_some())
            .count()
    }
}

impl Drop for Composition {
    fn drop(&mut self) {
        let retired = self
            .children
            .iter()
            .filter_map(|slot| slot.span.swap(None))
            .collect();
        dispose_retired(retired);
    }
}

impl fmt::Debug for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composition")
            .field("boundary", &self.boundary())
            .field("live_children", &self.live_children())
            .finish()
    }
}

impl Cursor {
    /// 把 `other` 的剩余内容追加到本游标之后（`concat` 操作）。
    ///
    /// # 逻辑解析（How）
    /// - 本游标的当前绑定原样搬入组合块作为子流 A（不增加引用）；
    /// - `other` 在 A 的逻辑末尾处克隆为子流 B，`other` 本身不受影响，仍需调用方销毁；
    /// - 本游标改为指向新组合块，当前位置与首个有效位置保持不变。
    ///
    /// # 契约说明（What）
    /// - 计算任一子流剩余长度失败、或拼接后长度超过配置上限时返回错误，本游标保持原状。
    pub fn concat(&mut self, other: &Cursor) -> Result<()> {
        self.concat_inner(other, None)
    }

    /// 同 [`Cursor::concat`]，并在组合块最终释放时执行 `release`。
    pub fn concat_with_release(
        &mut self,
        other: &Cursor,
        release: impl FnOnce() + Send + Sync + 'static,
    ) -> Result<()> {
        self.concat_inner(other, Some(Box::new(release)))
    }

    fn concat_inner(&mut self, other: &Cursor, release: Option<ReleaseHook>) -> Result<()> {
        let head = self.binding().clone();
        head.content.ops().remaining_size(&head)?;
        let tail_source = other.binding();
        let tail_remaining = tail_source.content.ops().remaining_size(tail_source)?;

        let config = *head.content.config();
        let a_start = head.translation.to_logical(head.first_valid);
        let a_end = head.translation.to_logical(head.length);
        let length = a_end
            .checked_add(tail_remaining)
            .filter(|end| *end <= config.max_position)
            .ok_or_else(|| {
                StreamError::illegal_argument(format!(
                    "concatenated length {a_end} + {tail_remaining} overflows max position {}",
                    config.max_position
                ))
            })?;
        let tail = tail_source.content.ops().clone_binding(tail_source, a_end)?;

        let composed_window = Window {
            start: a_start,
            end: length,
        };
        let current = head.position();
        let composition = Composition {
            children: [
                ChildSlot::new(
                    "a",
                    head,
                    Window {
                        start: a_start,
                        end: a_end,
                    },
                    composed_window,
                ),
                ChildSlot::new(
                    "b",
                    tail,
                    Window {
                        start: a_end,
                        end: length,
                    },
                    composed_window,
                ),
            ],
            boundary: BoundaryLock::new(),
            a_end,
        };
        let content = Arc::new(Content::composed(composition, config, release));
        tracing::debug!(boundary = a_end, length, position = current, "streams concatenated");

        // 旧绑定已按位搬入子流 A，覆盖时只归还多出的那一份 `Arc`。
        *self.binding_mut() = Binding {
            content,
            translation: Translation::IDENTITY,
            current,
            first_valid: a_start,
            length,
        };
        Ok(())
    }
}
