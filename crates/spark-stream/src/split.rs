use crate::{Cursor, Offset, Result, StreamError};

impl Cursor {
    /// 在逻辑位置 `position` 处把游标一分为二（`split` 操作）。
    ///
    /// # 逻辑解析（How）
    /// 1. 读取当前位置与剩余长度，校验拆分点；
    /// 2. 临时移动到拆分点，在该位置克隆出后半段，再移回原位置；
    /// 3. 把本游标的可见长度截断到拆分点，两个游标从此互不重叠。
    ///
    /// # 契约说明（What）
    /// - 拆分点等于当前位置或可见末尾时返回 `IllegalArgument`（不产生零长度的半段）；
    /// - 拆分点落在 `[当前位置, 可见末尾)` 之外时返回 `NotFound`；
    /// - 任一步骤失败都会恢复原位置，不留下部分效果。
    pub fn split(&mut self, position: Offset) -> Result<Cursor> {
        let current = self.position()?;
        let remaining = self.remaining_size()?;
        let end = current.checked_add(remaining).ok_or_else(|| {
            StreamError::system(format!(
                "visible end overflows: position {current} + remaining {remaining}"
            ))
        })?;
        if position == current || position == end {
            return Err(StreamError::illegal_argument(format!(
                "split at {position} would produce an empty half of [{current}, {end})"
            )));
        }
        if position < current || position > end {
            return Err(StreamError::not_found(format!(
                "split position {position} is outside [{current}, {end})"
            )));
        }

        self.set_position(position)?;
        let split_out = self.clone_at(position);
        self.set_position(current)?;
        let split_out = split_out?;

        let ops = self.binding().content.ops();
        let binding = self.binding_mut();
        let cut = binding.translation.to_inner(position).ok_or_else(|| {
            StreamError::system(format!("split position {position} has no inner position"))
        })?;
        // 截断失败时 `split_out` 随作用域销毁，本游标保持原状。
        ops.shrink(binding, cut)?;
        tracing::debug!(position, head = position - current, tail = end - position, "stream split");
        Ok(split_out)
    }
}
