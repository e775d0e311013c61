use std::{fmt, sync::Arc};

use bytes::Bytes;

use crate::{
    Cursor, Offset, Result, StreamConfig, StreamError,
    composition::Composition,
    ops::{Binding, COMPOSITION_OPS, ContentOps, SOURCE_OPS},
    store::{BackingStore, BytesStore},
};

/// 释放回调：在内容块最后一个引用消失时恰好执行一次。
pub type ReleaseHook = Box<dyn FnOnce() + Send + Sync + 'static>;

/// 内容块承载的数据：后端本体，或由拼接生成的组合块。
pub(crate) enum ContentBody {
    Source(Box<dyn BackingStore>),
    Composed(Composition),
}

/// `Content` 是被多个游标共享的内容块。
///
/// # 设计背景（Why）
/// - 游标是轻量的单持有者视图，真正的数据与其释放责任集中在内容块上；
/// - 引用计数交给 `Arc`：克隆游标即增加强引用，销毁游标即减少，计数归零时由 `Drop`
///   统一触发释放回调，结构上保证“恰好一次”。
///
/// # 契约说明（What）
/// - `data_release` 先于 `block_release` 执行，二者均可缺省（例如常量数据无需释放）；
/// - 回调执行时不持有任何内部锁。
pub(crate) struct Content {
    body: ContentBody,
    config: StreamConfig,
    data_release: Option<ReleaseHook>,
    block_release: Option<ReleaseHook>,
}

impl Content {
    pub(crate) fn source(
        store: Box<dyn BackingStore>,
        config: StreamConfig,
        data_release: Option<ReleaseHook>,
        block_release: Option<ReleaseHook>,
    ) -> Self {
        Self {
            body: ContentBody::Source(store),
            config,
            data_release,
            block_release,
        }
    }

    pub(crate) fn composed(
        composition: Composition,
        config: StreamConfig,
        block_release: Option<ReleaseHook>,
    ) -> Self {
        Self {
            body: ContentBody::Composed(composition),
            config,
            data_release: None,
            block_release,
        }
    }

    /// 内容块绑定的虚表；每个变体对应唯一虚表，类型守卫据此拒绝错配调用。
    pub(crate) fn ops(&self) -> &'static dyn ContentOps {
        match &self.body {
            ContentBody::Source(_) => &SOURCE_OPS,
            ContentBody::Composed(_) => &COMPOSITION_OPS,
        }
    }

    pub(crate) fn as_source(&self) -> Option<&dyn BackingStore> {
        match &self.body {
            ContentBody::Source(store) => Some(store.as_ref()),
            ContentBody::Composed(_) => None,
        }
    }

    pub(crate) fn as_composition(&self) -> Option<&Composition> {
        match &self.body {
            ContentBody::Composed(composition) => Some(composition),
            ContentBody::Source(_) => None,
        }
    }

    pub(crate) fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub(crate) fn name(&self) -> &'static str {
        match &self.body {
            ContentBody::Source(store) => store.name(),
            ContentBody::Composed(_) => "composition",
        }
    }

    /// 以内容块自身坐标做定位读取；组合块经工作表逐层展开到子流。
    pub(crate) fn read_at(&self, position: Offset, dst: &mut [u8]) -> Result<usize> {
        match &self.body {
            ContentBody::Source(store) => store.read_at(position, dst),
            ContentBody::Composed(composition) => composition.read_at(position, dst),
        }
    }
}

impl Drop for Content {
    fn drop(&mut self) {
        tracing::debug!(content = self.name(), "content block released");
        if let Some(release) = self.data_release.take() {
            release();
        }
        if let Some(release) = self.block_release.take() {
            release();
        }
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Content")
            .field("name", &self.name())
            .field("config", &self.config)
            .field("data_release", &self.data_release.is_some())
            .field("block_release", &self.block_release.is_some())
            .finish()
    }
}

/// `ContentBuilder` 把一个后端暴露为新的内容块，并返回指向其起点的游标（`init` 操作）。
///
/// # 使用方式（How）
/// ```rust
/// use spark_stream::{ContentBuilder, BytesStore, ReadStatus};
///
/// let mut cursor = ContentBuilder::new(BytesStore::from_static(b"0123456789"))
///     .on_data_release(|| {})
///     .build()
///     .expect("non-empty store");
/// let mut local = [0u8; 4];
/// assert_eq!(cursor.read(&mut local).unwrap(), ReadStatus::Read(4));
/// assert_eq!(&local, b"0123");
/// ```
///
/// # 契约说明（What）
/// - **前置条件**：后端长度大于 0，配置通过 [`StreamConfig::validate`]，否则返回
///   `IllegalArgument`，回调不会被调用；
/// - **后置条件**：游标位于逻辑位置 0，内容块引用计数为 1。
pub struct ContentBuilder {
    store: Box<dyn BackingStore>,
    config: StreamConfig,
    data_release: Option<ReleaseHook>,
    block_release: Option<ReleaseHook>,
}

impl ContentBuilder {
    /// 以默认配置、无释放回调开始构建。
    pub fn new(store: impl BackingStore) -> Self {
        Self {
            store: Box::new(store),
            config: StreamConfig::default(),
            data_release: None,
            block_release: None,
        }
    }

    /// 数据释放回调，对应后端持有的字节。
    pub fn on_data_release(mut self, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.data_release = Some(Box::new(release));
        self
    }

    /// 内容块释放回调，在数据释放之后执行。
    pub fn on_block_release(mut self, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.block_release = Some(Box::new(release));
        self
    }

    /// 替换内容块配置，`build` 时校验。
    pub fn with_config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Cursor> {
        self.config.validate()?;
        let length = self.store.len();
        if length == 0 {
            return Err(StreamError::illegal_argument(format!(
                "cannot expose empty backing store `{}`",
                self.store.name()
            )));
        }
        if length > self.config.max_position {
            return Err(StreamError::illegal_argument(format!(
                "backing store length {length} exceeds max_position {}",
                self.config.max_position
            )));
        }
        let content = Arc::new(Content::source(
            self.store,
            self.config,
            self.data_release,
            self.block_release,
        ));
        tracing::debug!(content = content.name(), length, "content block created");
        Ok(Cursor::from_binding(Binding::fresh(content, length)))
    }
}

impl fmt::Debug for ContentBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentBuilder")
            .field("store", &self.store.name())
            .field("config", &self.config)
            .finish()
    }
}

impl Cursor {
    /// 以默认配置暴露后端。
    pub fn new(store: impl BackingStore) -> Result<Self> {
        ContentBuilder::new(store).build()
    }

    /// 零拷贝地暴露一段内存。
    pub fn from_bytes(data: impl Into<Bytes>) -> Result<Self> {
        Self::new(BytesStore::new(data))
    }

    /// 以默认配置暴露静态字节切片。
    pub fn from_static(data: &'static [u8]) -> Result<Self> {
        Self::new(BytesStore::from_static(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, test_stubs::ReleaseCounter};

    #[test]
    fn empty_store_is_rejected_without_running_hooks() {
        let counter = ReleaseCounter::new();
        let err = ContentBuilder::new(BytesStore::new(Vec::new()))
            .on_data_release(counter.data_hook())
            .on_block_release(counter.block_hook())
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalArgument);
        assert_eq!(counter.data_releases(), 0);
        assert_eq!(counter.block_releases(), 0);
    }

    #[test]
    fn hooks_run_in_order_exactly_once() {
        let order = Arc::new(spin::Mutex::new(Vec::new()));
        let data_order = Arc::clone(&order);
        let block_order = Arc::clone(&order);
        let cursor = ContentBuilder::new(BytesStore::from_static(b"abc"))
            .on_data_release(move || data_order.lock().push("data"))
            .on_block_release(move || block_order.lock().push("block"))
            .build()
            .unwrap();
        let clone = cursor.try_clone().unwrap();
        drop(cursor);
        assert!(order.lock().is_empty(), "clone still references the block");
        drop(clone);
        assert_eq!(*order.lock(), vec!["data", "block"]);
    }

    #[test]
    fn length_above_configured_limit_is_rejected() {
        let config = StreamConfig {
            max_position: 2,
            ..StreamConfig::default()
        };
        let err = ContentBuilder::new(BytesStore::from_static(b"abc"))
            .with_config(config)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalArgument);
    }
}
