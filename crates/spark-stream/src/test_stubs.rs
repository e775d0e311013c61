//! 测试桩：可注入故障、可观测调用的后端与释放回调计数器。
//!
//! # 设计背景（Why）
//! - 合约测试需要验证“部分读取”“释放提示转发”“回调恰好一次”等行为，真实后端无法制造这些场景；
//! - 桩状态全部挂在测试自行创建的 [`StoreProbe`] / [`ReleaseCounter`] 上，不存在进程级全局状态，
//!   并行执行的测试互不干扰。
//!
//! # 使用方式（How）
//! ```rust
//! use spark_stream::{Cursor, ErrorKind, test_stubs::ProbeStore};
//!
//! let (store, probe) = ProbeStore::new(b"0123456789".to_vec());
//! probe.fail_reads_from(4);
//! let mut cursor = Cursor::new(store).unwrap();
//! let mut local = [0u8; 8];
//! assert_eq!(cursor.read(&mut local).unwrap().len(), 4);
//! assert_eq!(cursor.read(&mut local).unwrap_err().kind(), ErrorKind::System);
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use bytes::Bytes;

use crate::{BackingStore, Offset, Result, StreamError};

const NO_FAILURE: usize = usize::MAX;

/// [`ProbeStore`] 的观测与控制面板。
#[derive(Debug)]
pub struct StoreProbe {
    reads: AtomicUsize,
    fail_from: AtomicUsize,
    chunk_limit: AtomicUsize,
    release_hints: spin::Mutex<Vec<Offset>>,
    dropped: AtomicBool,
}

impl StoreProbe {
    /// 从 `position` 起的读取一律失败（`System`）；位于其前的读取会被截断到该位置。
    pub fn fail_reads_from(&self, position: Offset) {
        self.fail_from.store(position, Ordering::SeqCst);
    }

    /// 撤销 [`fail_reads_from`](Self::fail_reads_from) 注入的故障。
    pub fn heal(&self) {
        self.fail_from.store(NO_FAILURE, Ordering::SeqCst);
    }

    /// 单次 `read_at` 最多返回 `limit` 字节，用于制造短读。
    pub fn limit_chunk(&self, limit: usize) {
        self.chunk_limit.store(limit.max(1), Ordering::SeqCst);
    }

    /// 成功的 `read_at` 次数。
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// 收到的释放提示，按到达顺序排列。
    pub fn release_hints(&self) -> Vec<Offset> {
        self.release_hints.lock().clone()
    }

    /// 后端是否已随内容块一起销毁。
    pub fn dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

/// 内存后端的测试替身，所有行为由配套的 [`StoreProbe`] 控制与记录。
#[derive(Debug)]
pub struct ProbeStore {
    data: Bytes,
    probe: Arc<StoreProbe>,
}

impl ProbeStore {
    /// 创建后端及其观测面板；后端交给内容块后仍可经面板控制。
    pub fn new(data: impl Into<Bytes>) -> (Self, Arc<StoreProbe>) {
        let probe = Arc::new(StoreProbe {
            reads: AtomicUsize::new(0),
            fail_from: AtomicUsize::new(NO_FAILURE),
            chunk_limit: AtomicUsize::new(usize::MAX),
            release_hints: spin::Mutex::new(Vec::new()),
            dropped: AtomicBool::new(false),
        });
        let store = Self {
            data: data.into(),
            probe: Arc::clone(&probe),
        };
        (store, probe)
    }
}

impl BackingStore for ProbeStore {
    fn len(&self) -> Offset {
        self.data.len()
    }

    fn read_at(&self, position: Offset, dst: &mut [u8]) -> Result<usize> {
        let fail_from = self.probe.fail_from.load(Ordering::SeqCst);
        if position >= fail_from {
            return Err(StreamError::system(format!(
                "injected read failure at position {position}"
            )));
        }
        let end = self
            .data
            .len()
            .min(fail_from)
            .min(position.saturating_add(dst.len()))
            .min(position.saturating_add(self.probe.chunk_limit.load(Ordering::SeqCst)));
        let available = self.data.get(position..end).ok_or_else(|| {
            StreamError::not_found(format!("ProbeStore::read_at position {position} out of range"))
        })?;
        dst[..available.len()].copy_from_slice(available);
        self.probe.reads.fetch_add(1, Ordering::SeqCst);
        Ok(available.len())
    }

    fn release(&self, position: Offset) -> Result<()> {
        self.probe.release_hints.lock().push(position);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "probe"
    }
}

impl Drop for ProbeStore {
    fn drop(&mut self) {
        self.probe.dropped.store(true, Ordering::SeqCst);
    }
}

/// 统计数据释放与内容块释放回调的执行次数。
#[derive(Clone, Debug, Default)]
pub struct ReleaseCounter {
    data: Arc<AtomicUsize>,
    block: Arc<AtomicUsize>,
}

impl ReleaseCounter {
    /// 两项计数均为 0 的计数器。
    pub fn new() -> Self {
        Self::default()
    }

    /// 执行时累加数据释放计数的回调。
    pub fn data_hook(&self) -> impl FnOnce() + Send + Sync + 'static + use<> {
        let data = Arc::clone(&self.data);
        move || {
            data.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// 执行时累加内容块释放计数的回调。
    pub fn block_hook(&self) -> impl FnOnce() + Send + Sync + 'static + use<> {
        let block = Arc::clone(&self.block);
        move || {
            block.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// 数据释放回调的执行次数。
    pub fn data_releases(&self) -> usize {
        self.data.load(Ordering::SeqCst)
    }

    /// 内容块释放回调的执行次数。
    pub fn block_releases(&self) -> usize {
        self.block.load(Ordering::SeqCst)
    }
}
