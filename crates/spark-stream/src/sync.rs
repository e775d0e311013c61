//! 同步原语适配层。
//!
//! 启用 `--cfg loom` 时切换到 Loom 提供的原子类型与互斥锁，使模型检查能够捕获
//! 子流引用计数与边界锁的全部调度交错；`Arc` 保持标准实现。

#[cfg(not(loom))]
pub(crate) use core::sync::atomic::{AtomicUsize, Ordering};
#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicUsize, Ordering};

/// 组合块的边界锁。
///
/// 常规构建使用 `spin::Mutex`，与 `spark-buffer` 的租约锁保持一致；Loom 构建改用
/// `loom::sync::Mutex`，否则自旋等待无法被模型调度器让出。
pub(crate) struct BoundaryLock {
    #[cfg(not(loom))]
    inner: spin::Mutex<()>,
    #[cfg(loom)]
    inner: loom::sync::Mutex<()>,
}

/// 边界锁守卫，离开作用域即解锁。
#[cfg(not(loom))]
pub(crate) type BoundaryGuard<'a> = spin::MutexGuard<'a, ()>;
#[cfg(loom)]
pub(crate) type BoundaryGuard<'a> = loom::sync::MutexGuard<'a, ()>;

impl BoundaryLock {
    pub(crate) fn new() -> Self {
        Self {
            #[cfg(not(loom))]
            inner: spin::Mutex::new(()),
            #[cfg(loom)]
            inner: loom::sync::Mutex::new(()),
        }
    }

    pub(crate) fn lock(&self) -> BoundaryGuard<'_> {
        #[cfg(not(loom))]
        {
            self.inner.lock()
        }
        #[cfg(loom)]
        {
            // 锁内不执行用户回调，中毒只可能来自测试断言，沿用内部数据即可。
            self.inner
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
        }
    }
}

impl core::fmt::Debug for BoundaryLock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("BoundaryLock")
    }
}
