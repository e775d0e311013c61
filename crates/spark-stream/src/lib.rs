//! `spark-stream` 提供共享内容块之上的零拷贝读取游标。
//!
//! # 模块定位（Why）
//! - 生产方把内存、闪存、生成序列乃至另一条组合流统一暴露为可读内容，消费方只面对一个
//!   读取接口，且永远拿不到后端内存的指针：数据一律拷贝进调用方自己的本地缓冲；
//! - 消费方可以回退、部分确认（释放）已消费的数据，克隆独立游标，或在不复制数据的前提下
//!   拼接、拆分流。
//!
//! # 设计概要（How）
//! - `content`：被多个游标共享的内容块，`Arc` 强引用即引用计数，最后一个引用消失时执行释放回调；
//! - `store`：后端原语 [`BackingStore`] 与平坦内存实现 [`BytesStore`]；
//! - `ops`：八项游标操作的虚表，位置算术只实现一次，后端与组合块各自一张虚表；
//! - `cursor`：单持有者游标 [`Cursor`]，`Send + !Sync`，跨线程前先克隆；
//! - `composition` / `split`：拼接与拆分，组合块仅在跨越子流边界的读取上加锁。
//!
//! # 契约说明（What）
//! - 逻辑位置与内部位置通过有符号平移量换算，克隆可以为新游标任意指定逻辑起点；
//! - 除读取的“部分成功”外，返回错误的操作都不改变任何状态；
//! - 流末尾以 [`ReadStatus::EndOfStream`] 表达，不是错误。

mod composition;
mod config;
mod content;
mod cursor;
mod error;
mod ops;
mod split;
mod store;
mod sync;

pub mod prelude;
/// 测试桩命名空间：可注入故障的后端替身与释放回调计数器，供集成测试复用。
pub mod test_stubs;

/// 流内的字节位置（逻辑或内部）。
pub type Offset = usize;

pub use config::StreamConfig;
pub use content::{ContentBuilder, ReleaseHook};
pub use cursor::{Cursor, ReadStatus};
pub use error::{ErrorCause, ErrorKind, Result, StreamError, codes};
pub use store::{BackingStore, BytesStore};
