//! 常用类型的一站式导入：`use spark_stream::prelude::*;`。

pub use crate::{
    BackingStore, BytesStore, ContentBuilder, Cursor, ErrorKind, Offset, ReadStatus, Result,
    StreamConfig, StreamError,
};
