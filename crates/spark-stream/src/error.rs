//! 游标与内容块的统一错误域。
//!
//! # 设计背景（Why）
//! - 调用方需要区分“契约违规”（参数非法、虚表不匹配）与“正常的区间外结果”（位置已释放、越界），
//!   前者应尽早断言，后者是常规分支；因此错误必须携带可匹配的 [`ErrorKind`]。
//! - 与 `spark-core` 的 `CoreError` 一致：错误码为稳定的 `'static` 字符串，消息面向排障人员，
//!   底层原因通过 `source()` 暴露，保证跨层 round-trip。
//!
//! # 契约说明（What）
//! - 读取到流末尾不是错误，由 [`ReadStatus::EndOfStream`](crate::ReadStatus::EndOfStream) 表达；
//! - `Busy`/`Cancelled`/`Security` 为保留分类，供网络或闪存等后端在自身边界转换异常时使用。

use std::{borrow::Cow, error::Error, fmt, io};

/// 错误分类，驱动调用方的分支策略。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 调用方违反前置条件：零长度、非法位置、虚表与内容块不匹配。
    IllegalArgument,
    /// 请求的位置不在当前有效区间内，或已被释放。
    NotFound,
    /// 后端分配失败或平台错误。
    System,
    /// 后端暂时无法服务。
    Busy,
    /// 后端操作被取消。
    Cancelled,
    /// 后端拒绝访问。
    Security,
}

impl ErrorKind {
    /// 返回分类对应的稳定错误码。
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::IllegalArgument => codes::ILLEGAL_ARGUMENT,
            ErrorKind::NotFound => codes::NOT_FOUND,
            ErrorKind::System => codes::SYSTEM,
            ErrorKind::Busy => codes::BUSY,
            ErrorKind::Cancelled => codes::CANCELLED,
            ErrorKind::Security => codes::SECURITY,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// 底层原因，保持 `Send + Sync` 以便跨线程传递。
pub type ErrorCause = Box<dyn Error + Send + Sync + 'static>;

/// `StreamError` 是本 crate 所有可失败操作的错误类型。
///
/// # 逻辑解析（How）
/// - `kind` 决定错误码，构造函数按分类命名（[`StreamError::illegal_argument`] 等），
///   避免调用点手写错误码导致语义漂移；
/// - `cause` 可选，后端可把自身的 I/O 或平台错误挂在链路上。
///
/// # 契约说明（What）
/// - **后置条件**：返回本错误的操作不产生任何部分状态变更（读取的“部分成功”走成功路径）。
#[derive(Debug, thiserror::Error)]
#[error("[{}] {message}", .kind.code())]
pub struct StreamError {
    kind: ErrorKind,
    message: Cow<'static, str>,
    #[source]
    cause: Option<ErrorCause>,
}

impl StreamError {
    /// 以分类与描述构造错误。
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn illegal_argument(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::IllegalArgument, message)
    }

    pub fn not_found(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn system(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::System, message)
    }

    /// 附带底层原因并返回新的错误。
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 错误分类。
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// 人类可读描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 底层原因。
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        let kind = match err.kind() {
            ErrorKind::IllegalArgument => io::ErrorKind::InvalidInput,
            ErrorKind::NotFound => io::ErrorKind::NotFound,
            ErrorKind::Busy => io::ErrorKind::WouldBlock,
            ErrorKind::Cancelled => io::ErrorKind::Interrupted,
            ErrorKind::Security => io::ErrorKind::PermissionDenied,
            ErrorKind::System => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

/// 统一返回值别名，默认错误类型为 [`StreamError`]。
pub type Result<T, E = StreamError> = core::result::Result<T, E>;

/// 稳定错误码集合，遵循 `<领域>.<语义>` 命名约定。
pub mod codes {
    /// 参数非法或虚表不匹配。
    pub const ILLEGAL_ARGUMENT: &str = "stream.illegal_argument";
    /// 位置越界或已释放。
    pub const NOT_FOUND: &str = "stream.not_found";
    /// 后端系统错误。
    pub const SYSTEM: &str = "stream.system";
    /// 后端忙。
    pub const BUSY: &str = "stream.busy";
    /// 后端操作被取消。
    pub const CANCELLED: &str = "stream.cancelled";
    /// 后端拒绝访问。
    pub const SECURITY: &str = "stream.security";
}

const _: fn() = || {
    fn assert_error_traits<T: Error + Send + Sync + 'static>() {}

    assert_error_traits::<StreamError>();
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_code_and_message() {
        let err = StreamError::not_found("position 7 already released");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(
            err.to_string(),
            "[stream.not_found] position 7 already released"
        );
        assert!(err.cause().is_none());
    }

    #[test]
    fn cause_is_exposed_through_source_chain() {
        let inner = io::Error::new(io::ErrorKind::Other, "flash page fault");
        let err = StreamError::system("backing store failed").with_cause(inner);
        let source = err.source().expect("cause should be exposed");
        assert_eq!(source.to_string(), "flash page fault");
    }

    #[test]
    fn io_conversion_keeps_kind_mapping() {
        let err: io::Error = StreamError::illegal_argument("empty buffer").into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
