//! 内容块级别的运行参数。
//!
//! # 设计背景（Why）
//! - 嵌入式部署常以 32 位偏移描述流位置，需要在克隆、拼接时按更小的上限做溢出判定；
//! - 只读常量、闪存等后端不需要释放提示，允许关闭以省去一次虚调用。
//!
//! # 契约说明（What）
//! - 配置在 `init` 时固化到内容块，克隆与拆分共享同一份；拼接产生的组合块继承子流 A 的配置。
//! - 可通过 TOML 文本加载，字段既可位于顶层，也可位于 `[stream]` 表内。

use serde::Deserialize;

use crate::{Offset, Result, StreamError};

/// 流配置。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
    /// 逻辑位置的上限（含）；克隆偏移加剩余长度超过该值时拒绝操作。
    pub max_position: Offset,
    /// `release` 成功后是否把释放位置作为提示转发给后端。
    pub forward_release_hints: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_position: Offset::MAX,
            forward_release_hints: true,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigDocument {
    Table { stream: StreamConfig },
    Flat(StreamConfig),
}

impl StreamConfig {
    /// 以 32 位偏移为上限的配置，对应嵌入式设备的常见取值。
    pub fn with_u32_offsets() -> Self {
        Self {
            max_position: u32::MAX as Offset,
            ..Self::default()
        }
    }

    /// 从 TOML 文本解析配置并校验。
    ///
    /// # 契约说明
    /// - **输入**：完整 TOML 文档；未出现的字段取默认值。
    /// - **错误**：语法错误或字段非法时返回 `IllegalArgument`，底层 `toml` 错误挂在 `source()` 上。
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let document: ConfigDocument = toml::from_str(text).map_err(|err| {
            StreamError::illegal_argument("stream configuration is not valid TOML").with_cause(err)
        })?;
        let config = match document {
            ConfigDocument::Table { stream } => stream,
            ConfigDocument::Flat(config) => config,
        };
        config.validate()?;
        Ok(config)
    }

    /// 校验字段取值。
    pub fn validate(&self) -> Result<()> {
        if self.max_position == 0 {
            return Err(StreamError::illegal_argument(
                "stream configuration: max_position must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn defaults_allow_full_position_range() {
        let config = StreamConfig::default();
        assert_eq!(config.max_position, Offset::MAX);
        assert!(config.forward_release_hints);
    }

    #[test]
    fn parses_stream_table() {
        let config = StreamConfig::from_toml_str(
            r#"
            [stream]
            max_position = 4294967295
            forward_release_hints = false
            "#,
        )
        .expect("table form should parse");
        assert_eq!(config, StreamConfig {
            max_position: u32::MAX as Offset,
            forward_release_hints: false,
        });
    }

    #[test]
    fn parses_flat_document_with_defaults() {
        let config = StreamConfig::from_toml_str("forward_release_hints = false")
            .expect("flat form should parse");
        assert_eq!(config.max_position, Offset::MAX);
        assert!(!config.forward_release_hints);
    }

    #[test]
    fn rejects_zero_limit_and_garbage() {
        let err = StreamConfig::from_toml_str("max_position = 0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalArgument);

        let err = StreamConfig::from_toml_str("max_position = [").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalArgument);
        assert!(err.cause().is_some());
    }
}
