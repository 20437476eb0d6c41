use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// 检索核心的错误类型
#[derive(Debug, Error)]
pub enum Error {
    /// 视频或帧无法解码，构建时跳过该文件即可
    #[error("解码失败 {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    /// 查询图片无法识别，应当拒绝该请求
    #[error("不支持的图片格式: {0}")]
    UnsupportedFormat(String),
    /// 索引与元数据不一致，必须拒绝服务直到修复
    #[error("索引完整性错误: {0}")]
    Integrity(String),
    /// 尚未加载任何索引
    #[error("索引尚未加载")]
    EmptyIndex,
    /// 无法从文件名或目录中解析出番剧信息
    #[error("无法解析番剧信息: {0}")]
    Catalog(String),
    /// 构建时没有任何来源成功写入索引
    #[error("没有可用的来源: {0}")]
    NoSource(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialize(#[from] bincode::Error),
}

impl Error {
    pub fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Decode { path: path.into(), reason: reason.to_string() }
    }

    pub fn integrity(reason: impl Into<String>) -> Self {
        Self::Integrity(reason.into())
    }

    /// 该错误是否只影响单个条目，可以跳过后继续处理
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::Catalog(_) | Self::UnsupportedFormat(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "decode",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::Integrity(_) => "integrity",
            Self::EmptyIndex => "empty_index",
            Self::Catalog(_) => "catalog",
            Self::NoSource(_) => "no_source",
            Self::Io(_) => "io",
            Self::Serialize(_) => "serialize",
        }
    }
}
