use super::value::ValueKind;
use std::{
    borrow::Cow,
    error::Error as StdError,
    io::{Error as IoError, ErrorKind as IoErrorKind},
};
use thiserror::Error;

/// Multipart 表单构建错误
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MultipartError {
    /// 非法参数，例如空的字段名称
    #[error("invalid argument: {0}")]
    InvalidArgument(Cow<'static, str>),

    /// 不支持的字段值类型
    ///
    /// 仅在构建请求体时才会返回，与 [`MultipartError::InvalidArgument`] 区分
    #[error("value should be bytes, stream, sequence, text or number, but got {0:?}")]
    UnsupportedValue(ValueKind),

    /// 上游数据流返回错误
    #[error("upstream stream error: {0}")]
    UpstreamStream(#[source] IoError),

    /// 上游数据流在结束前被关闭
    #[error("stream was closed before it ended")]
    UnexpectedClose,

    /// 等待 HTTP 响应时连接失败
    #[error("connection error: {0}")]
    Connection(#[source] Box<dyn StdError + Send + Sync>),

    /// 请求体数据流已被销毁
    #[error("multipart stream was destroyed")]
    Destroyed,

    /// 请求体数据流已被部分读取，无法再读取完整的请求体
    #[error("multipart stream was partially consumed, {0} bytes are already forwarded")]
    PartiallyConsumed(u64),
}

/// Multipart 表单构建结果
pub type MultipartResult<T> = Result<T, MultipartError>;

impl MultipartError {
    pub(crate) fn invalid_argument(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// 将上游数据流返回的 IO 错误分类
    pub(crate) fn from_upstream(err: IoError) -> Self {
        match err.kind() {
            IoErrorKind::UnexpectedEof => Self::UnexpectedClose,
            _ => Self::UpstreamStream(err),
        }
    }
}

impl From<futures::channel::oneshot::Canceled> for MultipartError {
    #[inline]
    fn from(_: futures::channel::oneshot::Canceled) -> Self {
        Self::UnexpectedClose
    }
}

impl From<MultipartError> for IoError {
    fn from(err: MultipartError) -> Self {
        match err {
            MultipartError::UpstreamStream(err) => err,
            MultipartError::UnexpectedClose => IoError::new(IoErrorKind::UnexpectedEof, err),
            MultipartError::InvalidArgument(_) | MultipartError::UnsupportedValue(_) => {
                IoError::new(IoErrorKind::InvalidInput, err)
            }
            MultipartError::Connection(_) => IoError::new(IoErrorKind::ConnectionAborted, err),
            MultipartError::Destroyed => IoError::new(IoErrorKind::Interrupted, err),
            MultipartError::PartiallyConsumed(_) => IoError::new(IoErrorKind::Other, err),
        }
    }
}
