use super::{
    combined::{DeferredSegment, Segment},
    error::MultipartResult,
    request::InFlightRequest,
};
use bytes::Bytes;
use futures::{
    future::Future,
    io::AsyncRead,
    ready,
    stream::{BoxStream, Stream},
};
use serde_json::{Map, Value};
use std::{
    borrow::Cow,
    ffi::OsStr,
    fmt::{self, Debug},
    io::{ErrorKind as IoErrorKind, Result as IoResult},
    path::{Path, PathBuf},
    pin::Pin,
    task::{Context, Poll},
};

/// 表单组件的数据流
pub type PartStream<'a> = BoxStream<'a, IoResult<Bytes>>;

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// 字段值的类型
///
/// 字段值在追加时即确定为以下封闭集合中的一种，后续处理只需匹配类型而无需再次探测
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ValueKind {
    /// 空值
    Null,
    /// 布尔值
    Bool,
    /// 数字
    Number,
    /// 文本
    Text,
    /// 内存数据
    Bytes,
    /// 有序序列
    Sequence,
    /// 结构化对象，不能作为字段值
    Object,
    /// 文件包装
    File,
    /// 数据流
    Stream,
    /// 尚未发送的 HTTP 请求
    Request,
    /// 异步解析的数据
    Deferred,
}

/// 表单字段值
pub struct FieldValue<'a>(FieldValueInner<'a>);

pub(crate) enum FieldValueInner<'a> {
    Null,
    Bool(bool),
    Number(String),
    Text(Cow<'a, str>),
    Bytes(Bytes),
    Sequence(Vec<FieldValue<'a>>),
    Object(Map<String, Value>),
    File(FileWrapper<'a>),
    Stream {
        stream: PartStream<'a>,
        path: Option<Cow<'a, str>>,
    },
    Request(Box<dyn InFlightRequest>),
    Deferred(DeferredSegment<'a>),
}

impl Debug for FieldValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            FieldValueInner::Null => f.write_str("Null"),
            FieldValueInner::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            FieldValueInner::Number(n) => f.debug_tuple("Number").field(n).finish(),
            FieldValueInner::Text(text) => f.debug_tuple("Text").field(text).finish(),
            FieldValueInner::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            FieldValueInner::Sequence(values) => f.debug_tuple("Sequence").field(values).finish(),
            FieldValueInner::Object(object) => f.debug_tuple("Object").field(object).finish(),
            FieldValueInner::File(file) => f.debug_tuple("File").field(file).finish(),
            FieldValueInner::Stream { path, .. } => f.debug_struct("Stream").field("path", path).finish(),
            FieldValueInner::Request(request) => f.debug_struct("Request").field("path", &request.path()).finish(),
            FieldValueInner::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

impl<'a> FieldValue<'a> {
    /// 空值，作为字段时会被转换为 `"0"`
    #[inline]
    pub fn null() -> Self {
        Self(FieldValueInner::Null)
    }

    /// 文本
    #[inline]
    pub fn text(value: impl Into<Cow<'a, str>>) -> Self {
        Self(FieldValueInner::Text(value.into()))
    }

    /// 内存数据
    #[inline]
    pub fn bytes(value: impl Into<Bytes>) -> Self {
        Self(FieldValueInner::Bytes(value.into()))
    }

    /// 有序序列，追加时每个元素都会成为一个独立的表单组件
    #[inline]
    pub fn sequence<V: Into<FieldValue<'a>>>(values: impl IntoIterator<Item = V>) -> Self {
        Self(FieldValueInner::Sequence(values.into_iter().map(Into::into).collect()))
    }

    /// 数据流
    #[inline]
    pub fn stream(stream: impl Stream<Item = IoResult<Bytes>> + Send + 'a) -> Self {
        Self(FieldValueInner::Stream {
            stream: Box::pin(stream),
            path: None,
        })
    }

    /// 带有路径的数据流，路径的文件名部分将作为表单组件的默认文件名
    #[inline]
    pub fn stream_with_path(
        stream: impl Stream<Item = IoResult<Bytes>> + Send + 'a,
        path: impl Into<Cow<'a, str>>,
    ) -> Self {
        Self(FieldValueInner::Stream {
            stream: Box::pin(stream),
            path: Some(path.into()),
        })
    }

    /// 异步输入流
    #[inline]
    pub fn reader(reader: impl AsyncRead + Send + Unpin + 'a) -> Self {
        Self::stream(ReaderStream::new(reader))
    }

    /// 打开本地文件作为数据流
    pub async fn file_path<S: AsRef<OsStr> + ?Sized>(path: &S) -> IoResult<FieldValue<'a>> {
        let path = Path::new(path);
        let file = async_fs::File::open(path).await?;
        Ok(Self::stream_with_path(
            ReaderStream::new(file),
            path.to_string_lossy().into_owned(),
        ))
    }

    /// 尚未发送的 HTTP 请求，在轮到该组件时发送，并以响应体作为数据
    #[inline]
    pub fn request(request: impl InFlightRequest + 'static) -> Self {
        Self(FieldValueInner::Request(Box::new(request)))
    }

    /// 异步解析的数据，作为普通字段处理
    #[inline]
    pub fn deferred(future: impl Future<Output = MultipartResult<Segment<'a>>> + Send + 'a) -> Self {
        Self(FieldValueInner::Deferred(Box::pin(future)))
    }

    /// 获取字段值的类型
    pub fn kind(&self) -> ValueKind {
        match &self.0 {
            FieldValueInner::Null => ValueKind::Null,
            FieldValueInner::Bool(_) => ValueKind::Bool,
            FieldValueInner::Number(_) => ValueKind::Number,
            FieldValueInner::Text(_) => ValueKind::Text,
            FieldValueInner::Bytes(_) => ValueKind::Bytes,
            FieldValueInner::Sequence(_) => ValueKind::Sequence,
            FieldValueInner::Object(_) => ValueKind::Object,
            FieldValueInner::File(_) => ValueKind::File,
            FieldValueInner::Stream { .. } => ValueKind::Stream,
            FieldValueInner::Request(_) => ValueKind::Request,
            FieldValueInner::Deferred(_) => ValueKind::Deferred,
        }
    }

    /// 是否为文本
    #[inline]
    pub fn is_text(&self) -> bool {
        self.kind() == ValueKind::Text
    }

    /// 是否为数字
    #[inline]
    pub fn is_number(&self) -> bool {
        self.kind() == ValueKind::Number
    }

    /// 是否为结构化对象
    #[inline]
    pub fn is_plain_object(&self) -> bool {
        self.kind() == ValueKind::Object
    }

    /// 是否为内存数据
    #[inline]
    pub fn is_bytes(&self) -> bool {
        self.kind() == ValueKind::Bytes
    }

    /// 是否为有序序列
    #[inline]
    pub fn is_sequence(&self) -> bool {
        self.kind() == ValueKind::Sequence
    }

    /// 是否为文件包装
    #[inline]
    pub fn is_file_wrapper(&self) -> bool {
        self.kind() == ValueKind::File
    }

    /// 是否为数据流
    #[inline]
    pub fn is_stream(&self) -> bool {
        self.kind() == ValueKind::Stream
    }

    /// 是否为尚未发送的 HTTP 请求
    #[inline]
    pub fn is_http_request(&self) -> bool {
        self.kind() == ValueKind::Request
    }

    /// 是否为异步解析的数据
    #[inline]
    pub fn is_deferred(&self) -> bool {
        self.kind() == ValueKind::Deferred
    }

    /// 是否作为文件上传，即是否需要 `filename` 与 `Content-Type`
    #[inline]
    pub fn is_file_like(&self) -> bool {
        matches!(
            self.kind(),
            ValueKind::Bytes | ValueKind::Stream | ValueKind::Request | ValueKind::File
        )
    }

    pub(crate) fn into_inner(self) -> FieldValueInner<'a> {
        self.0
    }

    pub(crate) fn from_inner(inner: FieldValueInner<'a>) -> Self {
        Self(inner)
    }
}

impl<'a> From<&'a str> for FieldValue<'a> {
    #[inline]
    fn from(value: &'a str) -> Self {
        Self::text(value)
    }
}

impl From<String> for FieldValue<'_> {
    #[inline]
    fn from(value: String) -> Self {
        Self::text(value)
    }
}

impl<'a> From<Cow<'a, str>> for FieldValue<'a> {
    #[inline]
    fn from(value: Cow<'a, str>) -> Self {
        Self::text(value)
    }
}

impl From<bool> for FieldValue<'_> {
    #[inline]
    fn from(value: bool) -> Self {
        Self(FieldValueInner::Bool(value))
    }
}

impl From<()> for FieldValue<'_> {
    #[inline]
    fn from(_: ()) -> Self {
        Self::null()
    }
}

impl<'a, T: Into<FieldValue<'a>>> From<Option<T>> for FieldValue<'a> {
    #[inline]
    fn from(value: Option<T>) -> Self {
        value.map_or_else(Self::null, Into::into)
    }
}

macro_rules! impl_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FieldValue<'_> {
                #[inline]
                fn from(value: $ty) -> Self {
                    Self(FieldValueInner::Number(value.to_string()))
                }
            }
        )*
    };
}
impl_from_number!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

impl From<Bytes> for FieldValue<'_> {
    #[inline]
    fn from(value: Bytes) -> Self {
        Self::bytes(value)
    }
}

impl From<Vec<u8>> for FieldValue<'_> {
    #[inline]
    fn from(value: Vec<u8>) -> Self {
        Self::bytes(value)
    }
}

impl From<&[u8]> for FieldValue<'_> {
    #[inline]
    fn from(value: &[u8]) -> Self {
        Self::bytes(Bytes::copy_from_slice(value))
    }
}

impl<'a> From<Vec<FieldValue<'a>>> for FieldValue<'a> {
    #[inline]
    fn from(values: Vec<FieldValue<'a>>) -> Self {
        Self(FieldValueInner::Sequence(values))
    }
}

impl<'a> From<FileWrapper<'a>> for FieldValue<'a> {
    #[inline]
    fn from(file: FileWrapper<'a>) -> Self {
        Self(FieldValueInner::File(file))
    }
}

impl From<Value> for FieldValue<'_> {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::null(),
            Value::Bool(b) => b.into(),
            Value::Number(n) => Self(FieldValueInner::Number(n.to_string())),
            Value::String(s) => s.into(),
            Value::Array(values) => Self::sequence(values),
            Value::Object(object) => Self(FieldValueInner::Object(object)),
        }
    }
}

/// 文件包装
///
/// 携带虚拟路径与文件内容，无需真实的文件句柄即可提供文件元信息
pub struct FileWrapper<'a> {
    path: PathBuf,
    contents: FileContents<'a>,
}

pub(crate) enum FileContents<'a> {
    Bytes(Bytes),
    Stream(PartStream<'a>),
}

impl Debug for FileWrapper<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let contents = match &self.contents {
            FileContents::Bytes(bytes) => format!("Bytes({})", bytes.len()),
            FileContents::Stream(_) => "Stream".to_owned(),
        };
        f.debug_struct("FileWrapper")
            .field("path", &self.path)
            .field("contents", &contents)
            .finish()
    }
}

impl<'a> FileWrapper<'a> {
    /// 使用内存数据创建文件包装
    #[inline]
    pub fn bytes(path: impl Into<PathBuf>, contents: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            contents: FileContents::Bytes(contents.into()),
        }
    }

    /// 使用数据流创建文件包装
    #[inline]
    pub fn stream(path: impl Into<PathBuf>, contents: impl Stream<Item = IoResult<Bytes>> + Send + 'a) -> Self {
        Self {
            path: path.into(),
            contents: FileContents::Stream(Box::pin(contents)),
        }
    }

    /// 获取虚拟路径
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 获取路径中的文件名部分
    #[inline]
    pub fn basename(&self) -> Option<Cow<'_, str>> {
        self.path.file_name().map(|name| name.to_string_lossy())
    }

    pub(crate) fn into_parts(self) -> (PathBuf, FileContents<'a>) {
        (self.path, self.contents)
    }
}

/// 将异步输入流转换为数据流
pub(crate) struct ReaderStream<R> {
    reader: Option<R>,
    buffer: Box<[u8]>,
}

impl<R> ReaderStream<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            buffer: vec![0u8; READ_BUFFER_SIZE].into_boxed_slice(),
        }
    }
}

impl<R: AsyncRead + Unpin> Stream for ReaderStream<R> {
    type Item = IoResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let reader = match this.reader.as_mut() {
            Some(reader) => reader,
            None => return Poll::Ready(None),
        };
        match ready!(Pin::new(reader).poll_read(cx, &mut this.buffer)) {
            Ok(0) => {
                this.reader = None;
                Poll::Ready(None)
            }
            Ok(n) => Poll::Ready(Some(Ok(Bytes::copy_from_slice(&this.buffer[..n])))),
            Err(err) if err.kind() == IoErrorKind::Interrupted => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            Err(err) => {
                this.reader = None;
                Poll::Ready(Some(Err(err)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{io::Cursor, stream, TryStreamExt};
    use serde_json::json;

    #[test]
    fn test_classify_values() {
        env_logger::builder().is_test(true).try_init().ok();

        assert!(FieldValue::from("text").is_text());
        assert!(FieldValue::from(12345).is_number());
        assert!(FieldValue::from(1.5f64).is_number());
        assert!(FieldValue::from(b"bytes".as_slice()).is_bytes());
        assert!(FieldValue::from(vec![FieldValue::from("a")]).is_sequence());
        assert!(FieldValue::from(json!({"a": "b"})).is_plain_object());
        assert!(FieldValue::from(FileWrapper::bytes("anon.jpg", b"data".as_slice())).is_file_wrapper());
        assert!(FieldValue::stream(stream::empty()).is_stream());
        assert!(FieldValue::deferred(async { Ok(Segment::chunk("later")) }).is_deferred());
        assert_eq!(FieldValue::from(None::<&str>).kind(), ValueKind::Null);
        assert_eq!(FieldValue::from(Some("x")).kind(), ValueKind::Text);
        assert_eq!(FieldValue::from(true).kind(), ValueKind::Bool);
    }

    #[test]
    fn test_file_like_values() {
        env_logger::builder().is_test(true).try_init().ok();

        assert!(FieldValue::bytes(b"bytes".as_slice()).is_file_like());
        assert!(FieldValue::stream(stream::empty()).is_file_like());
        assert!(FieldValue::from(FileWrapper::bytes("a.txt", "x")).is_file_like());
        assert!(!FieldValue::text("text").is_file_like());
        assert!(!FieldValue::from(12).is_file_like());
        assert!(!FieldValue::deferred(async { Ok(Segment::chunk("")) }).is_file_like());
    }

    #[test]
    fn test_json_values() {
        env_logger::builder().is_test(true).try_init().ok();

        match FieldValue::from(json!(["a", 1, null, [true]])).into_inner() {
            FieldValueInner::Sequence(values) => {
                let kinds = values.iter().map(FieldValue::kind).collect::<Vec<_>>();
                assert_eq!(
                    kinds,
                    vec![ValueKind::Text, ValueKind::Number, ValueKind::Null, ValueKind::Sequence]
                );
            }
            other => panic!("unexpected value: {:?}", FieldValue::from_inner(other)),
        }
    }

    #[test]
    fn test_file_wrapper_basename() {
        env_logger::builder().is_test(true).try_init().ok();

        let file = FileWrapper::bytes("photos/anon.jpg", b"data".as_slice());
        assert_eq!(file.basename().as_deref(), Some("anon.jpg"));
        assert_eq!(file.path(), Path::new("photos/anon.jpg"));
    }

    #[tokio::test]
    async fn test_reader_stream() -> IoResult<()> {
        env_logger::builder().is_test(true).try_init().ok();

        let data = vec![7u8; READ_BUFFER_SIZE + 10];
        let chunks = ReaderStream::new(Cursor::new(data.to_owned()))
            .try_collect::<Vec<_>>()
            .await?;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks.concat(), data);
        Ok(())
    }
}
