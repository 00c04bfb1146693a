use super::{
    boundary::Boundary,
    collector,
    combined::{CombinedStream, DestroyHandle},
    error::MultipartResult,
};
use assert_impl::assert_impl;
use bytes::Bytes;
use futures::{
    io::AsyncRead,
    stream::{FusedStream, Stream},
};
use http::{
    header::{CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING},
    HeaderMap, HeaderValue,
};
use std::{
    pin::Pin,
    task::{Context, Poll},
};

/// Multipart 请求体数据流
///
/// 实现 [`Stream`]，下游每次拉取时才会从当前组件读取数据，长度未知，因此总是使用分块传输
#[derive(Debug)]
pub struct MultipartStream<'a> {
    boundary: Boundary,
    headers: HeaderMap,
    content_type: HeaderValue,
    chunked: bool,
    body: CombinedStream<'a>,
}

impl<'a> MultipartStream<'a> {
    pub(crate) fn new(boundary: Boundary, content_type: HeaderValue, chunked: bool, body: CombinedStream<'a>) -> Self {
        let mut headers = HeaderMap::with_capacity(2);
        headers.insert(CONTENT_TYPE, content_type.to_owned());
        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        Self {
            boundary,
            headers,
            content_type,
            chunked,
            body,
        }
    }

    /// 获取分隔符
    #[inline]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// 获取请求体的 HTTP 头
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// 获取请求体数据流
    #[inline]
    pub fn body(&self) -> &CombinedStream<'a> {
        &self.body
    }

    /// 获取请求体数据流的可变引用
    #[inline]
    pub fn body_mut(&mut self) -> &mut CombinedStream<'a> {
        &mut self.body
    }

    /// 转换为请求体数据流
    #[inline]
    pub fn into_body(self) -> CombinedStream<'a> {
        self.body
    }

    /// 转换为 HTTP 头与请求体数据流
    #[inline]
    pub fn into_parts(self) -> (HeaderMap, CombinedStream<'a>) {
        (self.headers, self.body)
    }

    /// 获取销毁句柄
    #[inline]
    pub fn destroy_handle(&self) -> DestroyHandle {
        self.body.destroy_handle()
    }

    /// 销毁请求体数据流
    #[inline]
    pub fn destroy(&mut self) {
        self.body.destroy()
    }

    /// 转换为异步输入流
    #[inline]
    pub fn into_async_read(self) -> impl AsyncRead + Send + Unpin + 'a {
        self.body.into_async_read()
    }

    /// 读取全部数据
    ///
    /// 数据流已被部分读取、返回错误或被销毁时都将返回错误
    pub async fn buffer(self) -> MultipartResult<MultipartBuffer> {
        let Self {
            boundary,
            content_type,
            chunked,
            body,
            ..
        } = self;
        let body = collector::collect(body).await?;
        Ok(MultipartBuffer::new(boundary, content_type, chunked, body))
    }
}

impl Stream for MultipartStream<'_> {
    type Item = MultipartResult<Bytes>;

    #[inline]
    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().body).poll_next(cx)
    }
}

impl FusedStream for MultipartStream<'_> {
    #[inline]
    fn is_terminated(&self) -> bool {
        self.body.is_terminated()
    }
}

impl MultipartStream<'static> {
    #[allow(dead_code)]
    fn ignore() {
        assert_impl!(Send: Self);
    }
}

/// 完整的 Multipart 请求体
///
/// 未禁用分块传输时使用 `Transfer-Encoding: chunked`，否则使用 `Content-Length`
#[derive(Debug, Clone)]
pub struct MultipartBuffer {
    boundary: Boundary,
    headers: HeaderMap,
    body: Bytes,
}

impl MultipartBuffer {
    pub(crate) fn new(boundary: Boundary, content_type: HeaderValue, chunked: bool, body: Bytes) -> Self {
        let mut headers = HeaderMap::with_capacity(2);
        headers.insert(CONTENT_TYPE, content_type);
        if chunked {
            headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        } else {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len() as u64));
        }
        Self {
            boundary,
            headers,
            body,
        }
    }

    /// 获取分隔符
    #[inline]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// 获取请求体的 HTTP 头
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// 获取请求体
    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// 转换为请求体
    #[inline]
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// 转换为 HTTP 头与请求体
    #[inline]
    pub fn into_parts(self) -> (HeaderMap, Bytes) {
        (self.headers, self.body)
    }

    /// 获取请求体长度
    #[inline]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// 请求体是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combined::Segment;
    use futures::StreamExt;

    const CONTENT_TYPE_VALUE: &str = "multipart/form-data; boundary=\"--b\"";

    #[tokio::test]
    async fn test_stream_headers_and_collect() -> anyhow::Result<()> {
        env_logger::builder().is_test(true).try_init().ok();

        let stream = MultipartStream::new(
            Boundary::from("--b"),
            HeaderValue::from_static(CONTENT_TYPE_VALUE),
            false,
            CombinedStream::new(vec![Segment::chunk("ab"), Segment::chunk("cd")]),
        );
        assert_eq!(stream.boundary(), "--b");
        assert_eq!(stream.headers()[CONTENT_TYPE], CONTENT_TYPE_VALUE);
        assert_eq!(stream.headers()[TRANSFER_ENCODING], "chunked");
        assert!(!stream.headers().contains_key(CONTENT_LENGTH));

        let buffer = stream.buffer().await?;
        assert_eq!(buffer.body(), &Bytes::from_static(b"abcd"));
        assert_eq!(buffer.headers()[CONTENT_LENGTH], "4");
        assert!(!buffer.headers().contains_key(TRANSFER_ENCODING));
        Ok(())
    }

    #[tokio::test]
    async fn test_partially_read_stream_cannot_be_collected() -> anyhow::Result<()> {
        env_logger::builder().is_test(true).try_init().ok();

        let mut stream = MultipartStream::new(
            Boundary::from("--b"),
            HeaderValue::from_static(CONTENT_TYPE_VALUE),
            false,
            CombinedStream::new(vec![Segment::chunk("ab"), Segment::chunk("cd")]),
        );
        assert_eq!(stream.next().await.transpose()?, Some(Bytes::from_static(b"ab")));
        assert!(matches!(
            stream.buffer().await,
            Err(crate::MultipartError::PartiallyConsumed(2))
        ));
        Ok(())
    }

    #[test]
    fn test_chunked_buffer_headers() {
        env_logger::builder().is_test(true).try_init().ok();

        let buffer = MultipartBuffer::new(
            Boundary::from("--b"),
            HeaderValue::from_static(CONTENT_TYPE_VALUE),
            true,
            Bytes::from_static(b"body"),
        );
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.headers()[TRANSFER_ENCODING], "chunked");
        assert!(!buffer.headers().contains_key(CONTENT_LENGTH));
        assert_eq!(buffer.into_body(), Bytes::from_static(b"body"));
    }

    #[tokio::test]
    async fn test_destroyed_stream_cannot_be_collected() {
        env_logger::builder().is_test(true).try_init().ok();

        let mut stream = MultipartStream::new(
            Boundary::from("--b"),
            HeaderValue::from_static(CONTENT_TYPE_VALUE),
            true,
            CombinedStream::new(vec![Segment::chunk("ab")]),
        );
        stream.destroy();
        assert!(stream.is_terminated());
        assert!(matches!(
            stream.buffer().await,
            Err(crate::MultipartError::Destroyed)
        ));
    }
}
