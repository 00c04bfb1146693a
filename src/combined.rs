use super::{
    error::{MultipartError, MultipartResult},
    request::InFlightRequest,
    value::PartStream,
};
use bytes::Bytes;
use futures::{
    future::{BoxFuture, Future},
    stream::{FusedStream, Stream},
    task::AtomicWaker,
    TryStreamExt,
};
use log::{debug, info, warn};
use std::{
    collections::VecDeque,
    fmt::{self, Debug},
    io::Error as IoError,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    task::{Context, Poll},
};

/// 异步解析的数据段
pub type DeferredSegment<'a> = BoxFuture<'a, MultipartResult<Segment<'a>>>;

/// 合并数据流中的数据段
pub enum Segment<'a> {
    /// 内存数据，直接输出
    Chunk(Bytes),
    /// 数据流，读取至结束后才会处理下一个数据段
    Stream(PartStream<'a>),
    /// 异步解析的数据段，解析完成后再处理
    Deferred(DeferredSegment<'a>),
    /// 尚未发送的 HTTP 请求，收到响应后以响应体作为数据流
    Request(Box<dyn InFlightRequest>),
}

impl Debug for Segment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chunk(chunk) => f.debug_tuple("Chunk").field(&chunk.len()).finish(),
            Self::Stream(_) => f.write_str("Stream"),
            Self::Deferred(_) => f.write_str("Deferred"),
            Self::Request(request) => f.debug_struct("Request").field("path", &request.path()).finish(),
        }
    }
}

impl<'a> Segment<'a> {
    /// 创建内存数据段
    #[inline]
    pub fn chunk(chunk: impl Into<Bytes>) -> Self {
        Self::Chunk(chunk.into())
    }

    /// 创建数据流数据段
    #[inline]
    pub fn stream(stream: impl Stream<Item = std::io::Result<Bytes>> + Send + 'a) -> Self {
        Self::Stream(Box::pin(stream))
    }

    /// 创建异步解析的数据段
    #[inline]
    pub fn deferred(future: impl Future<Output = MultipartResult<Segment<'a>>> + Send + 'a) -> Self {
        Self::Deferred(Box::pin(future))
    }

    /// 创建 HTTP 请求数据段
    #[inline]
    pub fn request(request: impl InFlightRequest + 'static) -> Self {
        Self::Request(Box::new(request))
    }
}

enum Current<'a> {
    Stream(PartStream<'a>),
    Resolving(DeferredSegment<'a>),
}

/// 合并数据流
///
/// 按顺序依次读取各个数据段，仅当下游拉取数据时才从当前数据段读取，
/// 当前数据段结束后才会开始处理下一个数据段，因此任一时刻最多只有一个数据段处于活跃状态。
///
/// 任一数据段返回错误时，整个数据流将被销毁：当前数据段与所有排队中的数据段都会被释放，
/// 错误作为最后一项输出，随后数据流结束。
pub struct CombinedStream<'a> {
    current: Option<Current<'a>>,
    queue: VecDeque<Segment<'a>>,
    destroyed: bool,
    completed: bool,
    failure: Option<MultipartError>,
    signal: DestroyHandle,
    forwarded: u64,
}

impl Debug for CombinedStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombinedStream")
            .field("has_current", &self.current.is_some())
            .field("queued", &self.queue.len())
            .field("destroyed", &self.destroyed)
            .field("completed", &self.completed)
            .field("forwarded", &self.forwarded)
            .finish()
    }
}

impl<'a> CombinedStream<'a> {
    /// 创建合并数据流
    pub fn new(segments: impl IntoIterator<Item = Segment<'a>>) -> Self {
        Self {
            current: None,
            queue: segments.into_iter().collect(),
            destroyed: false,
            completed: false,
            failure: None,
            signal: Default::default(),
            forwarded: 0,
        }
    }

    /// 追加数据段
    ///
    /// 数据流已被销毁或已经结束时，数据段将被直接释放
    pub fn append(&mut self, segment: Segment<'a>) -> &mut Self {
        if self.destroyed {
            warn!("CombinedStream is already destroyed, {:?} is released", segment);
        } else {
            self.queue.push_back(segment);
        }
        self
    }

    /// 获取销毁句柄
    ///
    /// 即使数据流已被传输层持有，也可以通过句柄将其销毁
    #[inline]
    pub fn destroy_handle(&self) -> DestroyHandle {
        self.signal.to_owned()
    }

    /// 销毁数据流
    ///
    /// 释放当前数据段与所有排队中的数据段，之后数据流不再输出任何数据。重复调用不会产生任何效果。
    #[inline]
    pub fn destroy(&mut self) {
        self.teardown(None)
    }

    /// 以错误销毁数据流，错误将作为数据流的最后一项输出
    #[inline]
    pub fn destroy_with_error(&mut self, err: MultipartError) {
        self.teardown(Some(err))
    }

    /// 数据流是否已被销毁（包括正常结束）
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// 所有数据段是否都已输出完毕
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// 已输出的字节数
    #[inline]
    pub fn forwarded_bytes(&self) -> u64 {
        self.forwarded
    }

    /// 转换为异步输入流
    pub fn into_async_read(self) -> impl futures::io::AsyncRead + Send + Unpin + 'a {
        TryStreamExt::into_async_read(TryStreamExt::map_err(self, IoError::from))
    }

    fn teardown(&mut self, err: Option<MultipartError>) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.signal.mark_destroyed();

        let released = self.queue.len() + usize::from(self.current.is_some());
        self.current = None;
        self.queue.clear();

        match err {
            Some(err) => {
                warn!(
                    "CombinedStream is destroyed by error after {} bytes, {} segments are released: {}",
                    self.forwarded, released, err
                );
                self.failure = Some(err);
            }
            None => debug!(
                "CombinedStream is destroyed after {} bytes, {} segments are released",
                self.forwarded, released
            ),
        }
    }

    fn finish(&mut self) {
        info!("CombinedStream is ended, {} bytes are forwarded", self.forwarded);
        self.completed = true;
        self.destroyed = true;
        self.signal.mark_destroyed();
    }

    fn forward(&mut self, chunk: Bytes) -> Poll<Option<MultipartResult<Bytes>>> {
        self.forwarded += chunk.len() as u64;
        Poll::Ready(Some(Ok(chunk)))
    }

    fn advance(&mut self) -> Option<Bytes> {
        match self.queue.pop_front() {
            None => {
                self.finish();
                None
            }
            Some(Segment::Chunk(chunk)) => Some(chunk),
            Some(Segment::Stream(stream)) => {
                self.current = Some(Current::Stream(stream));
                None
            }
            Some(Segment::Deferred(future)) => {
                self.current = Some(Current::Resolving(future));
                None
            }
            Some(Segment::Request(request)) => {
                self.current = Some(Current::Resolving(send_request(request)));
                None
            }
        }
    }
}

fn send_request<'a>(request: Box<dyn InFlightRequest>) -> DeferredSegment<'a> {
    Box::pin(async move {
        let path = request.path().map(|path| path.into_owned());
        let stream = request.send().await?;
        debug!("Response for request {:?} arrived", path);
        Ok(Segment::Stream(stream))
    })
}

impl Stream for CombinedStream<'_> {
    type Item = MultipartResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.signal.0.waker.register(cx.waker());
        loop {
            if let Some(err) = this.failure.take() {
                return Poll::Ready(Some(Err(err)));
            }
            if this.destroyed {
                return Poll::Ready(None);
            }
            if this.signal.is_destroyed() {
                let err = this.signal.take_error();
                this.teardown(err);
                continue;
            }
            match this.current.take() {
                Some(Current::Stream(mut stream)) => match stream.as_mut().poll_next(cx) {
                    Poll::Pending => {
                        this.current = Some(Current::Stream(stream));
                        return Poll::Pending;
                    }
                    Poll::Ready(Some(Ok(chunk))) => {
                        this.current = Some(Current::Stream(stream));
                        if !chunk.is_empty() {
                            return this.forward(chunk);
                        }
                    }
                    Poll::Ready(Some(Err(err))) => {
                        drop(stream);
                        this.teardown(Some(MultipartError::from_upstream(err)));
                    }
                    Poll::Ready(None) => {
                        debug!("Segment is ended, {} segments remain", this.queue.len());
                    }
                },
                Some(Current::Resolving(mut future)) => match future.as_mut().poll(cx) {
                    Poll::Pending => {
                        this.current = Some(Current::Resolving(future));
                        return Poll::Pending;
                    }
                    Poll::Ready(Ok(segment)) => {
                        debug!("Deferred segment is resolved as {:?}", segment);
                        this.queue.push_front(segment);
                    }
                    Poll::Ready(Err(err)) => this.teardown(Some(err)),
                },
                None => {
                    if let Some(chunk) = this.advance() {
                        if !chunk.is_empty() {
                            return this.forward(chunk);
                        }
                    }
                }
            }
        }
    }
}

impl FusedStream for CombinedStream<'_> {
    #[inline]
    fn is_terminated(&self) -> bool {
        self.destroyed && self.failure.is_none()
    }
}

/// 合并数据流的销毁句柄
#[derive(Clone, Default)]
pub struct DestroyHandle(Arc<DestroySignal>);

#[derive(Default)]
struct DestroySignal {
    destroyed: AtomicBool,
    error: Mutex<Option<MultipartError>>,
    waker: AtomicWaker,
}

impl Debug for DestroyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestroyHandle")
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl DestroyHandle {
    /// 销毁数据流，重复调用不会产生任何效果
    #[inline]
    pub fn destroy(&self) {
        self.signal(None)
    }

    /// 以错误销毁数据流，错误将作为数据流的最后一项输出
    #[inline]
    pub fn destroy_with_error(&self, err: MultipartError) {
        self.signal(Some(err))
    }

    /// 数据流是否已被销毁（包括正常结束）
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.load(Ordering::Acquire)
    }

    fn signal(&self, err: Option<MultipartError>) {
        {
            let mut error = self.0.error.lock().unwrap_or_else(PoisonError::into_inner);
            if self.is_destroyed() {
                return;
            }
            *error = err;
            self.0.destroyed.store(true, Ordering::Release);
        }
        self.0.waker.wake();
    }

    fn mark_destroyed(&self) {
        self.0.destroyed.store(true, Ordering::Release);
    }

    fn take_error(&self) -> Option<MultipartError> {
        self.0.error.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}
