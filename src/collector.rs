use super::{
    combined::{CombinedStream, Segment},
    error::{MultipartError, MultipartResult},
    value::PartStream,
};
use bytes::{Bytes, BytesMut};
use futures::{future, StreamExt, TryStreamExt};
use log::{debug, warn};

/// 完整读取合并数据流
///
/// 数据流已被部分读取、被提前销毁或返回错误时都将返回错误，不会返回不完整的数据
pub(crate) async fn collect(mut stream: CombinedStream<'_>) -> MultipartResult<Bytes> {
    // 被销毁的数据流交由下方返回存储的错误或 `Destroyed`
    if stream.forwarded_bytes() > 0 && (stream.is_completed() || !stream.is_destroyed()) {
        warn!(
            "Multipart stream was partially consumed, {} bytes are already forwarded",
            stream.forwarded_bytes()
        );
        return Err(MultipartError::PartiallyConsumed(stream.forwarded_bytes()));
    }
    let mut body = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => body.extend_from_slice(&chunk),
            Err(err) => {
                warn!("Failed to collect multipart stream after {} bytes: {}", body.len(), err);
                return Err(err);
            }
        }
    }
    if !stream.is_completed() {
        warn!("Multipart stream was destroyed after {} bytes", body.len());
        return Err(MultipartError::Destroyed);
    }
    debug!("Collected {} bytes from multipart stream", body.len());
    Ok(body.freeze())
}

/// 读取数据段的全部数据
///
/// 异步解析的数据段将被逐层解析，HTTP 请求将被发送并读取响应体
pub(crate) async fn drain_segment(segment: Segment<'_>) -> MultipartResult<Bytes> {
    let mut segment = segment;
    loop {
        segment = match segment {
            Segment::Chunk(chunk) => return Ok(chunk),
            Segment::Stream(stream) => return drain_stream(stream).await,
            Segment::Deferred(future) => future.await?,
            Segment::Request(request) => Segment::Stream(request.send().await?),
        };
    }
}

async fn drain_stream(stream: PartStream<'_>) -> MultipartResult<Bytes> {
    stream
        .map_err(MultipartError::from_upstream)
        .try_fold(BytesMut::new(), |mut buf, chunk| {
            buf.extend_from_slice(&chunk);
            future::ready(Ok(buf))
        })
        .await
        .map(BytesMut::freeze)
}
