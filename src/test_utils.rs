use super::{
    error::{MultipartError, MultipartResult},
    request::InFlightRequest,
    value::PartStream,
};
use bytes::Bytes;
use futures::{future::BoxFuture, stream};
use std::{
    borrow::Cow,
    io::{Error as IoError, ErrorKind as IoErrorKind},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// 不经过网络的 HTTP 请求，用于测试
#[derive(Debug)]
pub(crate) struct FakeRequest {
    path: String,
    chunks: Option<Vec<Bytes>>,
    sent: Option<Arc<AtomicBool>>,
}

impl FakeRequest {
    pub(crate) fn new(path: &str, chunks: &[&'static str]) -> Self {
        Self {
            path: path.to_owned(),
            chunks: Some(chunks.iter().map(|chunk| Bytes::from_static(chunk.as_bytes())).collect()),
            sent: None,
        }
    }

    pub(crate) fn failing(path: &str) -> Self {
        Self {
            path: path.to_owned(),
            chunks: None,
            sent: None,
        }
    }

    pub(crate) fn on_send(mut self, sent: Arc<AtomicBool>) -> Self {
        self.sent = Some(sent);
        self
    }
}

impl InFlightRequest for FakeRequest {
    fn path(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(&self.path))
    }

    fn send(self: Box<Self>) -> BoxFuture<'static, MultipartResult<PartStream<'static>>> {
        Box::pin(async move {
            if let Some(sent) = &self.sent {
                sent.store(true, Ordering::SeqCst);
            }
            match self.chunks {
                Some(chunks) => {
                    let stream: PartStream<'static> = Box::pin(stream::iter(chunks.into_iter().map(Ok)));
                    Ok(stream)
                }
                None => Err(MultipartError::Connection(Box::new(IoError::new(
                    IoErrorKind::ConnectionRefused,
                    format!("failed to connect for {}", self.path),
                )))),
            }
        })
    }
}
