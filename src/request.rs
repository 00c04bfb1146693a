use super::{error::MultipartResult, value::PartStream};
use futures::future::BoxFuture;
use std::borrow::Cow;

/// 尚未发送的 HTTP 请求
///
/// 作为表单组件的值时，请求在轮到该组件时才会被发送，收到响应后以响应体作为组件数据，响应体长度未知。
/// 发送失败时应返回 [`crate::MultipartError::Connection`]，读取响应体失败时则由数据流返回 IO 错误。
pub trait InFlightRequest: Send {
    /// 请求路径，其文件名部分将作为表单组件的默认文件名
    #[inline]
    fn path(&self) -> Option<Cow<'_, str>> {
        None
    }

    /// 发送请求并等待响应
    fn send(self: Box<Self>) -> BoxFuture<'static, MultipartResult<PartStream<'static>>>;
}

#[cfg(feature = "reqwest")]
mod reqwest_request {
    use super::*;
    use crate::{error::MultipartError, value::FieldValue};
    use futures::TryStreamExt;
    use log::debug;
    use reqwest::{Client, Request, RequestBuilder, Result as ReqwestResult};
    use std::io::{Error as IoError, ErrorKind as IoErrorKind};

    /// 基于 Reqwest 的 HTTP 请求
    #[cfg_attr(feature = "docs", doc(cfg(feature = "reqwest")))]
    #[derive(Debug)]
    pub struct ReqwestRequest {
        client: Client,
        request: ReqwestResult<Request>,
    }

    impl ReqwestRequest {
        /// 使用 Reqwest 客户端与请求创建
        #[inline]
        pub fn new(client: Client, request: Request) -> Self {
            Self {
                client,
                request: Ok(request),
            }
        }
    }

    impl From<RequestBuilder> for ReqwestRequest {
        #[inline]
        fn from(builder: RequestBuilder) -> Self {
            let (client, request) = builder.build_split();
            Self { client, request }
        }
    }

    impl InFlightRequest for ReqwestRequest {
        #[inline]
        fn path(&self) -> Option<Cow<'_, str>> {
            self.request
                .as_ref()
                .ok()
                .map(|request| Cow::Borrowed(request.url().path()))
        }

        fn send(self: Box<Self>) -> BoxFuture<'static, MultipartResult<PartStream<'static>>> {
            let Self { client, request } = *self;
            Box::pin(async move {
                let request = request.map_err(|err| MultipartError::Connection(Box::new(err)))?;
                let url = request.url().to_owned();
                let response = client
                    .execute(request)
                    .await
                    .map_err(|err| MultipartError::Connection(Box::new(err)))?;
                debug!("Got response {} from {}", response.status(), url);
                let stream: PartStream<'static> = Box::pin(
                    response
                        .bytes_stream()
                        .map_err(|err| IoError::new(IoErrorKind::Other, err)),
                );
                Ok(stream)
            })
        }
    }

    impl From<ReqwestRequest> for FieldValue<'_> {
        #[inline]
        fn from(request: ReqwestRequest) -> Self {
            Self::request(request)
        }
    }

    impl From<RequestBuilder> for FieldValue<'_> {
        #[inline]
        fn from(builder: RequestBuilder) -> Self {
            Self::request(ReqwestRequest::from(builder))
        }
    }

    impl InFlightRequest for RequestBuilder {
        /// 仅当请求可以被复制时才能获取路径，例如请求体为数据流时将无法获取
        fn path(&self) -> Option<Cow<'_, str>> {
            self.try_clone()
                .and_then(|builder| builder.build().ok())
                .map(|request| Cow::Owned(request.url().path().to_owned()))
        }

        fn send(self: Box<Self>) -> BoxFuture<'static, MultipartResult<PartStream<'static>>> {
            Box::new(ReqwestRequest::from(*self)).send()
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_request::ReqwestRequest;
