#![cfg_attr(feature = "docs", feature(doc_cfg))]
#![deny(
    missing_debug_implementations,
    absolute_paths_not_starting_with_crate,
    anonymous_parameters,
    explicit_outlives_requirements,
    keyword_idents,
    macro_use_extern_crate,
    meta_variable_misuse,
    missing_docs,
    non_ascii_idents,
    trivial_numeric_casts,
    unsafe_code,
    unused_extern_crates,
    unused_import_braces,
    unused_lifetimes
)]

//! # multi-part
//!
//! ## Multipart 表单请求体构建库
//!
//! 按顺序追加表单字段，字段值可以是文本、数字、内存数据、数据流、本地文件、尚未发送的 HTTP 请求或异步解析的数据，
//! 最终组装为 `multipart/form-data` 请求体。
//!
//! 请求体有两种组装方式，两者输出的字节完全一致：
//!
//! - [`Multipart::into_stream`]：惰性的请求体数据流，各组件按顺序依次读取，任一时刻最多只有一个组件处于活跃状态，
//!   HTTP 请求在轮到该组件时才会被发送。
//! - [`Multipart::buffer`]：依次读取所有组件，组装为完整的请求体。
//!
//! ### 代码示例
//!
//! ```
//! use multi_part::{FieldValue, Multipart, PartMetadata};
//! use futures::StreamExt;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut multipart = Multipart::new();
//! multipart
//!     .append("field", 12345)?
//!     .append_with(
//!         "photo",
//!         FieldValue::bytes(b"\xFF\xD8\xFF\xE0".as_slice()),
//!         PartMetadata::default().file_name("a.jpg"),
//!     )?;
//! let mut stream = multipart.into_stream();
//! while let Some(chunk) = stream.next().await {
//!     let chunk = chunk?;
//!     // 将数据块写入 HTTP 请求体
//! #   let _ = chunk;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## 功能描述
//!
//! ### `reqwest`
//!
//! 默认启用，允许将 `reqwest::RequestBuilder` 作为字段值，响应体将作为文件组件的数据。
//!
//! ### `docs`
//!
//! 用于生成文档。

mod assembler;
mod body;
mod boundary;
mod collector;
mod combined;
mod error;
mod mime_kind;
mod multipart;
mod request;
mod smallstr;
mod value;

#[cfg(test)]
mod test_utils;

pub use bytes;
pub use http;
pub use mime;

#[cfg(feature = "reqwest")]
pub use reqwest;

pub use body::{MultipartBuffer, MultipartStream};
pub use boundary::{Boundary, BoundaryGenerator, FixedBoundary, RandomBoundary, DEFAULT_BOUNDARY_PREFIX};
pub use combined::{CombinedStream, DeferredSegment, DestroyHandle, Segment};
pub use error::{MultipartError, MultipartResult};
pub use mime_kind::{DefaultMimeDetector, FileDefaults, MimeDetector, MimeKind};
pub use multipart::{FieldName, FileName, Multipart, MultipartBuilder, PartMetadata};
pub use request::InFlightRequest;
pub use value::{FieldValue, FileWrapper, PartStream, ValueKind};

#[cfg(feature = "reqwest")]
pub use request::ReqwestRequest;
