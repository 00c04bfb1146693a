use super::{
    boundary::Boundary,
    collector::drain_segment,
    combined::Segment,
    error::{MultipartError, MultipartResult},
    mime_kind::{FileDefaults, MimeDetector},
    multipart::PendingPart,
    value::{FieldValueInner, FileContents, ValueKind},
};
use bytes::{Bytes, BytesMut};
use futures::future;
use log::debug;
use mime::Mime;
use once_cell::sync::Lazy;
use regex::Regex;
use smallvec::SmallVec;
use std::{borrow::Cow, collections::VecDeque, path::Path};

type HeaderBuffer = SmallVec<[u8; 256]>;

const CRLF: &[u8] = b"\r\n";

/// 组装请求体时使用的配置
pub(crate) struct AssemblyContext<'c> {
    boundary: &'c Boundary,
    defaults: &'c FileDefaults,
    detector: &'c dyn MimeDetector,
}

impl<'c> AssemblyContext<'c> {
    pub(crate) fn new(boundary: &'c Boundary, defaults: &'c FileDefaults, detector: &'c dyn MimeDetector) -> Self {
        Self {
            boundary,
            defaults,
            detector,
        }
    }

    fn default_file_name(&self) -> String {
        self.defaults.file_name(self.defaults.get_ext())
    }

    fn sniffed_file_name(&self, bytes: &[u8]) -> String {
        let kind = self.detector.detect_bytes(bytes, self.defaults);
        self.defaults.file_name(kind.extension())
    }

    fn path_file_name(&self, path: Option<&str>) -> String {
        path.and_then(basename)
            .map(|name| name.into_owned())
            .unwrap_or_else(|| self.default_file_name())
    }

    fn content_type(&self, file_name: &str) -> Mime {
        self.detector.detect_name(file_name, self.defaults).mime().to_owned()
    }
}

/// 组件数据
pub(crate) enum Payload<'a> {
    Bytes(Bytes),
    Segment(Segment<'a>),
    Unsupported(ValueKind),
}

/// 已经编码好头部的表单组件
pub(crate) struct PreparedPart<'a> {
    head: Bytes,
    payload: Payload<'a>,
}

/// 编码组件头部并确定组件数据
///
/// 文件类型的组件，文件名依次取自元信息（仅保留文件名部分）、文件包装的路径、数据内容推断、数据流或请求的路径，最后使用默认文件名；
/// MIME 类型依次取自元信息、文件名推断，最后使用默认 MIME 类型。
pub(crate) fn prepare_part<'a>(part: PendingPart<'a>, ctx: &AssemblyContext<'_>) -> PreparedPart<'a> {
    let PendingPart { name, value, metadata } = part;
    let (explicit_file_name, mime) = metadata.into_parts();
    let explicit_file_name = explicit_file_name.map(|file_name| match basename(&file_name) {
        Some(base) => base.into_owned(),
        None => file_name.to_string(),
    });

    let (payload, file_name) = match value.into_inner() {
        FieldValueInner::Text(text) => (Payload::Bytes(text_bytes(text)), None),
        FieldValueInner::Number(number) => (Payload::Bytes(Bytes::from(number)), None),
        FieldValueInner::Null | FieldValueInner::Bool(false) => (Payload::Bytes(Bytes::from_static(b"0")), None),
        FieldValueInner::Bool(true) => (Payload::Bytes(Bytes::from_static(b"1")), None),
        FieldValueInner::Deferred(future) => (Payload::Segment(Segment::Deferred(future)), None),
        FieldValueInner::Sequence(_) => (Payload::Unsupported(ValueKind::Sequence), None),
        FieldValueInner::Object(_) => (Payload::Unsupported(ValueKind::Object), None),
        FieldValueInner::Bytes(bytes) => {
            let file_name = explicit_file_name.unwrap_or_else(|| ctx.sniffed_file_name(&bytes));
            (Payload::Bytes(bytes), Some(file_name))
        }
        FieldValueInner::File(file) => {
            let (path, contents) = file.into_parts();
            let file_name = explicit_file_name.or_else(|| path.to_str().and_then(basename).map(Cow::into_owned));
            match contents {
                FileContents::Bytes(bytes) => {
                    let file_name = file_name.unwrap_or_else(|| ctx.sniffed_file_name(&bytes));
                    (Payload::Bytes(bytes), Some(file_name))
                }
                FileContents::Stream(stream) => {
                    let file_name = file_name.unwrap_or_else(|| ctx.default_file_name());
                    (Payload::Segment(Segment::Stream(stream)), Some(file_name))
                }
            }
        }
        FieldValueInner::Stream { stream, path } => {
            let file_name = explicit_file_name.unwrap_or_else(|| ctx.path_file_name(path.as_deref()));
            (Payload::Segment(Segment::Stream(stream)), Some(file_name))
        }
        FieldValueInner::Request(request) => {
            let file_name = explicit_file_name.unwrap_or_else(|| ctx.path_file_name(request.path().as_deref()));
            (Payload::Segment(Segment::Request(request)), Some(file_name))
        }
    };

    let file = file_name.map(|file_name| {
        let mime = mime.unwrap_or_else(|| ctx.content_type(&file_name));
        (file_name, mime)
    });
    let head = encode_headers(ctx.boundary, &name, file.as_ref().map(|(n, m)| (n.as_str(), m)));
    debug!(
        "Prepared part {} with {} bytes of headers, file: {:?}",
        name,
        head.len(),
        file.as_ref().map(|(file_name, _)| file_name)
    );
    PreparedPart {
        head: Bytes::copy_from_slice(&head),
        payload,
    }
}

pub(crate) fn prepare_parts<'a>(parts: VecDeque<PendingPart<'a>>, ctx: &AssemblyContext<'_>) -> Vec<PreparedPart<'a>> {
    parts.into_iter().map(|part| prepare_part(part, ctx)).collect()
}

/// 将表单组件展开为合并数据流的数据段
///
/// 每个组件展开为头部、数据、换行三个数据段，最后追加结束分隔符。没有任何组件时不产生任何数据段。
pub(crate) fn into_segments<'a>(parts: VecDeque<PendingPart<'a>>, ctx: &AssemblyContext<'_>) -> Vec<Segment<'a>> {
    if parts.is_empty() {
        return Vec::new();
    }
    let mut segments = Vec::with_capacity(parts.len() * 3 + 1);
    for PreparedPart { head, payload } in prepare_parts(parts, ctx) {
        segments.push(Segment::Chunk(head));
        segments.push(match payload {
            Payload::Bytes(bytes) => Segment::Chunk(bytes),
            Payload::Segment(segment) => segment,
            Payload::Unsupported(kind) => {
                Segment::deferred(future::ready(Err(MultipartError::UnsupportedValue(kind))))
            }
        });
        segments.push(Segment::Chunk(Bytes::from_static(CRLF)));
    }
    segments.push(Segment::Chunk(closing_delimiter(ctx.boundary)));
    segments
}

/// 依次读取所有组件数据，组装为完整的请求体
pub(crate) async fn assemble(parts: Vec<PreparedPart<'_>>, boundary: &Boundary) -> MultipartResult<Bytes> {
    if parts.is_empty() {
        return Ok(Bytes::new());
    }
    let mut body = BytesMut::new();
    for PreparedPart { head, payload } in parts {
        let data = match payload {
            Payload::Bytes(bytes) => bytes,
            Payload::Segment(segment) => drain_segment(segment).await?,
            Payload::Unsupported(kind) => return Err(MultipartError::UnsupportedValue(kind)),
        };
        body.reserve(head.len() + data.len() + CRLF.len());
        body.extend_from_slice(&head);
        body.extend_from_slice(&data);
        body.extend_from_slice(CRLF);
    }
    body.extend_from_slice(&closing_delimiter(boundary));
    Ok(body.freeze())
}

fn closing_delimiter(boundary: &Boundary) -> Bytes {
    let mut buf = BytesMut::with_capacity(boundary.len() + 4);
    buf.extend_from_slice(b"--");
    buf.extend_from_slice(boundary.as_bytes());
    buf.extend_from_slice(b"--");
    buf.freeze()
}

fn encode_headers(boundary: &Boundary, name: &str, file: Option<(&str, &Mime)>) -> HeaderBuffer {
    let mut buf = HeaderBuffer::from_slice(b"--");
    buf.extend_from_slice(boundary.as_bytes());
    buf.extend_from_slice(CRLF);
    buf.extend_from_slice(b"Content-Disposition: form-data; name=\"");
    buf.extend_from_slice(escape_quoted(name).as_bytes());
    buf.push(b'"');
    if let Some((file_name, mime)) = file {
        buf.extend_from_slice(b"; filename=\"");
        buf.extend_from_slice(escape_quoted(file_name).as_bytes());
        buf.push(b'"');
        buf.extend_from_slice(CRLF);
        buf.extend_from_slice(b"Content-Type: ");
        buf.extend_from_slice(mime.as_ref().as_bytes());
    }
    buf.extend_from_slice(CRLF);
    buf.extend_from_slice(CRLF);
    buf
}

// 与浏览器的表单编码保持一致，换行与引号使用百分号转义
fn escape_quoted(value: &str) -> Cow<'_, str> {
    static REGEX: Lazy<Regex> = Lazy::new(|| Regex::new("\r|\n|\"").unwrap());
    REGEX.replace_all(value, |caps: &regex::Captures<'_>| match &caps[0] {
        "\r" => "%0D",
        "\n" => "%0A",
        _ => "%22",
    })
}

fn text_bytes(text: Cow<'_, str>) -> Bytes {
    match text {
        Cow::Borrowed(text) => Bytes::copy_from_slice(text.as_bytes()),
        Cow::Owned(text) => Bytes::from(text),
    }
}

fn basename(path: &str) -> Option<Cow<'_, str>> {
    Path::new(path).file_name().map(|name| name.to_string_lossy())
}
