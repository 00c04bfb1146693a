use super::{
    assembler::{self, AssemblyContext},
    body::{MultipartBuffer, MultipartStream},
    boundary::{Boundary, BoundaryGenerator, RandomBoundary},
    combined::CombinedStream,
    error::{MultipartError, MultipartResult},
    mime_kind::{DefaultMimeDetector, FileDefaults, MimeDetector},
    smallstr::wrap_smallstr,
    value::{FieldValue, FieldValueInner},
};
use assert_impl::assert_impl;
use http::HeaderValue;
use log::{debug, warn};
use mime::Mime;
use smallstr::SmallString;
use std::{collections::VecDeque, sync::Arc};

/// 文件名
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileName {
    inner: SmallString<[u8; 64]>,
}
wrap_smallstr!(FileName);

/// Multipart 字段名称
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldName {
    inner: SmallString<[u8; 16]>,
}
wrap_smallstr!(FieldName);

macro_rules! impl_field_name_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FieldName {
                #[inline]
                fn from(name: $ty) -> Self {
                    name.to_string().into()
                }
            }
        )*
    };
}
impl_field_name_from_number!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

/// Multipart 表单组件元信息
#[derive(Default, Debug, Clone)]
pub struct PartMetadata {
    file_name: Option<FileName>,
    mime: Option<Mime>,
}

impl PartMetadata {
    /// 设置表单组件的 MIME 类型
    ///
    /// 仅对文件类型的表单组件有效，未设置时将根据文件名推断
    #[inline]
    #[must_use]
    pub fn mime(mut self, mime: Mime) -> Self {
        self.mime = Some(mime);
        self
    }

    /// 设置表单组件的文件名
    ///
    /// 仅对文件类型的表单组件有效，未设置时将根据数据推断
    #[inline]
    #[must_use]
    pub fn file_name(mut self, file_name: impl Into<FileName>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub(crate) fn into_parts(self) -> (Option<FileName>, Option<Mime>) {
        (self.file_name, self.mime)
    }
}

/// 排队中的表单组件
#[derive(Debug)]
pub(crate) struct PendingPart<'a> {
    pub(crate) name: FieldName,
    pub(crate) value: FieldValue<'a>,
    pub(crate) metadata: PartMetadata,
}

/// Multipart 表单
///
/// 表单组件按追加顺序排列，在调用 [`Multipart::into_stream`] 或 [`Multipart::buffer`] 时才开始读取数据。
/// 这两个方法都会消耗表单本身，因此读取开始后无法再追加组件。
///
/// ### 构建 Multipart 请求体代码实例
///
/// ```
/// use multi_part::{FieldValue, Multipart, PartMetadata};
///
/// # async fn example() -> anyhow::Result<()> {
/// let mut multipart = Multipart::builder().chunked(false).build()?;
/// multipart
///     .append("key", "test-key")?
///     .append("tags", vec![FieldValue::from("a"), FieldValue::from("b")])?
///     .append_with(
///         "file",
///         FieldValue::bytes(b"hello".as_slice()),
///         PartMetadata::default().file_name("hello.txt"),
///     )?;
/// let buffer = multipart.buffer().await?;
/// assert!(buffer.headers().contains_key("content-length"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Multipart<'a> {
    boundary: Boundary,
    content_type: HeaderValue,
    chunked: bool,
    file_defaults: FileDefaults,
    mime_detector: Arc<dyn MimeDetector>,
    fields: VecDeque<PendingPart<'a>>,
}

impl Default for Multipart<'_> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Multipart<'a> {
    /// 使用随机分隔符创建 Multipart 表单
    pub fn new() -> Self {
        let boundary = RandomBoundary::default().generate();
        let content_type = content_type_header(&boundary).unwrap_or_else(|err| {
            warn!("Random boundary {} is rejected: {}", boundary, err);
            HeaderValue::from_static("multipart/form-data")
        });
        Self {
            boundary,
            content_type,
            chunked: true,
            file_defaults: Default::default(),
            mime_detector: Arc::new(DefaultMimeDetector),
            fields: Default::default(),
        }
    }

    /// 创建 Multipart 表单构建器
    #[inline]
    pub fn builder() -> MultipartBuilder {
        Default::default()
    }

    /// 获取分隔符
    #[inline]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// 获取 `Content-Type` 头的值
    #[inline]
    pub fn content_type(&self) -> &HeaderValue {
        &self.content_type
    }

    /// 获取表单组件数量
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// 表单是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 追加表单字段
    ///
    /// 有序序列中的每个元素都会成为一个同名的表单组件，空序列则作为空字符串追加。
    /// 空值与 `false` 作为 `"0"` 追加，`true` 作为 `"1"` 追加。
    /// 字段值本身在此时不会被读取。
    #[inline]
    pub fn append(
        &mut self,
        name: impl Into<FieldName>,
        value: impl Into<FieldValue<'a>>,
    ) -> MultipartResult<&mut Self> {
        self.append_with(name, value, Default::default())
    }

    /// 使用元信息追加表单字段
    ///
    /// 如果字段名称为空，将返回 [`MultipartError::InvalidArgument`]
    pub fn append_with(
        &mut self,
        name: impl Into<FieldName>,
        value: impl Into<FieldValue<'a>>,
        metadata: PartMetadata,
    ) -> MultipartResult<&mut Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(MultipartError::invalid_argument(
                "field name must be a non-empty string or a number",
            ));
        }
        self.push_value(name, value.into(), metadata);
        Ok(self)
    }

    fn push_value(&mut self, name: FieldName, value: FieldValue<'a>, metadata: PartMetadata) {
        match value.into_inner() {
            FieldValueInner::Sequence(values) if values.is_empty() => {
                self.push_part(name, FieldValue::text(""), metadata)
            }
            FieldValueInner::Sequence(values) => {
                for value in values {
                    self.push_value(name.to_owned(), value, metadata.to_owned());
                }
            }
            FieldValueInner::Null | FieldValueInner::Bool(false) => {
                self.push_part(name, FieldValue::text("0"), metadata)
            }
            FieldValueInner::Bool(true) => self.push_part(name, FieldValue::text("1"), metadata),
            FieldValueInner::Number(number) => self.push_part(name, FieldValue::text(number), metadata),
            inner => self.push_part(name, FieldValue::from_inner(inner), metadata),
        }
    }

    fn push_part(&mut self, name: FieldName, value: FieldValue<'a>, metadata: PartMetadata) {
        debug!("Append part {} as {:?}", name, value.kind());
        self.fields.push_back(PendingPart { name, value, metadata });
    }

    /// 转换为请求体数据流
    ///
    /// 数据流总是使用分块传输，各组件按顺序依次读取，仅当下游拉取数据时才读取下一个数据块
    pub fn into_stream(self) -> MultipartStream<'a> {
        let ctx = AssemblyContext::new(&self.boundary, &self.file_defaults, self.mime_detector.as_ref());
        let segments = assembler::into_segments(self.fields, &ctx);
        debug!(
            "Multipart stream with boundary {} contains {} segments",
            self.boundary,
            segments.len()
        );
        MultipartStream::new(
            self.boundary,
            self.content_type,
            self.chunked,
            CombinedStream::new(segments),
        )
    }

    /// 读取所有组件并组装为完整的请求体
    ///
    /// 任一组件读取失败时立即返回错误，不会返回不完整的请求体
    pub async fn buffer(self) -> MultipartResult<MultipartBuffer> {
        let Self {
            boundary,
            content_type,
            chunked,
            file_defaults,
            mime_detector,
            fields,
        } = self;
        let prepared = {
            let ctx = AssemblyContext::new(&boundary, &file_defaults, mime_detector.as_ref());
            assembler::prepare_parts(fields, &ctx)
        };
        let body = assembler::assemble(prepared, &boundary).await?;
        Ok(MultipartBuffer::new(boundary, content_type, chunked, body))
    }
}

impl Multipart<'static> {
    #[allow(dead_code)]
    fn ignore() {
        assert_impl!(Send: Self);
    }
}

fn content_type_header(boundary: &Boundary) -> MultipartResult<HeaderValue> {
    boundary.validate()?;
    HeaderValue::from_str(&format!("multipart/form-data; boundary=\"{}\"", boundary))
        .map_err(|err| MultipartError::invalid_argument(err.to_string()))
}

/// Multipart 表单构建器
#[derive(Debug, Default)]
pub struct MultipartBuilder {
    boundary: Option<Boundary>,
    boundary_prefix: Option<Box<str>>,
    boundary_generator: Option<Box<dyn BoundaryGenerator>>,
    chunked: Option<bool>,
    file_defaults: Option<FileDefaults>,
    mime_detector: Option<Arc<dyn MimeDetector>>,
}

impl MultipartBuilder {
    /// 设置固定的分隔符
    ///
    /// 优先级高于分隔符前缀与分隔符生成器
    #[inline]
    pub fn boundary(&mut self, boundary: impl Into<Boundary>) -> &mut Self {
        self.boundary = Some(boundary.into());
        self
    }

    /// 设置随机分隔符的前缀，默认为 `MultipartBoundary`
    #[inline]
    pub fn boundary_prefix(&mut self, prefix: impl Into<Box<str>>) -> &mut Self {
        self.boundary_prefix = Some(prefix.into());
        self
    }

    /// 设置分隔符生成器
    #[inline]
    pub fn boundary_generator(&mut self, generator: impl BoundaryGenerator + 'static) -> &mut Self {
        self.boundary_generator = Some(Box::new(generator));
        self
    }

    /// 设置完整读取请求体时是否使用分块传输，默认为 `true`
    ///
    /// 设置为 `false` 时，[`crate::MultipartBuffer`] 将携带 `Content-Length` 头
    #[inline]
    pub fn chunked(&mut self, chunked: bool) -> &mut Self {
        self.chunked = Some(chunked);
        self
    }

    /// 设置文件表单组件的默认值
    #[inline]
    pub fn file_defaults(&mut self, defaults: FileDefaults) -> &mut Self {
        self.file_defaults = Some(defaults);
        self
    }

    /// 设置 MIME 类型推断器
    #[inline]
    pub fn mime_detector(&mut self, detector: impl MimeDetector + 'static) -> &mut Self {
        self.mime_detector = Some(Arc::new(detector));
        self
    }

    /// 构建 Multipart 表单
    ///
    /// 如果分隔符不符合 RFC 2046 的要求，将返回 [`MultipartError::InvalidArgument`]
    pub fn build<'a>(&mut self) -> MultipartResult<Multipart<'a>> {
        let boundary = match (
            self.boundary.take(),
            self.boundary_generator.as_ref(),
            self.boundary_prefix.take(),
        ) {
            (Some(boundary), _, _) => boundary,
            (None, Some(generator), _) => generator.generate(),
            (None, None, Some(prefix)) => RandomBoundary::new(prefix).generate(),
            (None, None, None) => RandomBoundary::default().generate(),
        };
        let content_type = content_type_header(&boundary)?;
        Ok(Multipart {
            boundary,
            content_type,
            chunked: self.chunked.take().unwrap_or(true),
            file_defaults: self.file_defaults.take().unwrap_or_default(),
            mime_detector: self
                .mime_detector
                .take()
                .unwrap_or_else(|| Arc::new(DefaultMimeDetector)),
            fields: Default::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        boundary::FixedBoundary,
        value::{FileWrapper, ValueKind},
    };
    use serde_json::json;

    fn texts(multipart: &Multipart<'_>) -> Vec<(String, String)> {
        multipart
            .fields
            .iter()
            .map(|part| (part.name.to_string(), format!("{:?}", part.value)))
            .collect()
    }

    #[test]
    fn test_append_normalizes_values() -> anyhow::Result<()> {
        env_logger::builder().is_test(true).try_init().ok();

        let mut multipart = Multipart::new();
        multipart
            .append("null", ())?
            .append("true", true)?
            .append("false", false)?
            .append("number", 12345)?
            .append("empty", Vec::<FieldValue>::new())?;
        assert_eq!(
            texts(&multipart),
            vec![
                ("null".to_owned(), "Text(\"0\")".to_owned()),
                ("true".to_owned(), "Text(\"1\")".to_owned()),
                ("false".to_owned(), "Text(\"0\")".to_owned()),
                ("number".to_owned(), "Text(\"12345\")".to_owned()),
                ("empty".to_owned(), "Text(\"\")".to_owned()),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_append_flattens_sequences() -> anyhow::Result<()> {
        env_logger::builder().is_test(true).try_init().ok();

        let mut multipart = Multipart::new();
        multipart.append("field", json!(["arr", ["arr1", "arr2"], "arr3", null]))?;
        assert_eq!(multipart.len(), 5);
        assert_eq!(
            texts(&multipart)
                .into_iter()
                .map(|(name, value)| {
                    assert_eq!(name, "field");
                    value
                })
                .collect::<Vec<_>>(),
            vec![
                "Text(\"arr\")",
                "Text(\"arr1\")",
                "Text(\"arr2\")",
                "Text(\"arr3\")",
                "Text(\"0\")"
            ]
        );
        Ok(())
    }

    #[test]
    fn test_append_rejects_empty_name() -> anyhow::Result<()> {
        env_logger::builder().is_test(true).try_init().ok();

        let mut multipart = Multipart::new();
        assert!(matches!(
            multipart.append("", "value"),
            Err(MultipartError::InvalidArgument(_))
        ));
        assert!(multipart.is_empty());

        multipart.append(0, "zero")?.append(42u64, "answer")?;
        assert_eq!(
            texts(&multipart)
                .into_iter()
                .map(|(name, _)| name)
                .collect::<Vec<_>>(),
            vec!["0", "42"]
        );
        Ok(())
    }

    #[test]
    fn test_append_keeps_unsupported_values() -> anyhow::Result<()> {
        env_logger::builder().is_test(true).try_init().ok();

        let mut multipart = Multipart::new();
        multipart
            .append("object", json!({"a": "b"}))?
            .append("file", FileWrapper::bytes("anon.jpg", b"data".as_slice()))?;
        let kinds = multipart
            .fields
            .iter()
            .map(|part| part.value.kind())
            .collect::<Vec<_>>();
        assert_eq!(kinds, vec![ValueKind::Object, ValueKind::File]);
        Ok(())
    }

    #[test]
    fn test_builder() -> anyhow::Result<()> {
        env_logger::builder().is_test(true).try_init().ok();

        let multipart = Multipart::builder().boundary("--CustomBoundary12345").build()?;
        assert_eq!(multipart.boundary(), "--CustomBoundary12345");
        assert_eq!(
            multipart.content_type(),
            "multipart/form-data; boundary=\"--CustomBoundary12345\""
        );

        let multipart = Multipart::builder().boundary_prefix("Prefix").build()?;
        assert!(multipart.boundary().starts_with("--Prefix"));

        let multipart = Multipart::builder()
            .boundary_generator(FixedBoundary::new("--Generated"))
            .build()?;
        assert_eq!(multipart.boundary(), "--Generated");

        assert!(matches!(
            Multipart::builder().boundary("bad\r\nboundary").build(),
            Err(MultipartError::InvalidArgument(_))
        ));

        let multipart = Multipart::new();
        assert!(multipart.boundary().starts_with("--MultipartBoundary"));
        assert_eq!(
            multipart.content_type().to_str()?,
            format!("multipart/form-data; boundary=\"{}\"", multipart.boundary())
        );
        Ok(())
    }
}
