use mime::{Mime, APPLICATION_OCTET_STREAM};
use std::{borrow::Cow, fmt::Debug, path::Path};

/// MIME 类型推断结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeKind {
    mime: Mime,
    extension: Cow<'static, str>,
}

impl MimeKind {
    /// 创建 MIME 类型推断结果
    #[inline]
    pub fn new(mime: Mime, extension: impl Into<Cow<'static, str>>) -> Self {
        Self {
            mime,
            extension: extension.into(),
        }
    }

    /// 获取 MIME 类型
    #[inline]
    pub fn mime(&self) -> &Mime {
        &self.mime
    }

    /// 获取扩展名，不包含 `.`
    #[inline]
    pub fn extension(&self) -> &str {
        &self.extension
    }
}

/// 文件表单组件的默认值
///
/// 当文件名无法推断时，使用 `<name>.<ext>` 作为文件名，MIME 类型无法推断时则使用 `mime`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDefaults {
    name: Cow<'static, str>,
    ext: Cow<'static, str>,
    mime: Mime,
}

impl Default for FileDefaults {
    #[inline]
    fn default() -> Self {
        Self {
            name: Cow::Borrowed("file"),
            ext: Cow::Borrowed("bin"),
            mime: APPLICATION_OCTET_STREAM,
        }
    }
}

impl FileDefaults {
    /// 设置默认文件名（不含扩展名）
    #[inline]
    #[must_use]
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// 设置默认扩展名
    #[inline]
    #[must_use]
    pub fn ext(mut self, ext: impl Into<Cow<'static, str>>) -> Self {
        self.ext = ext.into();
        self
    }

    /// 设置默认 MIME 类型
    #[inline]
    #[must_use]
    pub fn mime(mut self, mime: Mime) -> Self {
        self.mime = mime;
        self
    }

    /// 获取默认文件名
    #[inline]
    pub fn get_name(&self) -> &str {
        &self.name
    }

    /// 获取默认扩展名
    #[inline]
    pub fn get_ext(&self) -> &str {
        &self.ext
    }

    /// 获取默认 MIME 类型
    #[inline]
    pub fn get_mime(&self) -> &Mime {
        &self.mime
    }

    pub(crate) fn file_name(&self, ext: &str) -> String {
        format!("{}.{}", self.name, ext)
    }
}

/// MIME 类型推断器
///
/// 根据数据内容或文件名推断 MIME 类型及扩展名，无法推断时返回给出的默认值
pub trait MimeDetector: Debug + Send + Sync {
    /// 根据数据内容推断
    fn detect_bytes(&self, bytes: &[u8], defaults: &FileDefaults) -> MimeKind;

    /// 根据文件名推断
    fn detect_name(&self, name: &str, defaults: &FileDefaults) -> MimeKind;
}

/// 默认 MIME 类型推断器
///
/// 数据内容使用常见文件头签名识别，文件名则使用 `mime_guess` 按扩展名识别
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMimeDetector;

struct Signature {
    offset: usize,
    magic: &'static [u8],
    mime: &'static str,
    ext: &'static str,
}

const SIGNATURES: &[Signature] = &[
    Signature { offset: 0, magic: b"\xFF\xD8\xFF", mime: "image/jpeg", ext: "jpg" },
    Signature { offset: 0, magic: b"\x89PNG\r\n\x1A\n", mime: "image/png", ext: "png" },
    Signature { offset: 0, magic: b"GIF87a", mime: "image/gif", ext: "gif" },
    Signature { offset: 0, magic: b"GIF89a", mime: "image/gif", ext: "gif" },
    Signature { offset: 8, magic: b"WEBP", mime: "image/webp", ext: "webp" },
    Signature { offset: 0, magic: b"BM", mime: "image/bmp", ext: "bmp" },
    Signature { offset: 0, magic: b"%PDF-", mime: "application/pdf", ext: "pdf" },
    Signature { offset: 0, magic: b"PK\x03\x04", mime: "application/zip", ext: "zip" },
    Signature { offset: 0, magic: b"\x1F\x8B", mime: "application/gzip", ext: "gz" },
    Signature { offset: 0, magic: b"OggS", mime: "audio/ogg", ext: "ogg" },
    Signature { offset: 4, magic: b"ftypisom", mime: "video/mp4", ext: "mp4" },
];

impl MimeDetector for DefaultMimeDetector {
    fn detect_bytes(&self, bytes: &[u8], defaults: &FileDefaults) -> MimeKind {
        SIGNATURES
            .iter()
            .find(|sig| bytes.get(sig.offset..sig.offset + sig.magic.len()) == Some(sig.magic))
            .and_then(|sig| Some(MimeKind::new(sig.mime.parse().ok()?, sig.ext)))
            .unwrap_or_else(|| default_kind(defaults))
    }

    fn detect_name(&self, name: &str, defaults: &FileDefaults) -> MimeKind {
        let path = Path::new(name);
        match mime_guess::from_path(path).first() {
            Some(mime) => {
                let ext = path
                    .extension()
                    .map(|ext| ext.to_string_lossy().into_owned())
                    .unwrap_or_else(|| defaults.get_ext().to_owned());
                MimeKind::new(mime, ext)
            }
            None => default_kind(defaults),
        }
    }
}

fn default_kind(defaults: &FileDefaults) -> MimeKind {
    MimeKind::new(defaults.get_mime().to_owned(), defaults.get_ext().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mime::{IMAGE_JPEG, IMAGE_PNG, TEXT_PLAIN};

    #[test]
    fn test_detect_bytes() {
        env_logger::builder().is_test(true).try_init().ok();

        let defaults = FileDefaults::default();
        let jpeg = DefaultMimeDetector.detect_bytes(b"\xFF\xD8\xFF\xE0\x00\x10JFIF", &defaults);
        assert_eq!(jpeg.mime(), &IMAGE_JPEG);
        assert_eq!(jpeg.extension(), "jpg");

        let png = DefaultMimeDetector.detect_bytes(b"\x89PNG\r\n\x1A\n\x00\x00", &defaults);
        assert_eq!(png.mime(), &IMAGE_PNG);
        assert_eq!(png.extension(), "png");

        let webp = DefaultMimeDetector.detect_bytes(b"RIFF\x00\x00\x00\x00WEBPVP8 ", &defaults);
        assert_eq!(webp.mime().as_ref(), "image/webp");

        let unknown = DefaultMimeDetector.detect_bytes(b"hello", &defaults);
        assert_eq!(unknown.mime(), &APPLICATION_OCTET_STREAM);
        assert_eq!(unknown.extension(), "bin");

        let empty = DefaultMimeDetector.detect_bytes(b"", &defaults);
        assert_eq!(empty.extension(), "bin");
    }

    #[test]
    fn test_detect_name() {
        env_logger::builder().is_test(true).try_init().ok();

        let defaults = FileDefaults::default();
        assert_eq!(DefaultMimeDetector.detect_name("a.jpg", &defaults).mime(), &IMAGE_JPEG);
        assert_eq!(DefaultMimeDetector.detect_name("dir/notes.txt", &defaults).mime(), &TEXT_PLAIN);
        assert_eq!(
            DefaultMimeDetector.detect_name("2401029", &defaults).mime(),
            &APPLICATION_OCTET_STREAM
        );
    }

    #[test]
    fn test_custom_defaults() {
        env_logger::builder().is_test(true).try_init().ok();

        let defaults = FileDefaults::default().name("upload").ext("dat").mime(TEXT_PLAIN);
        assert_eq!(defaults.file_name("dat"), "upload.dat");
        let kind = DefaultMimeDetector.detect_bytes(b"plain", &defaults);
        assert_eq!(kind.mime(), &TEXT_PLAIN);
        assert_eq!(kind.extension(), "dat");
    }
}
