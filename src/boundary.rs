use super::{
    error::{MultipartError, MultipartResult},
    smallstr::wrap_smallstr,
};
use rand::{thread_rng, Rng};
use smallstr::SmallString;
use std::{fmt::Debug, fmt::Write};

/// 默认的分隔符前缀
pub const DEFAULT_BOUNDARY_PREFIX: &str = "MultipartBoundary";

const RANDOM_DIGITS: usize = 12;
const MAX_BOUNDARY_LEN: usize = 70;

/// Multipart 分隔符
///
/// 分隔符本身已经包含前导的 `--`，写入请求体时还需再加上一次 `--`
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Boundary {
    inner: SmallString<[u8; 48]>,
}
wrap_smallstr!(Boundary);

impl Boundary {
    /// 检查分隔符是否符合 RFC 2046 的要求
    pub(crate) fn validate(&self) -> MultipartResult<()> {
        let bytes = self.inner.as_bytes();
        if bytes.is_empty() || bytes.len() > MAX_BOUNDARY_LEN {
            return Err(MultipartError::invalid_argument(format!(
                "boundary must contain 1 to {} characters, but got {}",
                MAX_BOUNDARY_LEN,
                bytes.len()
            )));
        }
        if bytes.last() == Some(&b' ') || !bytes.iter().copied().all(is_bchar) {
            return Err(MultipartError::invalid_argument(format!(
                "boundary {:?} contains invalid characters",
                self.as_str()
            )));
        }
        Ok(())
    }
}

fn is_bchar(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"'()+_,-./:=? ".contains(&b)
}

/// 分隔符生成器
///
/// 作为 [`crate::Multipart`] 的依赖注入，用于替换默认的随机实现
pub trait BoundaryGenerator: Debug + Send + Sync {
    /// 生成一个新的分隔符
    fn generate(&self) -> Boundary;
}

/// 随机分隔符生成器
///
/// 生成的分隔符形如 `--<前缀><12 位随机数字>`，仅用于保证分隔符唯一，不具备安全性
#[derive(Debug, Clone)]
pub struct RandomBoundary {
    prefix: Box<str>,
}

impl RandomBoundary {
    /// 使用指定前缀创建随机分隔符生成器
    #[inline]
    pub fn new(prefix: impl Into<Box<str>>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// 获取分隔符前缀
    #[inline]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Default for RandomBoundary {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_BOUNDARY_PREFIX)
    }
}

impl BoundaryGenerator for RandomBoundary {
    fn generate(&self) -> Boundary {
        let mut rng = thread_rng();
        let mut boundary = SmallString::with_capacity(2 + self.prefix.len() + RANDOM_DIGITS);
        boundary.push_str("--");
        boundary.push_str(&self.prefix);
        for _ in 0..RANDOM_DIGITS {
            // 每位取 0..10，按十六进制输出
            write!(boundary, "{:x}", rng.gen_range(0u8..10)).ok();
        }
        Boundary { inner: boundary }
    }
}

/// 固定分隔符生成器
#[derive(Debug, Clone)]
pub struct FixedBoundary(Boundary);

impl FixedBoundary {
    /// 创建固定分隔符生成器
    #[inline]
    pub fn new(boundary: impl Into<Boundary>) -> Self {
        Self(boundary.into())
    }
}

impl BoundaryGenerator for FixedBoundary {
    #[inline]
    fn generate(&self) -> Boundary {
        self.0.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_boundary() {
        env_logger::builder().is_test(true).try_init().ok();

        let generator = RandomBoundary::default();
        for _ in 0..5 {
            let boundary = generator.generate();
            assert_eq!(boundary.len(), 2 + DEFAULT_BOUNDARY_PREFIX.len() + RANDOM_DIGITS);
            assert!(boundary.starts_with("--MultipartBoundary"));
            assert!(boundary[2 + DEFAULT_BOUNDARY_PREFIX.len()..]
                .bytes()
                .all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_boundary_prefix() {
        env_logger::builder().is_test(true).try_init().ok();

        let boundary = RandomBoundary::new("Custom").generate();
        assert!(boundary.starts_with("--Custom"));
        assert_eq!(boundary.len(), 2 + "Custom".len() + RANDOM_DIGITS);
    }

    #[test]
    fn test_fixed_boundary() {
        env_logger::builder().is_test(true).try_init().ok();

        let generator = FixedBoundary::new("--CustomBoundary12345");
        assert_eq!(generator.generate().as_str(), "--CustomBoundary12345");
        assert_eq!(generator.generate(), generator.generate());
    }

    #[test]
    fn test_validate_boundary() {
        env_logger::builder().is_test(true).try_init().ok();

        assert!(RandomBoundary::default().generate().validate().is_ok());
        assert!(Boundary::from("--CustomBoundary12345").validate().is_ok());
        assert!(Boundary::from("").validate().is_err());
        assert!(Boundary::from("bad\r\nboundary").validate().is_err());
        assert!(Boundary::from("trailing ").validate().is_err());
        assert!(Boundary::from("x".repeat(71)).validate().is_err());
    }
}
