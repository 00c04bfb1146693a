// 为内嵌 `SmallString` 的字符串包装类型实现常用特质
//
// 要求类型只包含一个名为 `inner` 的 `SmallString` 字段
macro_rules! wrap_smallstr {
    ($name:ty) => {
        impl From<String> for $name {
            #[inline]
            fn from(s: String) -> Self {
                Self {
                    inner: smallstr::SmallString::from(s.as_str()),
                }
            }
        }

        impl From<&String> for $name {
            #[inline]
            fn from(s: &String) -> Self {
                Self {
                    inner: smallstr::SmallString::from(s.as_str()),
                }
            }
        }

        impl From<Box<str>> for $name {
            #[inline]
            fn from(s: Box<str>) -> Self {
                Self {
                    inner: smallstr::SmallString::from(&*s),
                }
            }
        }

        impl From<&str> for $name {
            #[inline]
            fn from(s: &str) -> Self {
                Self {
                    inner: smallstr::SmallString::from(s),
                }
            }
        }

        impl std::fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(self.inner.as_str(), f)
            }
        }

        impl std::fmt::Debug for $name {
            #[inline]
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Debug::fmt(self.inner.as_str(), f)
            }
        }

        impl AsRef<str> for $name {
            #[inline]
            fn as_ref(&self) -> &str {
                self.inner.as_str()
            }
        }

        impl std::borrow::Borrow<str> for $name {
            #[inline]
            fn borrow(&self) -> &str {
                self.inner.as_str()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            #[inline]
            fn deref(&self) -> &Self::Target {
                self.inner.as_str()
            }
        }

        impl serde::Serialize for $name {
            #[inline]
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.inner.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            #[inline]
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct StrVisitor;

                impl<'de> serde::de::Visitor<'de> for StrVisitor {
                    type Value = $name;

                    #[inline]
                    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                        f.write_str("a string")
                    }

                    #[inline]
                    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                        Ok(v.into())
                    }

                    #[inline]
                    fn visit_string<E: serde::de::Error>(self, v: String) -> Result<Self::Value, E> {
                        Ok(v.into())
                    }
                }

                deserializer.deserialize_str(StrVisitor)
            }
        }

        impl $name {
            /// 获取字符串切片
            #[inline]
            pub fn as_str(&self) -> &str {
                self.inner.as_str()
            }
        }
    };
}

pub(crate) use wrap_smallstr;
