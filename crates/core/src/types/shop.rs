//! Merchant shop domain type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Suffix every Shopify-hosted shop domain carries.
const MYSHOPIFY_SUFFIX: &str = ".myshopify.com";

/// Errors that can occur when parsing a [`ShopDomain`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ShopDomainError {
    /// The input string is empty.
    #[error("shop domain cannot be empty")]
    Empty,
    /// The input is not a `*.myshopify.com` domain.
    #[error("shop domain must end with {MYSHOPIFY_SUFFIX}")]
    NotMyshopify,
    /// The shop handle before the suffix is invalid.
    #[error("invalid shop handle: {0}")]
    InvalidHandle(String),
}

/// A merchant's permanent `*.myshopify.com` domain.
///
/// This is the primary key of an account. Shopify sends it as the `shop`
/// query parameter on install and OAuth redirects, and in the body of the
/// uninstall webhook.
///
/// ## Constraints
///
/// - Lowercased on parse
/// - Must end with `.myshopify.com`
/// - The handle must start with an ASCII letter or digit and contain only
///   ASCII letters, digits and hyphens
///
/// ## Examples
///
/// ```
/// use howheard_core::ShopDomain;
///
/// let shop = ShopDomain::parse("Tucker-NYC.myshopify.com").unwrap();
/// assert_eq!(shop.as_str(), "tucker-nyc.myshopify.com");
/// assert_eq!(shop.handle(), "tucker-nyc");
///
/// assert!(ShopDomain::parse("evil.example.com").is_err());
/// assert!(ShopDomain::parse("-bad.myshopify.com").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct ShopDomain(String);

impl ShopDomain {
    /// Parse a `ShopDomain` from untrusted input.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, is not a `myshopify.com`
    /// domain, or has an invalid handle.
    pub fn parse(s: &str) -> Result<Self, ShopDomainError> {
        let lowered = s.trim().to_ascii_lowercase();
        if lowered.is_empty() {
            return Err(ShopDomainError::Empty);
        }

        let handle = lowered
            .strip_suffix(MYSHOPIFY_SUFFIX)
            .ok_or(ShopDomainError::NotMyshopify)?;

        let mut chars = handle.chars();
        let valid = chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(ShopDomainError::InvalidHandle(handle.to_owned()));
        }

        Ok(Self(lowered))
    }

    /// Returns the domain as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the shop handle (the part before `.myshopify.com`).
    #[must_use]
    pub fn handle(&self) -> &str {
        self.0.strip_suffix(MYSHOPIFY_SUFFIX).unwrap_or(&self.0)
    }
}

impl fmt::Display for ShopDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ShopDomain {
    type Err = ShopDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ShopDomain {
    type Error = ShopDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ShopDomain> for String {
    fn from(shop: ShopDomain) -> Self {
        shop.0
    }
}

impl AsRef<str> for ShopDomain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for ShopDomain {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for ShopDomain {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::parse(&s)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for ShopDomain {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lowercases_and_trims() {
        let shop = ShopDomain::parse("  My-Shop.MyShopify.com ").unwrap();
        assert_eq!(shop.as_str(), "my-shop.myshopify.com");
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(ShopDomain::parse(""), Err(ShopDomainError::Empty));
    }

    #[test]
    fn test_parse_rejects_custom_domain() {
        assert_eq!(
            ShopDomain::parse("tuckernyc.com"),
            Err(ShopDomainError::NotMyshopify)
        );
    }

    #[test]
    fn test_parse_rejects_path_injection() {
        assert!(ShopDomain::parse("evil.com/x.myshopify.com").is_err());
        assert!(ShopDomain::parse(".myshopify.com").is_err());
        assert!(ShopDomain::parse("a_b.myshopify.com").is_err());
    }

    #[test]
    fn test_handle() {
        let shop = ShopDomain::parse("tuckernyc-dev.myshopify.com").unwrap();
        assert_eq!(shop.handle(), "tuckernyc-dev");
    }

    #[test]
    fn test_serde_validates() {
        let shop: ShopDomain = serde_json::from_str("\"abc.myshopify.com\"").unwrap();
        assert_eq!(shop.as_str(), "abc.myshopify.com");
        assert!(serde_json::from_str::<ShopDomain>("\"abc.example.com\"").is_err());
        assert_eq!(
            serde_json::to_string(&shop).unwrap(),
            "\"abc.myshopify.com\""
        );
    }
}
