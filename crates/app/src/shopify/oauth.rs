//! OAuth authorization-code grant helpers.
//!
//! Shopify signs the install and callback redirects with an HMAC-SHA256 of
//! the query string, keyed with the app's API secret:
//!
//! 1. drop the `hmac` (and legacy `signature`) parameter
//! 2. sort the remaining parameters by key
//! 3. join them as `key=value` pairs separated by `&`
//! 4. hex-encode the digest and compare against `hmac`

use hmac::{Hmac, Mac};
use howheard_core::ShopDomain;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Build the platform authorization URL a merchant is redirected to on install.
///
/// `nonce` is echoed back as the `state` parameter on the callback.
#[must_use]
pub fn authorization_url(
    shop: &ShopDomain,
    api_key: &str,
    scopes: &[String],
    redirect_uri: &str,
    nonce: &str,
) -> String {
    format!(
        "https://{shop}/admin/oauth/authorize?client_id={}&scope={}&redirect_uri={}&state={}",
        urlencoding::encode(api_key),
        urlencoding::encode(&scopes.join(",")),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(nonce),
    )
}

/// The message Shopify signs: every parameter except `hmac`/`signature`,
/// sorted by key and joined as `key=value&...`.
fn signing_message<'a>(params: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut pairs: Vec<(&str, &str)> = params
        .into_iter()
        .filter(|(k, _)| *k != "hmac" && *k != "signature")
        .collect();
    pairs.sort_unstable();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Sign query parameters the way Shopify does. Returns the hex digest.
#[must_use]
pub fn sign_query<'a>(params: impl IntoIterator<Item = (&'a str, &'a str)>, secret: &str) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        // HMAC accepts keys of any length
        return String::new();
    };
    mac.update(signing_message(params).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify the `hmac` parameter of an OAuth redirect.
///
/// `params` are the decoded query parameters, including `hmac` itself.
/// Returns `false` when `hmac` is missing or not valid hex.
#[must_use]
pub fn verify_query<'a>(params: &[(&'a str, &'a str)], secret: &str) -> bool {
    let Some(provided) = params
        .iter()
        .find(|(k, _)| *k == "hmac")
        .and_then(|(_, v)| hex::decode(v).ok())
    else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(signing_message(params.iter().copied()).as_bytes());
    mac.verify_slice(&provided).is_ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "hush";

    #[test]
    fn test_authorization_url() {
        let shop = ShopDomain::parse("cool-store.myshopify.com").unwrap();
        let url = authorization_url(
            &shop,
            "abc123",
            &["read_orders".to_string(), "write_customers".to_string()],
            "https://howheard.example/auth/callback",
            "nonce-1",
        );
        assert_eq!(
            url,
            "https://cool-store.myshopify.com/admin/oauth/authorize?client_id=abc123\
             &scope=read_orders%2Cwrite_customers\
             &redirect_uri=https%3A%2F%2Fhowheard.example%2Fauth%2Fcallback\
             &state=nonce-1"
        );
    }

    #[test]
    fn test_signing_message_sorts_and_skips_hmac() {
        let message = signing_message([
            ("shop", "cool-store.myshopify.com"),
            ("hmac", "ignored"),
            ("code", "0907a61c0c8d55e99db179b68161bc00"),
            ("timestamp", "1337178173"),
        ]);
        assert_eq!(
            message,
            "code=0907a61c0c8d55e99db179b68161bc00&shop=cool-store.myshopify.com&timestamp=1337178173"
        );
    }

    #[test]
    fn test_verify_query_accepts_valid_signature() {
        let unsigned = [
            ("code", "abc"),
            ("shop", "cool-store.myshopify.com"),
            ("state", "nonce-1"),
            ("timestamp", "1337178173"),
        ];
        let hmac = sign_query(unsigned, SECRET);

        let mut params = unsigned.to_vec();
        params.push(("hmac", hmac.as_str()));
        assert!(verify_query(&params, SECRET));
    }

    #[test]
    fn test_verify_query_rejects_tampering() {
        let unsigned = [("code", "abc"), ("shop", "cool-store.myshopify.com")];
        let hmac = sign_query(unsigned, SECRET);

        let tampered = [
            ("code", "abc"),
            ("shop", "evil.myshopify.com"),
            ("hmac", hmac.as_str()),
        ];
        assert!(!verify_query(&tampered, SECRET));

        let wrong_secret = [
            ("code", "abc"),
            ("shop", "cool-store.myshopify.com"),
            ("hmac", hmac.as_str()),
        ];
        assert!(!verify_query(&wrong_secret, "other"));
    }

    #[test]
    fn test_verify_query_rejects_missing_or_garbage_hmac() {
        assert!(!verify_query(&[("code", "abc")], SECRET));
        assert!(!verify_query(&[("code", "abc"), ("hmac", "zz-not-hex")], SECRET));
    }
}
