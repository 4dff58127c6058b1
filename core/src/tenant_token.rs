//! Tenant tokens: HS256-signed JWTs that restrict what a search may see.
//!
//! All validation happens before signing and without touching the network.
//! Checks run in a fixed order so the reported reason is deterministic:
//! expiry, then signing key, then search rules.

use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use serde_json::Value;

use crate::error::{MeiliError, Result};

/// Length of the key prefix embedded in the token.
const API_KEY_PREFIX_LEN: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct TenantTokenOptions {
    /// Key that signs the token. Falls back to the client's key when `None`
    /// or empty.
    pub api_key: Option<String>,
    /// When the token stops being accepted. `None` means no expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TenantClaims<'a> {
    search_rules: &'a Value,
    api_key_prefix: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
}

/// Sign `search_rules` into a tenant token.
///
/// `client_key` is the key the client was configured with.
pub fn generate_tenant_token(
    client_key: &str,
    search_rules: Option<&Value>,
    options: &TenantTokenOptions,
) -> Result<String> {
    if let Some(expires_at) = options.expires_at {
        if expires_at < Utc::now() {
            return Err(MeiliError::InvalidTenantToken(
                "the expiresAt date should be in the future".to_string(),
            ));
        }
    }

    let secret = match options.api_key.as_deref() {
        Some(key) if !key.is_empty() => key,
        _ => client_key,
    };
    // a ninth character exists only when the key is long enough
    let Some((prefix_end, _)) = secret.char_indices().nth(API_KEY_PREFIX_LEN) else {
        return Err(MeiliError::InvalidTenantToken(
            "an API key longer than 8 characters is required, either in the client or in the options"
                .to_string(),
        ));
    };

    let Some(search_rules) = search_rules else {
        return Err(MeiliError::InvalidTenantToken(
            "the searchRules field is mandatory".to_string(),
        ));
    };

    let claims = TenantClaims {
        search_rules,
        api_key_prefix: &secret[..prefix_end],
        exp: options.expires_at.map(|at| at.timestamp()),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
    use serde_json::json;

    use super::*;

    const KEY: &str = "a19b6ec84ff0f1e4ba3eb0a2d3d6b5c2";

    fn verify(token: &str, secret: &str) -> Value {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        decode::<Value>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
            .unwrap()
            .claims
    }

    #[test]
    fn signs_rules_prefix_and_expiry() {
        let rules = json!({"movies": {"filter": "genre = comedy"}});
        let expires_at = Utc::now() + Duration::hours(1);
        let options = TenantTokenOptions {
            api_key: None,
            expires_at: Some(expires_at),
        };
        let token = generate_tenant_token(KEY, Some(&rules), &options).unwrap();
        let claims = verify(&token, KEY);
        assert_eq!(claims["searchRules"], rules);
        assert_eq!(claims["apiKeyPrefix"], "a19b6ec8");
        assert_eq!(claims["exp"], expires_at.timestamp());
    }

    #[test]
    fn options_key_overrides_client_key() {
        let other = "ffffffff00000000ffffffff";
        let options = TenantTokenOptions {
            api_key: Some(other.to_string()),
            expires_at: None,
        };
        let token = generate_tenant_token(KEY, Some(&json!(["*"])), &options).unwrap();
        let claims = verify(&token, other);
        assert_eq!(claims["apiKeyPrefix"], "ffffffff");
        assert!(claims.get("exp").is_none());
    }

    #[test]
    fn empty_options_key_falls_back_to_client_key() {
        let options = TenantTokenOptions {
            api_key: Some(String::new()),
            expires_at: None,
        };
        let token = generate_tenant_token(KEY, Some(&json!({"*": {}})), &options).unwrap();
        assert_eq!(verify(&token, KEY)["apiKeyPrefix"], "a19b6ec8");
    }

    #[test]
    fn short_keys_are_rejected_for_any_rules() {
        for key in ["", "k", "12345678"] {
            for rules in [json!({}), json!(["*"]), json!({"movies": null})] {
                let err = generate_tenant_token(key, Some(&rules), &TenantTokenOptions::default())
                    .unwrap_err();
                assert!(matches!(err, MeiliError::InvalidTenantToken(_)), "key {key:?}");
            }
        }
    }

    #[test]
    fn key_length_counts_characters_not_bytes() {
        // eight characters, sixteen bytes
        let short = "éééééééé";
        let err = generate_tenant_token(short, Some(&json!(["*"])), &TenantTokenOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("longer than 8 characters"), "{err}");

        let long = "éééééééééé";
        let token =
            generate_tenant_token(long, Some(&json!(["*"])), &TenantTokenOptions::default()).unwrap();
        assert_eq!(verify(&token, long)["apiKeyPrefix"], "éééééééé");
    }

    #[test]
    fn prefix_may_end_inside_a_multibyte_key() {
        // the eighth byte falls in the middle of a character
        let key = "abcdefgé0123";
        let token =
            generate_tenant_token(key, Some(&json!(["*"])), &TenantTokenOptions::default()).unwrap();
        assert_eq!(verify(&token, key)["apiKeyPrefix"], "abcdefgé");
    }

    #[test]
    fn past_expiry_is_rejected_even_when_otherwise_valid() {
        let options = TenantTokenOptions {
            api_key: None,
            expires_at: Some(Utc::now() - Duration::seconds(1)),
        };
        let err = generate_tenant_token(KEY, Some(&json!(["*"])), &options).unwrap_err();
        assert!(err.to_string().contains("future"));
    }

    #[test]
    fn expiry_is_checked_before_key() {
        let options = TenantTokenOptions {
            api_key: None,
            expires_at: Some(Utc::now() - Duration::days(1)),
        };
        let err = generate_tenant_token("short", None, &options).unwrap_err();
        assert!(err.to_string().contains("future"));
    }

    #[test]
    fn missing_rules_are_rejected() {
        let err = generate_tenant_token(KEY, None, &TenantTokenOptions::default()).unwrap_err();
        assert!(err.to_string().contains("searchRules"));
    }
}
