use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

#[derive(Serialize, Deserialize, Debug)]
struct Claims {
    #[serde(default)]
    userid: Option<String>,
}

/// Checks HS256 tokens issued by the identity service. Only the signature
/// is verified; tokens carry no expiry.
pub struct TokenVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let token = token.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let data = decode::<Claims>(token, &self.decoding, &self.validation)?;
        match data.claims.userid {
            Some(user_id) if !user_id.is_empty() => Ok(user_id),
            _ => Err(AuthError::MissingUserId),
        }
    }

    pub fn issue(&self, user_id: &str) -> Result<String, AuthError> {
        let claims = Claims {
            userid: Some(user_id.to_string()),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let verifier = TokenVerifier::new("secret");
        let token = verifier.issue("user-1").unwrap();
        assert_eq!(verifier.verify(&token).unwrap(), "user-1");
        assert_eq!(verifier.verify(&format!("Bearer {token}")).unwrap(), "user-1");
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let token = TokenVerifier::new("other").issue("user-1").unwrap();
        let verifier = TokenVerifier::new("secret");
        assert!(matches!(
            verifier.verify(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn empty_and_garbage_tokens_are_rejected() {
        let verifier = TokenVerifier::new("secret");
        assert!(matches!(verifier.verify(""), Err(AuthError::MissingToken)));
        assert!(verifier.verify("not-a-jwt").is_err());
    }

    #[test]
    fn token_without_user_is_rejected() {
        let verifier = TokenVerifier::new("secret");
        let token = encode(
            &Header::new(Algorithm::HS256),
            &Claims { userid: None },
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(matches!(
            verifier.verify(&token),
            Err(AuthError::MissingUserId)
        ));
    }
}
