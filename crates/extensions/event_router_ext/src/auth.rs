use async_trait::async_trait;

#[derive(thiserror::Error, Debug, Eq, PartialEq)]
pub enum AuthError {
    #[error("Authorization header is missing")]
    MissingCredential,

    #[error("Invalid authorization token")]
    InvalidToken,
}

/// Checks the credential provided by a request against the expected one.
#[async_trait]
pub trait Authorizer: Send + Sync + 'static {
    async fn authorize(&self, expected_token: &str, credential: Option<&str>)
        -> Result<(), AuthError>;
}

/// Accepts requests carrying the expected token, either as `Bearer <token>` or bare.
#[derive(Debug, Default, Clone, Copy)]
pub struct BearerTokenAuthorizer;

#[async_trait]
impl Authorizer for BearerTokenAuthorizer {
    async fn authorize(
        &self,
        expected_token: &str,
        credential: Option<&str>,
    ) -> Result<(), AuthError> {
        let credential = credential.unwrap_or_default().trim();
        let token = match credential.strip_prefix("Bearer") {
            Some(token) if token.is_empty() || token.starts_with(char::is_whitespace) => {
                token.trim()
            }
            _ => credential,
        };
        if token.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        if expected_token.is_empty() || !constant_time_eq(token.as_bytes(), expected_token.as_bytes())
        {
            return Err(AuthError::InvalidToken);
        }

        Ok(())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
