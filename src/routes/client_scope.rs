use axum::{
    extract::{FromRequestParts, Request},
    http::request::Parts,
    http::StatusCode,
    middleware::Next,
    response::Response,
};

pub const CLIENT_ID_HEADER: &str = "x-client-id";

#[derive(Debug, Clone)]
struct ClientId(String);

/// Extractor for the calling client, `None` for anonymous callers
pub struct ClientScope(pub Option<String>);

impl<S> FromRequestParts<S> for ClientScope
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientScope(
            parts.extensions.get::<ClientId>().map(|id| id.0.clone()),
        ))
    }
}

/// Middleware to validate the X-Client-Id header and inject the client id
pub async fn client_scope(mut req: Request, next: Next) -> Result<Response, (StatusCode, String)> {
    let client_id = req
        .headers()
        .get(CLIENT_ID_HEADER)
        .map(|v| v.to_str().map(str::to_string));

    match client_id {
        None => Ok(next.run(req).await),
        Some(Err(_)) => Err((StatusCode::BAD_REQUEST, "X-Client-Id must be visible ASCII".to_string())),
        Some(Ok(id)) => {
            validate_client_id(&id).map_err(|e| (StatusCode::BAD_REQUEST, e))?;
            req.extensions_mut().insert(ClientId(id));
            Ok(next.run(req).await)
        }
    }
}

// Client ids become part of decision store keys
pub fn validate_client_id(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err("X-Client-Id cannot be empty".to_string());
    }

    if id.len() > 128 {
        return Err("X-Client-Id is too long (Max: 128 characters)".to_string());
    }

    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.') {
        return Err("X-Client-Id can only contain letters, numbers, underscores, hyphens and dots".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_client_id() {
        assert!(validate_client_id("device-42_a.b").is_ok());
        assert!(validate_client_id("").is_err());
        assert!(validate_client_id("has:colon").is_err());
        assert!(validate_client_id(&"x".repeat(129)).is_err());
    }
}
