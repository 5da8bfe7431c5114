//! Middleware — authentication extraction and security headers.

use axum::{
    extract::Request,
    http::header,
    middleware::Next,
    response::Response,
};
use courseforge_common::{error::ForgeError, models::user::UserRole};

use crate::auth;

/// Authentication context extracted from the Authorization header.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: uuid::Uuid,
    pub email: String,
    pub role: UserRole,
}

impl AuthContext {
    /// Creator-only endpoints (publishing, email programs, video batches).
    pub fn require_creator(&self) -> Result<(), ForgeError> {
        if self.role.can_publish() {
            Ok(())
        } else {
            Err(ForgeError::Forbidden)
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// True if this caller owns the resource or is staff.
    pub fn can_manage(&self, owner_id: uuid::Uuid) -> bool {
        self.user_id == owner_id || self.is_admin()
    }
}

/// Extract and validate the JWT from the Authorization: Bearer <token> header.
pub async fn auth_middleware(
    mut request: Request,
    next: Next,
) -> Result<Response, ForgeError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ForgeError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(ForgeError::Unauthorized)?;

    let config = courseforge_common::config::get();
    let claims = auth::validate_token(token, &config.auth.jwt_secret).map_err(|e| {
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => ForgeError::TokenExpired,
            _ => ForgeError::InvalidToken,
        }
    })?;

    // Ensure it's an access token, not a refresh token
    if claims.token_type != "access" {
        return Err(ForgeError::InvalidToken);
    }

    let user_id = claims
        .sub
        .parse::<uuid::Uuid>()
        .map_err(|_| ForgeError::InvalidToken)?;

    let auth_ctx = AuthContext {
        user_id,
        email: claims.email,
        role: claims.role,
    };

    // Insert auth context into request extensions for handlers to use
    request.extensions_mut().insert(auth_ctx);

    Ok(next.run(request).await)
}

// ── Security headers ──────────────────────────────────────────────────────────

/// Add security headers to every HTTP response.
///
/// Headers applied:
/// - `X-Content-Type-Options: nosniff`
/// - `X-Frame-Options: DENY`
/// - `Referrer-Policy: strict-origin-when-cross-origin`
/// - `Strict-Transport-Security` (max-age 2 years)
/// - `Content-Security-Policy` locked down for a JSON API
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let h = response.headers_mut();

    macro_rules! set {
        ($name:expr, $val:expr) => {
            if let Ok(v) = $val.parse::<axum::http::HeaderValue>() {
                h.insert($name, v);
            }
        };
    }

    set!(header::X_CONTENT_TYPE_OPTIONS, "nosniff");
    set!(header::X_FRAME_OPTIONS, "DENY");
    set!(header::REFERRER_POLICY, "strict-origin-when-cross-origin");
    set!(
        header::STRICT_TRANSPORT_SECURITY,
        "max-age=63072000; includeSubDomains"
    );
    set!(
        header::CONTENT_SECURITY_POLICY,
        "default-src 'none'; frame-ancestors 'none'"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(role: UserRole) -> AuthContext {
        AuthContext {
            user_id: uuid::Uuid::now_v7(),
            email: "someone@example.com".into(),
            role,
        }
    }

    #[test]
    fn only_creators_and_admins_pass_the_creator_gate() {
        assert!(ctx(UserRole::Student).require_creator().is_err());
        assert!(ctx(UserRole::Creator).require_creator().is_ok());
        assert!(ctx(UserRole::Admin).require_creator().is_ok());
    }

    #[test]
    fn admins_can_manage_anything() {
        let student = ctx(UserRole::Student);
        assert!(student.can_manage(student.user_id));
        assert!(!student.can_manage(uuid::Uuid::now_v7()));
        assert!(ctx(UserRole::Admin).can_manage(uuid::Uuid::now_v7()));
    }
}
