use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tower_cookies::cookie::time::Duration;
use tower_cookies::cookie::SameSite;
use tower_cookies::{Cookie, Cookies};

use crate::{
    config::{SameSiteMode, SessionConfig},
    error::{AppError, Result},
    models::session::{InvalidReason, RequestContext, SessionValidation, UserContext},
    state::AppState,
};

/// Builds the session cookie from the session settings.
pub fn session_cookie(config: &SessionConfig, value: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(config.cookie_name.clone(), value);
    cookie.set_http_only(true);
    cookie.set_path("/");
    cookie.set_max_age(Duration::seconds(config.max_age.num_seconds()));

    let same_site = match config.same_site {
        SameSiteMode::Strict => SameSite::Strict,
        SameSiteMode::Lax => SameSite::Lax,
        SameSiteMode::None => SameSite::None,
    };
    cookie.set_same_site(same_site);
    // Browsers drop SameSite=None cookies that are not Secure.
    if config.require_secure || config.same_site == SameSiteMode::None {
        cookie.set_secure(true);
    }

    cookie
}

/// Extracts the token from an `Authorization: Bearer <token>` header.
pub fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Whether `path` is on the allow-list. Entries match whole path segments,
/// so `/health` covers `/health/db` but not `/healthz`.
pub fn is_public(path: &str, public_paths: &[String]) -> bool {
    public_paths.iter().any(|prefix| {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        path == prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Whether the request reached us, or the proxy in front of us, over TLS.
pub fn is_secure(req: &Parts) -> bool {
    if req.uri.scheme_str() == Some("https") {
        return true;
    }
    req.headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}

/// The client address: first `X-Forwarded-For` hop, else the socket peer.
pub fn client_ip(req: &Parts) -> Option<String> {
    let forwarded = req
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }
    req.extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}

pub fn request_context(req: &Parts) -> RequestContext {
    RequestContext {
        ip_address: client_ip(req),
        user_agent: req
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

/// Extracts the client address and user agent of a request.
pub struct ClientContext(pub RequestContext);

impl<S: Send + Sync> FromRequestParts<S> for ClientContext {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        Ok(ClientContext(request_context(parts)))
    }
}

/// Resolves the identity behind a request.
///
/// Returns `Ok(None)` for public paths. The bearer header takes precedence
/// over the session cookie. A cookie session whose expiry was slid forward
/// gets its cookie re-issued with a fresh `Max-Age`.
pub async fn authenticate(
    state: &AppState,
    cookies: &Cookies,
    req: &Parts,
) -> Result<Option<UserContext>> {
    if is_public(req.uri.path(), &state.config.public_paths) {
        return Ok(None);
    }

    let session_config = state.sessions.config();
    if session_config.require_secure && !is_secure(req) {
        return Err(AppError::InsecureTransport);
    }

    let (token, from_cookie) = match extract_bearer(&req.headers) {
        Some(token) => (token, false),
        None => {
            let cookie = cookies
                .get(&session_config.cookie_name)
                .ok_or(AppError::NoSession)?;
            (cookie.value().to_string(), true)
        }
    };

    match state
        .sessions
        .validate_session(&token, &request_context(req))
        .await?
    {
        SessionValidation::Valid { session, renewed } => {
            if renewed && from_cookie {
                cookies.add(session_cookie(session_config, session.id.clone()));
            }
            Ok(Some(UserContext::from(&session)))
        }
        SessionValidation::Invalid(reason) => Err(AppError::InvalidSession(reason)),
    }
}

/// A middleware that requires a valid session outside the public paths.
///
/// On success the [`UserContext`] is attached to the request extensions.
pub async fn require_session(
    State(state): State<AppState>,
    cookies: Cookies,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    match authenticate(&state, &cookies, &parts).await {
        Ok(Some(user)) => {
            tracing::debug!("✅ Session accepted for user {}", user.user_id);
            parts.extensions.insert(user);
            next.run(Request::from_parts(parts, body)).await
        }
        Ok(None) => next.run(Request::from_parts(parts, body)).await,
        Err(err) => {
            // An address mismatch refuses the request but leaves the session alive.
            let ended = matches!(
                err,
                AppError::InvalidSession(ref reason) if *reason != InvalidReason::IpMismatch
            );
            if ended {
                let name = state.sessions.config().cookie_name.clone();
                if cookies.get(&name).is_some() {
                    let mut stale = Cookie::new(name, "");
                    stale.set_path("/");
                    cookies.remove(stale);
                }
            }
            err.into_response()
        }
    }
}
