use std::{fmt, sync::Arc};

use anyhow::bail;
use axum::http::{HeaderMap, header::AUTHORIZATION};
use futures::{FutureExt, future::BoxFuture};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AuthConfig;

/// Authenticated caller; every persisted row is scoped by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Extract the credential from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Resolves a bearer credential to a user. `None` means the caller is not
/// authenticated; resolvers never fail the request themselves.
pub trait IdentityResolver: Send + Sync {
    fn resolve<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Option<UserId>>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
}

/// Verifies HS256 access tokens signed with the project secret.
pub struct JwtResolver {
    key: DecodingKey,
    validation: Validation,
}

impl JwtResolver {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::default();
        // hosted auth tokens carry an audience we do not pin
        validation.validate_aud = false;
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl IdentityResolver for JwtResolver {
    fn resolve<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Option<UserId>> {
        let user = match decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) => Uuid::parse_str(&data.claims.sub).ok().map(UserId),
            Err(e) => {
                debug!("rejecting token: {e}");
                None
            }
        };
        futures::future::ready(user).boxed()
    }
}

/// Mint a token accepted by [`JwtResolver`] for the same secret.
pub fn issue_token(secret: &[u8], user: UserId, ttl: time::Duration) -> anyhow::Result<String> {
    let exp = (time::OffsetDateTime::now_utc() + ttl).unix_timestamp();
    let claims = Claims {
        sub: user.to_string(),
        exp,
    };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))?;
    Ok(token)
}

/// Asks the hosted auth service who owns the token (`GET {url}/auth/v1/user`).
pub struct RemoteResolver {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct RemoteUser {
    id: Uuid,
}

impl RemoteResolver {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            api_key,
        }
    }

    async fn lookup(&self, token: &str) -> Option<UserId> {
        let endpoint = format!("{}/auth/v1/user", self.url.trim_end_matches('/'));
        let mut request = self.client.get(endpoint).bearer_auth(token);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("auth service unreachable: {e}");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!("auth service rejected token: {}", response.status());
            return None;
        }
        response.json::<RemoteUser>().await.ok().map(|u| UserId(u.id))
    }
}

impl IdentityResolver for RemoteResolver {
    fn resolve<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Option<UserId>> {
        self.lookup(token).boxed()
    }
}

pub fn resolver_from_config(config: &AuthConfig) -> anyhow::Result<Arc<dyn IdentityResolver>> {
    if let Some(secret) = &config.jwt_secret {
        return Ok(Arc::new(JwtResolver::new(secret.as_bytes())));
    }
    if let Some(url) = &config.url {
        return Ok(Arc::new(RemoteResolver::new(url.clone(), config.api_key.clone())));
    }
    bail!("no identity resolver configured: set auth.jwt_secret or auth.url")
}
