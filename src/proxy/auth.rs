//! Caller identity
//!
//! Session issuance lives outside the gateway; it only needs to map a bearer
//! token to a platform user. Tokens no resolver recognizes are treated as
//! the caller's own provider key and forwarded upstream unbilled.

use crate::domain::{ApiKey, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

/// Maps platform session tokens to users
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Option<UserId>;
}

/// Fixed token table for development and tests
#[derive(Clone, Default)]
pub struct StaticSessionResolver {
    sessions: HashMap<String, UserId>,
}

impl StaticSessionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries with an empty token or user are ignored
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let sessions = pairs
            .into_iter()
            .filter_map(|(token, user)| {
                let token = token.into().trim().to_string();
                let user = UserId::try_new(user.into()).ok()?;
                (!token.is_empty()).then_some((token, user))
            })
            .collect();
        Self { sessions }
    }

    pub fn with_session(mut self, token: impl Into<String>, user_id: UserId) -> Self {
        self.sessions.insert(token.into(), user_id);
        self
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl fmt::Debug for StaticSessionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticSessionResolver")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

#[async_trait]
impl SessionResolver for StaticSessionResolver {
    async fn resolve(&self, token: &str) -> Option<UserId> {
        self.sessions.get(token).cloned()
    }
}

/// Who is calling, as established by the identity middleware
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Platform user; usage is billed
    User(UserId),
    /// Caller-supplied provider key; usage is not billed
    Passthrough(ApiKey),
    Anonymous,
}

impl Identity {
    pub async fn from_bearer(resolver: &dyn SessionResolver, token: Option<&str>) -> Self {
        let Some(token) = token else {
            return Self::Anonymous;
        };

        if let Some(user_id) = resolver.resolve(token).await {
            return Self::User(user_id);
        }

        ApiKey::try_new(token.to_string())
            .map(Self::Passthrough)
            .unwrap_or(Self::Anonymous)
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::User(user_id) => Some(user_id),
            _ => None,
        }
    }

    /// Key to send upstream in place of the configured one
    pub fn credentials(&self) -> Option<&ApiKey> {
        match self {
            Self::Passthrough(key) => Some(key),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> StaticSessionResolver {
        StaticSessionResolver::from_pairs([("session-1", "user-1"), ("", "user-2"), ("session-3", " ")])
    }

    #[test]
    fn invalid_pairs_are_dropped() {
        assert_eq!(resolver().len(), 1);
    }

    #[tokio::test]
    async fn known_tokens_resolve_to_users() {
        let identity = Identity::from_bearer(&resolver(), Some("session-1")).await;
        assert_eq!(identity.user_id().map(|id| id.as_ref()), Some("user-1"));
        assert!(identity.credentials().is_none());
    }

    #[tokio::test]
    async fn unknown_tokens_pass_through_as_provider_keys() {
        let identity = Identity::from_bearer(&resolver(), Some("sk-live-abc")).await;
        assert_eq!(
            identity.credentials().map(|key| key.as_ref()),
            Some("sk-live-abc")
        );
        assert!(identity.user_id().is_none());
    }

    #[tokio::test]
    async fn missing_tokens_are_anonymous() {
        assert_eq!(
            Identity::from_bearer(&resolver(), None).await,
            Identity::Anonymous
        );
    }
}
