//! Session tokens: announcement, refresh, revocation, resumption.
//!
//! Tokens are session *identifiers*, not credentials: possession alone never
//! grants identity unless the server's resume policy says so. Every token is
//! bound to the canonicalized origin it was announced on; a resume from a
//! different origin is rejected indistinguishably from an unknown token.
//!
//! The registry is shared across connections and logically single-writer:
//! the server wraps it in a lock, the methods here are synchronous.

use std::{collections::HashMap, time::Duration};

use hackvr_proto::{SessionToken, UserId};

use crate::{error::ResumeOutcome, origin::Origin};

/// Default server-side token lifetime between refreshes.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60 * 60 * 24);

/// What `resume-session` grants on a token match.
///
/// Resumption semantics are server-defined; the conservative default makes a
/// matched token restore the session association but still demands a fresh
/// authentication cycle before any non-anonymous identity applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResumePolicy {
    /// A matched token restores the stored identity directly.
    TrustToken,
    /// A matched token only proves continuity; identity requires re-auth.
    #[default]
    RequireReauth,
}

/// One announced session.
#[derive(Debug, Clone)]
struct SessionRecord<I> {
    origin: Origin,
    user: UserId,
    expires_at: I,
}

/// Server-wide registry of announced tokens.
///
/// Generic over the instant type so expiry is testable on a virtual clock.
#[derive(Debug)]
pub struct SessionRegistry<I> {
    records: HashMap<SessionToken, SessionRecord<I>>,
    ttl: Duration,
    policy: ResumePolicy,
}

impl<I> SessionRegistry<I>
where
    I: Copy + Ord + std::ops::Add<Duration, Output = I>,
{
    /// New registry with the given TTL and resume policy.
    #[must_use]
    pub fn new(ttl: Duration, policy: ResumePolicy) -> Self {
        Self { records: HashMap::new(), ttl, policy }
    }

    /// Announce `token` for a connection bound to `origin` as `user`.
    ///
    /// Announcing a token that is already registered refreshes its expiry
    /// (and rebinds identity); announcing a *different* token for the same
    /// connection is the caller's cue to forget the old one via
    /// [`SessionRegistry::invalidate`].
    pub fn announce(&mut self, token: SessionToken, origin: Origin, user: UserId, now: I) {
        self.records
            .insert(token, SessionRecord { origin, user, expires_at: now + self.ttl });
    }

    /// Drop a token, world-wide. Backs `revoke-session` and supersession.
    pub fn invalidate(&mut self, token: &SessionToken) {
        self.records.remove(token);
    }

    /// Handle `resume-session` from a connection bound to `origin`.
    pub fn resume(&mut self, token: &SessionToken, origin: &Origin, now: I) -> ResumeOutcome {
        let Some(record) = self.records.get(token) else {
            return ResumeOutcome::Rejected;
        };
        if record.expires_at < now || record.origin != *origin {
            // Expired and wrong-origin collapse into the same answer.
            return ResumeOutcome::Rejected;
        }
        match self.policy {
            ResumePolicy::TrustToken => ResumeOutcome::Resumed { user: record.user.clone() },
            ResumePolicy::RequireReauth => ResumeOutcome::ReauthRequired,
        }
    }

    /// Drop everything past its expiry.
    pub fn sweep(&mut self, now: I) {
        self.records.retain(|_, record| record.expires_at >= now);
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no tokens are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Per-connection view of the announced token.
///
/// Tracks which token the server last announced on this connection so a
/// re-announcement can invalidate the predecessor.
#[derive(Debug, Default, Clone)]
pub struct AnnouncedToken {
    current: Option<SessionToken>,
}

impl AnnouncedToken {
    /// Record an announcement. Returns the superseded token, which the
    /// caller must invalidate in the registry, or `None` when the
    /// announcement refreshes the same token.
    pub fn announce(&mut self, token: SessionToken) -> Option<SessionToken> {
        match self.current.replace(token) {
            Some(previous) if previous != token => Some(previous),
            _ => None,
        }
    }

    /// The currently announced token.
    #[must_use]
    pub fn current(&self) -> Option<&SessionToken> {
        self.current.as_ref()
    }

    /// Process a revocation: forget the token if it is the current one.
    pub fn revoke(&mut self, token: &SessionToken) {
        if self.current.as_ref() == Some(token) {
            self.current = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hackvr_proto::SessionToken;
    use url::Url;

    use super::*;

    type Instant = Duration;

    fn origin(url: &str) -> Origin {
        Origin::from_url(&Url::parse(url).unwrap()).unwrap()
    }

    fn token(fill: u8) -> SessionToken {
        SessionToken::from_bytes([fill; 32])
    }

    fn alice() -> UserId {
        UserId::parse("alice").unwrap()
    }

    fn t(secs: u64) -> Instant {
        Duration::from_secs(secs)
    }

    #[test]
    fn resume_honors_origin_binding() {
        let mut registry = SessionRegistry::new(Duration::from_secs(3600), ResumePolicy::TrustToken);
        registry.announce(token(1), origin("hackvr://example/world"), alice(), t(0));

        assert_eq!(
            registry.resume(&token(1), &origin("hackvr://example/world"), t(10)),
            ResumeOutcome::Resumed { user: alice() }
        );
        // Same token, different path: indistinguishable from unknown.
        assert_eq!(
            registry.resume(&token(1), &origin("hackvr://example/other"), t(10)),
            ResumeOutcome::Rejected
        );
        assert_eq!(
            registry.resume(&token(2), &origin("hackvr://example/world"), t(10)),
            ResumeOutcome::Rejected
        );
    }

    #[test]
    fn default_policy_requires_reauth() {
        let mut registry =
            SessionRegistry::new(Duration::from_secs(3600), ResumePolicy::default());
        registry.announce(token(1), origin("hackvr://example/world"), alice(), t(0));
        assert_eq!(
            registry.resume(&token(1), &origin("hackvr://example/world"), t(10)),
            ResumeOutcome::ReauthRequired
        );
    }

    #[test]
    fn expiry_and_refresh() {
        let mut registry = SessionRegistry::new(Duration::from_secs(100), ResumePolicy::TrustToken);
        registry.announce(token(1), origin("hackvr://example/world"), alice(), t(0));

        assert_eq!(
            registry.resume(&token(1), &origin("hackvr://example/world"), t(150)),
            ResumeOutcome::Rejected
        );

        // Re-announcing the same token refreshes the expiry.
        registry.announce(token(1), origin("hackvr://example/world"), alice(), t(150));
        assert!(matches!(
            registry.resume(&token(1), &origin("hackvr://example/world"), t(200)),
            ResumeOutcome::Resumed { .. }
        ));
    }

    #[test]
    fn revocation_is_world_wide() {
        let mut registry = SessionRegistry::new(Duration::from_secs(100), ResumePolicy::TrustToken);
        registry.announce(token(1), origin("hackvr://example/world"), alice(), t(0));
        registry.invalidate(&token(1));
        assert_eq!(
            registry.resume(&token(1), &origin("hackvr://example/world"), t(1)),
            ResumeOutcome::Rejected
        );
    }

    #[test]
    fn reannouncement_supersedes_previous_token() {
        let mut announced = AnnouncedToken::default();
        assert_eq!(announced.announce(token(1)), None);
        // Identical token: a refresh, nothing to invalidate.
        assert_eq!(announced.announce(token(1)), None);
        // Different token: the old one must die.
        assert_eq!(announced.announce(token(2)), Some(token(1)));
        assert_eq!(announced.current(), Some(&token(2)));
    }

    #[test]
    fn sweep_drops_expired_records() {
        let mut registry = SessionRegistry::new(Duration::from_secs(10), ResumePolicy::TrustToken);
        registry.announce(token(1), origin("hackvr://example/a"), alice(), t(0));
        registry.announce(token(2), origin("hackvr://example/b"), alice(), t(100));
        registry.sweep(t(50));
        assert_eq!(registry.len(), 1);
    }
}
