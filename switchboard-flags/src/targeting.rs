//! Caller identity resolution.

use tracing::debug;

use switchboard_core::{CallerContext, IdentitySource, SessionId, TargetingIdentity};

/// Derives a stable targeting identity from what is known about a caller.
pub trait TargetingResolver: Send + Sync {
    fn resolve(&self, caller: &CallerContext) -> TargetingIdentity;
}

/// Authenticated user id first, then a valid session id, then a freshly
/// minted 128-bit session id.
///
/// A minted identity is marked [`IdentitySource::Minted`]; the web layer is
/// expected to hand its id back to the caller so later requests present it
/// as their session and stay sticky.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTargetingResolver;

impl TargetingResolver for DefaultTargetingResolver {
    fn resolve(&self, caller: &CallerContext) -> TargetingIdentity {
        let authenticated = caller
            .authenticated_user
            .as_deref()
            .map(str::trim)
            .filter(|user| !user.is_empty())
            .and_then(|user| {
                TargetingIdentity::new(user, caller.groups.clone(), IdentitySource::Authenticated)
                    .ok()
            });
        if let Some(identity) = authenticated {
            return identity;
        }

        if let Some(session) = caller.session_id.as_deref().and_then(SessionId::parse) {
            return TargetingIdentity::for_session(session, IdentitySource::Session);
        }

        let minted = SessionId::generate();
        debug!(session = %minted, "Minted anonymous session identity");
        TargetingIdentity::for_session(minted, IdentitySource::Minted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticated_user_wins() {
        let session = SessionId::generate().to_string();
        let ctx = CallerContext::authenticated("user-42")
            .with_session(session)
            .with_groups(["beta"]);
        let identity = DefaultTargetingResolver.resolve(&ctx);
        assert_eq!(identity.user_id(), "user-42");
        assert_eq!(identity.source(), IdentitySource::Authenticated);
        assert!(identity.groups().contains("beta"));
    }

    #[test]
    fn test_blank_authenticated_user_is_ignored() {
        let identity = DefaultTargetingResolver.resolve(&CallerContext::authenticated("  "));
        assert_eq!(identity.source(), IdentitySource::Minted);
    }

    #[test]
    fn test_session_is_reused() {
        let session = SessionId::generate();
        let ctx = CallerContext::anonymous().with_session(session.to_string());
        let first = DefaultTargetingResolver.resolve(&ctx);
        let second = DefaultTargetingResolver.resolve(&ctx);
        assert_eq!(first.user_id(), session.to_string());
        assert_eq!(first, second);
        assert_eq!(first.source(), IdentitySource::Session);
    }

    #[test]
    fn test_invalid_session_mints_new_identity() {
        let ctx = CallerContext::anonymous().with_session("forged-id");
        let identity = DefaultTargetingResolver.resolve(&ctx);
        assert!(identity.is_new_session());
        assert_ne!(identity.user_id(), "forged-id");
        assert!(SessionId::parse(identity.user_id()).is_some());
    }

    #[test]
    fn test_anonymous_callers_get_distinct_ids() {
        let a = DefaultTargetingResolver.resolve(&CallerContext::anonymous());
        let b = DefaultTargetingResolver.resolve(&CallerContext::anonymous());
        assert_ne!(a.user_id(), b.user_id());
        assert!(!a.user_id().is_empty());
    }
}
