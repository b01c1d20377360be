//! Third-party account link owned by a `User`.

use chrono::{DateTime, Utc};

use vehiclelink_core::TeslaAccountId;

/// A user's connection to a vehicle-telemetry account.
///
/// Only reachable through its owning [`User`](crate::User): the owner's methods are
/// the sole mutators, so the one-slot invariant cannot be bypassed. An inactive link
/// is a soft delete kept for audit; its tokens are cleared when it is severed.
#[derive(Clone, PartialEq, Eq)]
pub struct LinkedAccount {
    pub(crate) account_id: TeslaAccountId,
    pub(crate) linked_at: DateTime<Utc>,
    pub(crate) is_active: bool,
    pub(crate) access_token: Option<String>,
    pub(crate) refresh_token: Option<String>,
    pub(crate) token_expires_at: Option<DateTime<Utc>>,
    pub(crate) last_synced_at: Option<DateTime<Utc>>,
}

/// Plain field set used by persistence mapping to rebuild a [`LinkedAccount`].
#[derive(Debug, Clone)]
pub struct LinkedAccountParts {
    pub account_id: TeslaAccountId,
    pub linked_at: DateTime<Utc>,
    pub is_active: bool,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl LinkedAccount {
    pub(crate) fn new_active(account_id: TeslaAccountId, linked_at: DateTime<Utc>) -> Self {
        Self {
            account_id,
            linked_at,
            is_active: true,
            access_token: None,
            refresh_token: None,
            token_expires_at: None,
            last_synced_at: None,
        }
    }

    /// Rebuild from stored state. Persistence mapping only.
    pub fn from_persisted(parts: LinkedAccountParts) -> Self {
        Self {
            account_id: parts.account_id,
            linked_at: parts.linked_at,
            is_active: parts.is_active,
            access_token: parts.access_token,
            refresh_token: parts.refresh_token,
            token_expires_at: parts.token_expires_at,
            last_synced_at: parts.last_synced_at,
        }
    }

    pub fn account_id(&self) -> &TeslaAccountId {
        &self.account_id
    }

    pub fn linked_at(&self) -> DateTime<Utc> {
        self.linked_at
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn token_expires_at(&self) -> Option<DateTime<Utc>> {
        self.token_expires_at
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }

    /// Whether the access token is missing or expired at `now`.
    pub fn token_expired(&self, now: DateTime<Utc>) -> bool {
        match (self.access_token.as_ref(), self.token_expires_at) {
            (None, _) => true,
            (Some(_), Some(expires_at)) => expires_at <= now,
            (Some(_), None) => false,
        }
    }

    pub(crate) fn clear_tokens(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.token_expires_at = None;
    }
}

// Tokens never reach logs through `{:?}`.
impl core::fmt::Debug for LinkedAccount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LinkedAccount")
            .field("account_id", &self.account_id)
            .field("linked_at", &self.linked_at)
            .field("is_active", &self.is_active)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_expires_at", &self.token_expires_at)
            .field("last_synced_at", &self.last_synced_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn account() -> LinkedAccount {
        LinkedAccount::new_active(TeslaAccountId::new("tesla-9").unwrap(), Utc::now())
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let mut acc = account();
        acc.access_token = Some("AT-secret".to_string());
        acc.refresh_token = Some("RT-secret".to_string());

        let rendered = format!("{acc:?}");
        assert!(!rendered.contains("AT-secret"));
        assert!(!rendered.contains("RT-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn token_expiry_checks() {
        let now = Utc::now();
        let mut acc = account();
        assert!(acc.token_expired(now));

        acc.access_token = Some("AT".to_string());
        assert!(!acc.token_expired(now));

        acc.token_expires_at = Some(now - Duration::seconds(1));
        assert!(acc.token_expired(now));

        acc.token_expires_at = Some(now + Duration::hours(1));
        assert!(!acc.token_expired(now));
    }
}
