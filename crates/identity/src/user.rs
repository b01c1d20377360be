//! User aggregate (state-based, event-raising).
//!
//! The user owns at most one third-party account link. The link slot moves through
//! `Unlinked → Linked(active) ⇄ Linked(inactive)`; relinking replaces the slot.

use chrono::{DateTime, Utc};

use vehiclelink_core::{
    DomainError, DomainResult, Email, Entity, EventBuffer, EventSource, ExternalId,
    TeslaAccountId, UserId,
};
use vehiclelink_events::EventMetadata;

use crate::events::{
    AccountLinked, AccountReactivated, AccountUnlinked, LoggedIn, ProfileUpdated, UserCreated,
    UserEvent,
};
use crate::linked_account::LinkedAccount;

// ─────────────────────────────────────────────────────────────────────────────
// User Aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// User aggregate.
///
/// # Invariants
/// - `external_id` and `created_at` never change after creation.
/// - At most one linked account; no history beyond the current slot.
/// - `last_login_at` only moves forward.
#[derive(Debug, Clone)]
pub struct User {
    id: UserId,
    external_id: ExternalId,
    email: Email,
    display_name: Option<String>,
    created_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
    linked_account: Option<LinkedAccount>,
    events: EventBuffer<UserEvent>,
}

/// Plain field set used by persistence mapping to rebuild a [`User`].
#[derive(Debug, Clone)]
pub struct UserParts {
    pub id: UserId,
    pub external_id: ExternalId,
    pub email: Email,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub linked_account: Option<LinkedAccount>,
}

fn normalize_display_name(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

impl User {
    /// Create a new user and raise `UserCreated`.
    ///
    /// Empty identifiers are already impossible: `ExternalId` and `Email` reject
    /// blank input at construction.
    pub fn create(external_id: ExternalId, email: Email, display_name: Option<String>) -> Self {
        let now = Utc::now();
        let mut user = Self {
            id: UserId::new(),
            external_id,
            email,
            display_name: normalize_display_name(display_name),
            created_at: now,
            last_login_at: None,
            linked_account: None,
            events: EventBuffer::new(),
        };

        let created = UserCreated {
            meta: EventMetadata::at(now),
            user_id: user.id,
            external_id: user.external_id.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
        };
        user.raise(UserEvent::Created(created));
        user
    }

    /// Rebuild from stored state without raising events. Persistence mapping only.
    pub fn from_persisted(parts: UserParts) -> Self {
        Self {
            id: parts.id,
            external_id: parts.external_id,
            email: parts.email,
            display_name: parts.display_name,
            created_at: parts.created_at,
            last_login_at: parts.last_login_at,
            linked_account: parts.linked_account,
            events: EventBuffer::new(),
        }
    }

    pub fn external_id(&self) -> &ExternalId {
        &self.external_id
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_login_at(&self) -> Option<DateTime<Utc>> {
        self.last_login_at
    }

    pub fn linked_account(&self) -> Option<&LinkedAccount> {
        self.linked_account.as_ref()
    }

    /// The linked account, if it is currently active.
    pub fn active_account(&self) -> Option<&LinkedAccount> {
        self.linked_account.as_ref().filter(|acc| acc.is_active)
    }

    pub fn has_active_link(&self) -> bool {
        self.active_account().is_some()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Profile
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace email and display name; raises `ProfileUpdated` with old and new values.
    ///
    /// Global email uniqueness is checked by the caller before invoking this.
    pub fn update_profile(&mut self, email: Email, display_name: Option<String>) {
        let display_name = normalize_display_name(display_name);

        let old_email = std::mem::replace(&mut self.email, email);
        let old_display_name = std::mem::replace(&mut self.display_name, display_name);

        let updated = ProfileUpdated {
            meta: EventMetadata::now(),
            user_id: self.id,
            old_email,
            new_email: self.email.clone(),
            old_display_name,
            new_display_name: self.display_name.clone(),
        };
        self.raise(UserEvent::ProfileUpdated(updated));
    }

    /// Record a successful login at the current time; raises `LoggedIn`.
    pub fn record_login(&mut self) {
        let now = Utc::now();
        // Clock skew must not move the timestamp backwards.
        let at = match self.last_login_at {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        self.last_login_at = Some(at);

        let logged_in = LoggedIn {
            meta: EventMetadata::at(now),
            user_id: self.id,
            logged_in_at: at,
        };
        self.raise(UserEvent::LoggedIn(logged_in));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Account link lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Link a third-party account; raises `AccountLinked`.
    ///
    /// Fails with `InvalidState` while another link is active. An empty or inactive
    /// slot is replaced by a fresh active link without tokens.
    pub fn link_account(&mut self, account_id: TeslaAccountId) -> DomainResult<()> {
        if let Some(current) = self.active_account() {
            return Err(DomainError::invalid_state(format!(
                "account {} is already linked",
                current.account_id
            )));
        }

        let now = Utc::now();
        self.linked_account = Some(LinkedAccount::new_active(account_id.clone(), now));

        let linked = AccountLinked {
            meta: EventMetadata::at(now),
            user_id: self.id,
            account_id,
        };
        self.raise(UserEvent::AccountLinked(linked));
        Ok(())
    }

    /// Sever the active link (soft delete); raises `AccountUnlinked`.
    ///
    /// Fails with `InvalidState` when nothing was ever linked. Unlinking an already
    /// inactive link succeeds without raising anything.
    pub fn unlink_account(&mut self) -> DomainResult<()> {
        let Some(account) = self.linked_account.as_mut() else {
            return Err(DomainError::invalid_state("no account is linked"));
        };

        if !account.is_active {
            return Ok(());
        }

        account.is_active = false;
        account.clear_tokens();
        let account_id = account.account_id.clone();

        let unlinked = AccountUnlinked {
            meta: EventMetadata::now(),
            user_id: self.id,
            account_id,
        };
        self.raise(UserEvent::AccountUnlinked(unlinked));
        Ok(())
    }

    /// Overwrite the link's tokens and expiry. Raises nothing.
    ///
    /// Works on active and inactive links alike and never reactivates.
    pub fn update_account_tokens(
        &mut self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let access_token = access_token.into();
        let refresh_token = refresh_token.into();
        if access_token.trim().is_empty() {
            return Err(DomainError::argument("access_token", "must not be empty"));
        }
        if refresh_token.trim().is_empty() {
            return Err(DomainError::argument("refresh_token", "must not be empty"));
        }

        let Some(account) = self.linked_account.as_mut() else {
            return Err(DomainError::invalid_state("no account is linked"));
        };

        account.access_token = Some(access_token);
        account.refresh_token = Some(refresh_token);
        account.token_expires_at = Some(expires_at);
        Ok(())
    }

    /// Switch an inactive link back on; raises `AccountReactivated`.
    pub fn reactivate_account(&mut self) -> DomainResult<()> {
        let Some(account) = self.linked_account.as_mut() else {
            return Err(DomainError::invalid_state("no account is linked"));
        };
        if account.is_active {
            return Err(DomainError::invalid_state("linked account is already active"));
        }

        account.is_active = true;
        let account_id = account.account_id.clone();

        let reactivated = AccountReactivated {
            meta: EventMetadata::now(),
            user_id: self.id,
            account_id,
        };
        self.raise(UserEvent::AccountReactivated(reactivated));
        Ok(())
    }

    /// Stamp the active link's `last_synced_at`. Raises nothing.
    pub fn record_account_sync(&mut self) -> DomainResult<()> {
        match self.linked_account.as_mut() {
            Some(account) if account.is_active => {
                account.last_synced_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(DomainError::invalid_state("no active account is linked")),
        }
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl EventSource for User {
    type Event = UserEvent;

    fn event_buffer(&self) -> &EventBuffer<UserEvent> {
        &self.events
    }

    fn event_buffer_mut(&mut self) -> &mut EventBuffer<UserEvent> {
        &mut self.events
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
