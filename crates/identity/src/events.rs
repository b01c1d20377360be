//! Events raised by the `User` aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vehiclelink_core::{Email, ExternalId, TeslaAccountId, UserId};
use vehiclelink_events::{Event, EventMetadata};

/// Event emitted when a user is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCreated {
    #[serde(flatten)]
    pub meta: EventMetadata,
    pub user_id: UserId,
    pub external_id: ExternalId,
    pub email: Email,
    pub display_name: Option<String>,
}

/// Event emitted when a user's profile changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdated {
    #[serde(flatten)]
    pub meta: EventMetadata,
    pub user_id: UserId,
    pub old_email: Email,
    pub new_email: Email,
    pub old_display_name: Option<String>,
    pub new_display_name: Option<String>,
}

/// Event emitted when a login is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedIn {
    #[serde(flatten)]
    pub meta: EventMetadata,
    pub user_id: UserId,
    pub logged_in_at: DateTime<Utc>,
}

/// Event emitted when a third-party account is linked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountLinked {
    #[serde(flatten)]
    pub meta: EventMetadata,
    pub user_id: UserId,
    pub account_id: TeslaAccountId,
}

/// Event emitted when an active link is severed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountUnlinked {
    #[serde(flatten)]
    pub meta: EventMetadata,
    pub user_id: UserId,
    pub account_id: TeslaAccountId,
}

/// Event emitted when an inactive link is switched back on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountReactivated {
    #[serde(flatten)]
    pub meta: EventMetadata,
    pub user_id: UserId,
    pub account_id: TeslaAccountId,
}

/// All user events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum UserEvent {
    Created(UserCreated),
    ProfileUpdated(ProfileUpdated),
    LoggedIn(LoggedIn),
    AccountLinked(AccountLinked),
    AccountUnlinked(AccountUnlinked),
    AccountReactivated(AccountReactivated),
}

impl UserEvent {
    pub fn user_id(&self) -> UserId {
        match self {
            UserEvent::Created(e) => e.user_id,
            UserEvent::ProfileUpdated(e) => e.user_id,
            UserEvent::LoggedIn(e) => e.user_id,
            UserEvent::AccountLinked(e) => e.user_id,
            UserEvent::AccountUnlinked(e) => e.user_id,
            UserEvent::AccountReactivated(e) => e.user_id,
        }
    }
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Created(_) => "identity.user.created",
            UserEvent::ProfileUpdated(_) => "identity.user.profile_updated",
            UserEvent::LoggedIn(_) => "identity.user.logged_in",
            UserEvent::AccountLinked(_) => "identity.user.account_linked",
            UserEvent::AccountUnlinked(_) => "identity.user.account_unlinked",
            UserEvent::AccountReactivated(_) => "identity.user.account_reactivated",
        }
    }

    fn metadata(&self) -> &EventMetadata {
        match self {
            UserEvent::Created(e) => &e.meta,
            UserEvent::ProfileUpdated(e) => &e.meta,
            UserEvent::LoggedIn(e) => &e.meta,
            UserEvent::AccountLinked(e) => &e.meta,
            UserEvent::AccountUnlinked(e) => &e.meta,
            UserEvent::AccountReactivated(e) => &e.meta,
        }
    }
}
