//! Request and response shapes for the workflows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use vehiclelink_core::{Entity, UserId, VehicleId};
use vehiclelink_fleet::Vehicle;
use vehiclelink_identity::{LinkedAccount, User};

/// One year; longer-lived access tokens are rejected as implausible.
const MAX_EXPIRES_IN_SECS: i64 = 31_536_000;

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(max = 100, message = "must be at most 100 characters"))]
    pub display_name: Option<String>,
}

/// Completion of the OAuth consent flow for a third-party account.
#[derive(Clone, Deserialize, Validate)]
pub struct LinkAccountRequest {
    #[validate(length(min = 1, max = 200, message = "must be 1 to 200 characters"))]
    pub account_id: String,
    #[validate(length(min = 1, message = "access token is required"))]
    pub access_token: String,
    #[validate(length(min = 1, message = "refresh token is required"))]
    pub refresh_token: String,
    #[validate(range(min = 1, max = 31536000, message = "must be between 1 second and 1 year"))]
    pub expires_in_secs: i64,
}

#[derive(Clone, Deserialize, Validate)]
pub struct RefreshTokensRequest {
    #[validate(length(min = 1, message = "access token is required"))]
    pub access_token: String,
    #[validate(length(min = 1, message = "refresh token is required"))]
    pub refresh_token: String,
    #[validate(range(min = 1, max = 31536000, message = "must be between 1 second and 1 year"))]
    pub expires_in_secs: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RenameVehicleRequest {
    #[validate(length(max = 100, message = "must be at most 100 characters"))]
    pub display_name: Option<String>,
}

impl core::fmt::Debug for LinkAccountRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LinkAccountRequest")
            .field("account_id", &self.account_id)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_in_secs", &self.expires_in_secs)
            .finish()
    }
}

impl core::fmt::Debug for RefreshTokensRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RefreshTokensRequest")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_in_secs", &self.expires_in_secs)
            .finish()
    }
}

pub(crate) fn expiry_from_now(expires_in_secs: i64) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::seconds(expires_in_secs.clamp(0, MAX_EXPIRES_IN_SECS))
}

// ─────────────────────────────────────────────────────────────────────────────
// Views (never carry tokens)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkedAccountView {
    pub account_id: String,
    pub is_active: bool,
    pub linked_at: DateTime<Utc>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl From<&LinkedAccount> for LinkedAccountView {
    fn from(acc: &LinkedAccount) -> Self {
        Self {
            account_id: acc.account_id().as_str().to_string(),
            is_active: acc.is_active(),
            linked_at: acc.linked_at(),
            token_expires_at: acc.token_expires_at(),
            last_synced_at: acc.last_synced_at(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserView {
    pub id: UserId,
    pub email: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub linked_account: Option<LinkedAccountView>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: *user.id(),
            email: user.email().as_str().to_string(),
            display_name: user.display_name().map(str::to_string),
            created_at: user.created_at(),
            last_login_at: user.last_login_at(),
            linked_account: user.linked_account().map(LinkedAccountView::from),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleView {
    pub id: VehicleId,
    pub vehicle_identifier: String,
    pub display_name: Option<String>,
    pub linked_at: DateTime<Utc>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl From<&Vehicle> for VehicleView {
    fn from(vehicle: &Vehicle) -> Self {
        Self {
            id: *vehicle.id(),
            vehicle_identifier: vehicle.vehicle_identifier().to_string(),
            display_name: vehicle.display_name().map(str::to_string),
            linked_at: vehicle.linked_at(),
            last_synced_at: vehicle.last_synced_at(),
            is_active: vehicle.is_active(),
        }
    }
}

/// Outcome of a vehicle sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Vehicles linked for the first time.
    pub imported: usize,
    /// Already-linked active vehicles whose sync stamp was refreshed.
    pub refreshed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_request_validation() {
        let ok = UpdateProfileRequest {
            email: "a@x.com".to_string(),
            display_name: Some("Alice".to_string()),
        };
        assert!(ok.validate().is_ok());

        let bad = UpdateProfileRequest {
            email: "nope".to_string(),
            display_name: Some("x".repeat(101)),
        };
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("display_name"));
    }

    #[test]
    fn link_request_validation_and_redaction() {
        let req = LinkAccountRequest {
            account_id: "tesla-9".to_string(),
            access_token: "AT-secret".to_string(),
            refresh_token: "".to_string(),
            expires_in_secs: 0,
        };
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("refresh_token"));
        assert!(fields.contains_key("expires_in_secs"));
        assert!(!fields.contains_key("access_token"));

        assert!(!format!("{req:?}").contains("AT-secret"));
    }

    #[test]
    fn expiry_is_relative_to_now() {
        let before = Utc::now();
        let expires_at = expiry_from_now(3600);
        let delta = (expires_at - before).num_seconds();
        assert!((3599..=3601).contains(&delta));
    }
}
