//! Outbound collaborators the workflows depend on.
//!
//! Both are implemented outside this workspace (identity provider, vehicle API
//! client); tests use in-process fakes.

use serde::{Deserialize, Serialize};

/// Identity asserted by a validated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Stable subject identifier from the identity provider.
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
}

#[async_trait::async_trait]
pub trait SessionValidator: Send + Sync {
    /// `None` when the session token is invalid, expired or absent.
    async fn validate(&self, session_token: &str) -> Option<Claims>;
}

/// One vehicle as reported by the third-party vehicle API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleDescriptor {
    pub external_vehicle_id: String,
    pub vin: Option<String>,
    pub display_name: Option<String>,
    pub state: Option<String>,
}

impl VehicleDescriptor {
    /// The identifier a linked vehicle is stored under: the VIN when reported, else
    /// the external vehicle id. `None` when both are blank.
    pub fn vehicle_identifier(&self) -> Option<&str> {
        self.vin
            .as_deref()
            .map(str::trim)
            .filter(|vin| !vin.is_empty())
            .or_else(|| Some(self.external_vehicle_id.trim()).filter(|id| !id.is_empty()))
    }
}

#[async_trait::async_trait]
pub trait VehicleApi: Send + Sync {
    /// Vehicles visible to the access token. Empty on any non-success response.
    async fn list_vehicles(&self, access_token: &str) -> Vec<VehicleDescriptor>;
}
