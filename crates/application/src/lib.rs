//! Application layer: user-facing workflows over the identity and fleet aggregates.
//!
//! Each workflow opens one unit of work, validates its request, applies aggregate
//! operations and commits once. Errors leave this crate as [`AppError`] and are
//! rendered for a transport with [`ErrorResponse`].

pub mod dto;
pub mod error;
pub mod ports;
pub mod service;

pub use dto::{
    LinkAccountRequest, LinkedAccountView, RefreshTokensRequest, RenameVehicleRequest, SyncReport,
    UpdateProfileRequest, UserView, VehicleView,
};
pub use error::{AppError, AppResult, ErrorResponse, FieldErrors, REQUEST_FIELD};
pub use ports::{Claims, SessionValidator, VehicleApi, VehicleDescriptor};
pub use service::VehicleLinkService;
