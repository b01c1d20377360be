//! User identity domain module.
//!
//! This crate contains the `User` aggregate and the third-party account link it
//! owns, implemented as deterministic domain logic (no IO, no storage, no crypto).
//! Tokens are plaintext here; encryption happens at the persistence edge.

pub mod events;
pub mod linked_account;
pub mod user;

pub use events::{
    AccountLinked, AccountReactivated, AccountUnlinked, LoggedIn, ProfileUpdated, UserCreated,
    UserEvent,
};
pub use linked_account::{LinkedAccount, LinkedAccountParts};
pub use user::{User, UserParts};
