//! Workflows: one unit of work per call, committed at most once.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument};
use validator::Validate;

use vehiclelink_core::{DomainError, Email, Entity, ExternalId, TeslaAccountId, UserId, VehicleId};
use vehiclelink_events::EventBus;
use vehiclelink_fleet::Vehicle;
use vehiclelink_identity::User;
use vehiclelink_infra::{
    DispatchedEvent, Store, TokenCipher, UnitOfWork, UnitOfWorkError, UserRepository,
    VehicleRepository,
};

use crate::dto::{
    expiry_from_now, LinkAccountRequest, RefreshTokensRequest, RenameVehicleRequest, SyncReport,
    UpdateProfileRequest, UserView, VehicleView,
};
use crate::error::{AppError, AppResult};
use crate::ports::{SessionValidator, VehicleApi};

/// Entry point for every user-facing workflow.
///
/// Cheap to share: all collaborators are behind `Arc`s and the bus is cloned into
/// each unit of work.
pub struct VehicleLinkService<S: ?Sized, B> {
    store: Arc<S>,
    cipher: Arc<TokenCipher>,
    bus: B,
    sessions: Arc<dyn SessionValidator>,
    vehicle_api: Arc<dyn VehicleApi>,
}

impl<S, B> VehicleLinkService<S, B>
where
    S: Store + ?Sized,
    B: EventBus<DispatchedEvent> + Clone,
{
    pub fn new(
        store: Arc<S>,
        cipher: Arc<TokenCipher>,
        bus: B,
        sessions: Arc<dyn SessionValidator>,
        vehicle_api: Arc<dyn VehicleApi>,
    ) -> Self {
        Self {
            store,
            cipher,
            bus,
            sessions,
            vehicle_api,
        }
    }

    fn unit_of_work(&self) -> UnitOfWork<S, B> {
        UnitOfWork::new(self.store.clone(), self.cipher.clone(), self.bus.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Identity
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolve a session to a user, creating the user on first sign-in.
    #[instrument(skip_all, err)]
    pub async fn sign_in(&self, session_token: &str) -> AppResult<UserView> {
        let claims = self
            .sessions
            .validate(session_token)
            .await
            .ok_or(AppError::Unauthorized)?;
        let external_id = ExternalId::new(&claims.subject).map_err(|_| AppError::Unauthorized)?;
        let email = Email::new(&claims.email).map_err(|_| AppError::Unauthorized)?;

        let mut uow = self.unit_of_work();
        let existing = uow.users().get_by_external_id(&external_id).await?;
        let is_new = existing.is_none();

        let mut user = match existing {
            Some(user) => user,
            None => {
                if uow.users().get_by_email(&email).await?.is_some() {
                    return Err(AppError::validation("email", "is already in use"));
                }
                User::create(external_id, email, claims.name)
            }
        };
        user.record_login();

        let view = UserView::from(&user);
        if is_new {
            uow.users().add(user);
        } else {
            uow.users().update(user);
        }
        commit(&mut uow).await?;

        info!(user_id = %view.id, created = is_new, "user signed in");
        Ok(view)
    }

    #[instrument(skip(self, request), fields(user_id = %user_id), err)]
    pub async fn update_profile(
        &self,
        user_id: UserId,
        request: UpdateProfileRequest,
    ) -> AppResult<UserView> {
        request.validate()?;
        let email = Email::new(&request.email)?;

        let mut uow = self.unit_of_work();
        let mut user = load_user(&mut uow, user_id).await?;

        if let Some(other) = uow.users().get_by_email(&email).await? {
            if other.id() != user.id() {
                return Err(AppError::validation("email", "is already in use"));
            }
        }

        user.update_profile(email, request.display_name);
        let view = UserView::from(&user);
        uow.users().update(user);
        commit(&mut uow).await?;

        info!(user_id = %user_id, "profile updated");
        Ok(view)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Linked account
    // ─────────────────────────────────────────────────────────────────────────

    /// Store the outcome of an OAuth consent.
    ///
    /// An empty or inactive slot is (re)linked; consenting again for the account
    /// that is already active only replaces its tokens. A different active account
    /// must be unlinked first.
    #[instrument(skip(self, request), fields(user_id = %user_id), err)]
    pub async fn complete_account_link(
        &self,
        user_id: UserId,
        request: LinkAccountRequest,
    ) -> AppResult<UserView> {
        request.validate()?;
        let account_id = TeslaAccountId::new(&request.account_id)?;

        let mut uow = self.unit_of_work();
        let mut user = load_user(&mut uow, user_id).await?;

        let reconsent = user
            .active_account()
            .is_some_and(|acc| acc.account_id() == &account_id);
        if !reconsent {
            user.link_account(account_id.clone())?;
        }
        user.update_account_tokens(
            request.access_token,
            request.refresh_token,
            expiry_from_now(request.expires_in_secs),
        )?;

        let view = UserView::from(&user);
        uow.users().update(user);
        commit(&mut uow).await?;

        info!(user_id = %user_id, account_id = %account_id, reconsent, "account linked");
        Ok(view)
    }

    #[instrument(skip(self, request), fields(user_id = %user_id), err)]
    pub async fn refresh_account_tokens(
        &self,
        user_id: UserId,
        request: RefreshTokensRequest,
    ) -> AppResult<()> {
        request.validate()?;

        let mut uow = self.unit_of_work();
        let mut user = load_user(&mut uow, user_id).await?;
        if !user.has_active_link() {
            return Err(DomainError::invalid_state("no active account is linked").into());
        }

        user.update_account_tokens(
            request.access_token,
            request.refresh_token,
            expiry_from_now(request.expires_in_secs),
        )?;
        uow.users().update(user);
        commit(&mut uow).await?;

        debug!(user_id = %user_id, "account tokens refreshed");
        Ok(())
    }

    /// Sever the account link. Unlinking an already inactive link succeeds.
    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn unlink_account(&self, user_id: UserId) -> AppResult<()> {
        let mut uow = self.unit_of_work();
        let mut user = load_user(&mut uow, user_id).await?;

        user.unlink_account()?;
        uow.users().update(user);
        commit(&mut uow).await?;

        info!(user_id = %user_id, "account unlinked");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Vehicles
    // ─────────────────────────────────────────────────────────────────────────

    /// Pull the account's vehicles from the vehicle API and link or refresh them.
    ///
    /// An expired access token must be refreshed first; the API is not called.
    /// Vehicles the user deactivated stay deactivated. An empty remote list changes
    /// nothing.
    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn sync_vehicles(&self, user_id: UserId) -> AppResult<SyncReport> {
        let mut uow = self.unit_of_work();
        let mut user = load_user(&mut uow, user_id).await?;

        let Some(account) = user.active_account() else {
            return Err(DomainError::invalid_state("no active account is linked").into());
        };
        let access_token = match account.access_token() {
            Some(token) if !account.token_expired(Utc::now()) => token,
            _ => {
                return Err(
                    DomainError::invalid_state("access token is missing or expired").into(),
                );
            }
        };
        let account_id = account.account_id().clone();

        let descriptors = self.vehicle_api.list_vehicles(access_token).await;
        if descriptors.is_empty() {
            debug!(user_id = %user_id, "vehicle api returned no vehicles");
            return Ok(SyncReport::default());
        }

        let mut report = SyncReport::default();
        let mut seen = HashSet::new();
        for descriptor in &descriptors {
            let Some(identifier) = descriptor.vehicle_identifier() else {
                debug!("skipping vehicle without identifier");
                continue;
            };
            if !seen.insert(identifier.to_string()) {
                continue;
            }

            let existing = uow
                .vehicles()
                .get_by_vehicle_identifier(&account_id, identifier)
                .await?;
            match existing {
                Some(mut vehicle) if vehicle.is_active() => {
                    if descriptor.display_name.is_some() {
                        vehicle.update_display_name(descriptor.display_name.clone());
                    }
                    vehicle.record_sync();
                    uow.vehicles().update(vehicle);
                    report.refreshed += 1;
                }
                Some(_) => {
                    debug!(vehicle_identifier = identifier, "skipping deactivated vehicle");
                }
                None => {
                    let mut vehicle = Vehicle::link(
                        account_id.clone(),
                        identifier,
                        descriptor.display_name.clone(),
                    )?;
                    vehicle.record_sync();
                    uow.vehicles().add(vehicle);
                    report.imported += 1;
                }
            }
        }

        user.record_account_sync()?;
        uow.users().update(user);
        commit(&mut uow).await?;

        info!(
            user_id = %user_id,
            imported = report.imported,
            refreshed = report.refreshed,
            "vehicles synced"
        );
        Ok(report)
    }

    /// Active vehicles of the user's active account; empty without one.
    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn list_vehicles(&self, user_id: UserId) -> AppResult<Vec<VehicleView>> {
        let mut uow = self.unit_of_work();
        let user = load_user(&mut uow, user_id).await?;

        let Some(account) = user.active_account() else {
            return Ok(Vec::new());
        };
        let vehicles = uow
            .vehicles()
            .get_by_owner_account_id(account.account_id())
            .await?;

        Ok(vehicles
            .iter()
            .filter(|v| v.is_active())
            .map(VehicleView::from)
            .collect())
    }

    #[instrument(skip(self, request), fields(user_id = %user_id, vehicle_id = %vehicle_id), err)]
    pub async fn rename_vehicle(
        &self,
        user_id: UserId,
        vehicle_id: VehicleId,
        request: RenameVehicleRequest,
    ) -> AppResult<VehicleView> {
        request.validate()?;

        let mut uow = self.unit_of_work();
        let user = load_user(&mut uow, user_id).await?;
        let mut vehicle = load_owned_vehicle(&mut uow, &user, vehicle_id).await?;

        vehicle.update_display_name(request.display_name);
        let view = VehicleView::from(&vehicle);
        uow.vehicles().update(vehicle);
        commit(&mut uow).await?;

        Ok(view)
    }

    /// Deactivate a vehicle. Repeating the call succeeds without changing anything.
    #[instrument(skip(self), fields(user_id = %user_id, vehicle_id = %vehicle_id), err)]
    pub async fn unlink_vehicle(&self, user_id: UserId, vehicle_id: VehicleId) -> AppResult<()> {
        let mut uow = self.unit_of_work();
        let user = load_user(&mut uow, user_id).await?;
        let mut vehicle = load_owned_vehicle(&mut uow, &user, vehicle_id).await?;

        match vehicle.deactivate() {
            Ok(()) => {}
            Err(e) if e.is_invalid_state() => {
                debug!(vehicle_id = %vehicle_id, "vehicle already inactive");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        uow.vehicles().update(vehicle);
        commit(&mut uow).await?;

        info!(user_id = %user_id, vehicle_id = %vehicle_id, "vehicle unlinked");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

async fn load_user<S, B>(uow: &mut UnitOfWork<S, B>, user_id: UserId) -> AppResult<User>
where
    S: Store + ?Sized,
    B: EventBus<DispatchedEvent>,
{
    uow.users()
        .get_by_id(user_id)
        .await?
        .ok_or(AppError::NotFound)
}

/// A vehicle outside the user's linked account is reported as missing.
async fn load_owned_vehicle<S, B>(
    uow: &mut UnitOfWork<S, B>,
    user: &User,
    vehicle_id: VehicleId,
) -> AppResult<Vehicle>
where
    S: Store + ?Sized,
    B: EventBus<DispatchedEvent>,
{
    let Some(account) = user.linked_account() else {
        return Err(AppError::NotFound);
    };
    let vehicle = uow.vehicles().get_by_id(vehicle_id).await?;
    match vehicle {
        Some(vehicle) if vehicle.tesla_account_id() == account.account_id() => Ok(vehicle),
        _ => Err(AppError::NotFound),
    }
}

/// Commit; a dispatch failure after a durable write still counts as success (the unit
/// of work has already logged it). Any other failure drops the tracked changes.
async fn commit<S, B>(uow: &mut UnitOfWork<S, B>) -> AppResult<()>
where
    S: Store + ?Sized,
    B: EventBus<DispatchedEvent>,
{
    match uow.commit().await {
        Ok(_) | Err(UnitOfWorkError::Dispatch { .. }) => Ok(()),
        Err(e) => {
            uow.discard_tracked();
            Err(e.into())
        }
    }
}
