//! # SOS Dispatcher
//!
//! Trigger flow:
//!
//! 1. Validate the location (nothing happens on a bad one)
//! 2. Load the caller's contacts
//! 3. Normalize and send to every contact; up to [`MAX_CONCURRENT_SENDS`] sends
//!    run at once, outcomes keep contact order, one failure never stops the others
//! 4. Persist the incident with the full outcome list
//! 5. Broadcast `sos:alert` to every connected client
//!
//! Failing to reach contacts is not a failed trigger: the caller always gets the
//! per-recipient list back. Failing to persist is, since it would leave no record
//! of the emergency.
use std::sync::Arc;

use futures::{StreamExt, stream};
use sos_core::{
    ChannelError, Contact, Identity, Incident, Location, NotifyChannel, PhoneNormalizer,
    RecipientOutcome, models::FailureReason,
};
use tracing::{info, warn};

use crate::{
    broadcaster::{AlertPayload, Broadcaster, ResolvedPayload},
    directory::ContactDirectory,
    error::AppError,
    store::{IncidentStore, ResolveOutcome},
    utils::alert_message,
};

/// Keeps a long contact list within the provider's request rate.
pub const MAX_CONCURRENT_SENDS: usize = 8;

pub struct Dispatcher {
    contacts: Arc<dyn ContactDirectory>,
    channel: Arc<dyn NotifyChannel>,
    store: Arc<dyn IncidentStore>,
    broadcaster: Arc<Broadcaster>,
    normalizer: PhoneNormalizer,
}

impl Dispatcher {
    pub fn new(
        contacts: Arc<dyn ContactDirectory>,
        channel: Arc<dyn NotifyChannel>,
        store: Arc<dyn IncidentStore>,
        broadcaster: Arc<Broadcaster>,
        normalizer: PhoneNormalizer,
    ) -> Self {
        Self {
            contacts,
            channel,
            store,
            broadcaster,
            normalizer,
        }
    }

    pub async fn trigger(
        &self,
        user: &Identity,
        lat: Option<f64>,
        lng: Option<f64>,
    ) -> Result<Incident, AppError> {
        let location = Location::checked(lat, lng).ok_or(AppError::InvalidLocation)?;

        let contacts = self.contacts.find_contacts_by_owner(&user.user_id).await?;
        info!(
            "SOS from {} at {},{}: notifying {} contacts",
            user.user_id,
            location.lat,
            location.lng,
            contacts.len()
        );

        let message = alert_message(&user.display_name, &location);
        let sends: Vec<_> = contacts
            .iter()
            .map(|contact| self.notify(contact, &message))
            .collect();
        let outcomes: Vec<RecipientOutcome> =
            stream::iter(sends)
                .buffered(MAX_CONCURRENT_SENDS)
                .collect()
                .await;

        let incident = Incident::new(&user.user_id, location, outcomes);
        self.store.insert(&incident).await?;

        self.broadcaster
            .broadcast_alert(AlertPayload {
                user_id: user.user_id.clone(),
                user_name: user.display_name.clone(),
                lat: location.lat,
                lng: location.lng,
                message: format!("{} has triggered SOS", user.display_name),
            })
            .await;

        Ok(incident)
    }

    async fn notify(&self, contact: &Contact, message: &str) -> RecipientOutcome {
        let address = match self.normalizer.normalize(&contact.raw_phone) {
            Ok(address) => address,
            Err(e) => {
                warn!("SMS skipped for {}: {e}", contact.display_name);
                return RecipientOutcome::failed(contact, FailureReason::InvalidFormat);
            }
        };

        info!("Sending SMS to {} at {address}", contact.display_name);

        match self.channel.send(&address, message).await {
            Ok(_) => RecipientOutcome::sent(contact),
            Err(e) => {
                warn!(
                    "SMS failed for {} ({}): {e}",
                    contact.display_name, contact.raw_phone
                );

                let reason = match e {
                    ChannelError::UnverifiedRecipient(_) => FailureReason::UnverifiedRecipient,
                    ChannelError::ChannelFailure(_) => FailureReason::DeliveryFailed,
                };
                RecipientOutcome::failed(contact, reason)
            }
        }
    }

    /// Idempotent for the owner; resolving twice still succeeds.
    pub async fn resolve(&self, user: &Identity, incident_id: &str) -> Result<(), AppError> {
        match self.store.resolve(incident_id, &user.user_id).await? {
            ResolveOutcome::NotFound => Err(AppError::NotFound),
            ResolveOutcome::Forbidden => Err(AppError::Forbidden),
            ResolveOutcome::Resolved => {
                self.broadcaster
                    .broadcast_resolved(ResolvedPayload {
                        user_id: user.user_id.clone(),
                        sos_id: incident_id.to_string(),
                    })
                    .await;

                Ok(())
            }
        }
    }

    pub async fn list_incidents(&self, user: &Identity) -> Result<Vec<Incident>, AppError> {
        Ok(self.store.find_by_owner(&user.user_id).await?)
    }
}
