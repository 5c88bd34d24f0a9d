use std::sync::Arc;

use anyhow::{Context, Result};
use sos_core::{
    NotifyChannel, PhoneNormalizer,
    channel::{DisabledChannel, TwilioChannel},
};
use tracing::{info, warn};

use super::{
    broadcaster::Broadcaster,
    config::Config,
    database::{RedisDirectory, RedisStore, init_redis},
    directory::{ContactDirectory, MemoryDirectory, SessionResolver},
    dispatcher::Dispatcher,
    store::{IncidentStore, MemoryStore},
};

pub struct AppState {
    pub config: Config,
    pub broadcaster: Arc<Broadcaster>,
    pub dispatcher: Dispatcher,
    pub sessions: Arc<dyn SessionResolver>,
    pub channel: Arc<dyn NotifyChannel>,
    pub normalizer: PhoneNormalizer,
}

/// The external collaborators the SOS core talks to.
pub struct Collaborators {
    pub contacts: Arc<dyn ContactDirectory>,
    pub sessions: Arc<dyn SessionResolver>,
    pub store: Arc<dyn IncidentStore>,
    pub channel: Arc<dyn NotifyChannel>,
}

impl AppState {
    pub async fn new() -> Result<Arc<Self>> {
        let config = Config::load()?;

        let channel: Arc<dyn NotifyChannel> = match config.twilio.clone() {
            Some(twilio) => Arc::new(TwilioChannel::new(twilio)),
            None => Arc::new(DisabledChannel),
        };

        let collaborators = match &config.redis_url {
            Some(redis_url) => {
                info!("Connecting to Redis...");
                let connection = init_redis(redis_url)
                    .await
                    .context("Failed to connect to Redis")?;
                let directory = Arc::new(RedisDirectory::new(connection.clone()));

                Collaborators {
                    contacts: directory.clone(),
                    sessions: directory,
                    store: Arc::new(RedisStore::new(connection)),
                    channel,
                }
            }
            None => {
                warn!("REDIS_URL not set, incidents are kept in memory only");
                let directory = Arc::new(MemoryDirectory::new());

                Collaborators {
                    contacts: directory.clone(),
                    sessions: directory,
                    store: Arc::new(MemoryStore::new()),
                    channel,
                }
            }
        };

        Self::with_collaborators(config, collaborators)
    }

    pub fn with_collaborators(config: Config, collaborators: Collaborators) -> Result<Arc<Self>> {
        let normalizer = PhoneNormalizer::new(&config.country_code)?;
        let broadcaster = Arc::new(Broadcaster::new(config.session_buffer));

        let dispatcher = Dispatcher::new(
            collaborators.contacts,
            collaborators.channel.clone(),
            collaborators.store,
            broadcaster.clone(),
            normalizer.clone(),
        );

        Ok(Arc::new(Self {
            config,
            broadcaster,
            dispatcher,
            sessions: collaborators.sessions,
            channel: collaborators.channel,
            normalizer,
        }))
    }
}
