//! # SOS Core
//!
//! Shared pieces of the SafeHer SOS backend used by both the server and the CLI.
//!
//! - [`models`]: incidents, contacts and per-recipient delivery outcomes
//! - [`phone`]: stored phone strings to channel-ready addresses
//! - [`channel`]: outbound SMS through Twilio

pub mod channel;
pub mod models;
pub mod phone;

pub use channel::{ChannelError, DeliveryReceipt, NotifyChannel};
pub use models::{Contact, Identity, Incident, IncidentStatus, Location, RecipientOutcome};
pub use phone::{NormalizedAddress, PhoneError, PhoneNormalizer};
