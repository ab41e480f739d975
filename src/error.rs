//! Error types for the sink service.
//!
//! This module defines every error that can occur while driving BlueZ,
//! together with the policy that decides which of them are fatal and
//! which are logged and survived.

use smol_str::SmolStr;
use thiserror::Error;

/// Main error type for the sink service.
#[derive(Error, Debug)]
pub enum SinkError {
   #[error("D-Bus error: {0}")]
   DBus(#[from] zbus::Error),

   #[error("D-Bus method error: {0}")]
   DBusMethod(#[from] zbus::fdo::Error),

   #[error("Bluetooth error: {0}")]
   Bluetooth(#[from] bluer::Error),

   #[error("Invalid object path: {0}")]
   ObjectPath(#[from] zbus::zvariant::Error),

   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   #[error("No Bluetooth adapter found after {attempts} attempts. Is bluetooth.service running?")]
   AdapterNotFound { attempts: u32 },

   #[error("Agent already registered")]
   AgentAlreadyRegistered,

   #[error("Agent path {0} is already exported")]
   AgentPathInUse(SmolStr),

   #[error("Cannot write {0}")]
   UnsupportedValue(SmolStr),

   #[error("Not a BlueZ adapter or device: {0}")]
   UnknownObject(SmolStr),

   #[error("Property change subscription closed")]
   SubscriptionClosed,

   #[error("Could not determine config directory")]
   ConfigDirNotFound,

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("TOML serialization error: {0}")]
   TomlSerialize(#[from] toml::ser::Error),
}

/// Convenience type alias for Results with `SinkError`.
pub type Result<T> = std::result::Result<T, SinkError>;

/// The call sites at which a bus interaction can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Stage {
   #[strum(to_string = "load configuration")]
   LoadConfig,
   #[strum(to_string = "connect to the system bus")]
   Connect,
   #[strum(to_string = "export pairing agent")]
   ExportAgent,
   #[strum(to_string = "register pairing agent")]
   RegisterAgent,
   #[strum(to_string = "request default agent")]
   RequestDefaultAgent,
   #[strum(to_string = "locate adapter")]
   LocateAdapter,
   #[strum(to_string = "subscribe to property changes")]
   Subscribe,
   #[strum(to_string = "receive property changes")]
   ReceiveEvents,
}

/// What the service does with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
   /// Treated as success.
   Accept,
   /// Logged as a warning; execution continues.
   Warn,
   /// Reported and the process exits non-zero.
   Fatal,
}

/// A failure together with the call site it happened at.
#[derive(Error, Debug)]
#[error("Failed to {stage}: {source}")]
pub struct StageError {
   pub stage: Stage,
   pub source: SinkError,
}

impl StageError {
   /// `map_err` adapter tagging an error with `stage`.
   pub fn at<E: Into<SinkError>>(stage: Stage) -> impl FnOnce(E) -> Self {
      move |source| Self {
         stage,
         source: source.into(),
      }
   }

   pub fn disposition(&self) -> Disposition {
      disposition(self.stage, &self.source)
   }
}

/// Failure policy table.
///
/// Missing startup prerequisites (configuration, bus, adapter, subscription)
/// and a lost notification stream end the process. Agent problems are
/// survived. Property writes never reach this table: provisioning, trust
/// and re-arm failures are warned about where they happen.
pub fn disposition(stage: Stage, err: &SinkError) -> Disposition {
   match (stage, err) {
      (Stage::RegisterAgent, SinkError::AgentAlreadyRegistered) => Disposition::Accept,
      (
         Stage::LoadConfig
         | Stage::Connect
         | Stage::LocateAdapter
         | Stage::Subscribe
         | Stage::ReceiveEvents,
         _,
      ) => Disposition::Fatal,
      // agent export and promotion, rejected registration
      _ => Disposition::Warn,
   }
}
