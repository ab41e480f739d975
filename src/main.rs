//! Headless Bluetooth audio sink service
//!
//! This service drives BlueZ over the system D-Bus so that a device with no
//! display or keyboard can be paired from a phone: it registers a pairing
//! agent that approves everything, keeps the adapter powered, pairable and
//! discoverable, and trusts every device that connects.

use std::process::ExitCode;

use bluer::Session;
use log::{error, info};
use tokio::{select, signal};
use zbus::Connection;

use config::Config;
use dbus::SystemBus;
use error::{Stage, StageError};
use sink::SinkService;

mod agent;
mod bluetooth;
mod config;
mod dbus;
mod error;
mod event;
mod sink;
#[cfg(test)]
mod testing;

#[tokio::main]
async fn main() -> ExitCode {
   env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
      .target(env_logger::Target::Stdout)
      .init();

   info!("Starting btsinkd...");

   match run().await {
      Ok(()) => ExitCode::SUCCESS,
      Err(e) => {
         error!("{e}");
         ExitCode::FAILURE
      },
   }
}

async fn run() -> Result<(), StageError> {
   let config = Config::load().map_err(StageError::at(Stage::LoadConfig))?;
   info!(
      "Loaded configuration: alias '{}', capability {}",
      config.alias, config.capability
   );

   let session = Session::new().await.map_err(StageError::at(Stage::Connect))?;
   let connection = Connection::system()
      .await
      .map_err(StageError::at(Stage::Connect))?;
   let service = SinkService::new(SystemBus::new(session, connection), config);

   select! {
      result = service.run() => result,
      _ = signal::ctrl_c() => {
         info!("Shutting down btsinkd...");
         Ok(())
      }
   }
}
