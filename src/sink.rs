//! The provisioning pipeline.
//!
//! Startup runs strictly in order: register the agent, find the adapter,
//! provision it, and only then subscribe to property changes. Subscribing
//! last means no device can connect before the adapter is discoverable.

use log::{info, warn};
use tokio::sync::mpsc;

use crate::{
   agent::{AgentRegistrar, PairingAgent},
   bluetooth::{
      locator::{AdapterHandle, AdapterLocator},
      provision::AdapterProvisioner,
      reactor::ConnectReactor,
   },
   config::Config,
   dbus::BluezBus,
   error::{Disposition, Stage, StageError},
   event::DeviceChangeEvent,
};

/// Drives one BlueZ instance for the lifetime of the process.
pub struct SinkService<B> {
   bus: B,
   config: Config,
}

impl<B: BluezBus> SinkService<B> {
   pub const fn new(bus: B, config: Config) -> Self {
      Self { bus, config }
   }

   #[cfg(test)]
   pub const fn bus(&self) -> &B {
      &self.bus
   }

   /// Runs every startup stage and returns the adapter and its subscription.
   pub async fn start(
      &self,
   ) -> std::result::Result<(AdapterHandle, mpsc::Receiver<DeviceChangeEvent>), StageError> {
      let agent_path = self
         .config
         .agent_object_path()
         .map_err(StageError::at(Stage::LoadConfig))?;

      let registrar = AgentRegistrar::new(&self.bus, agent_path, self.config.capability.clone());
      if let Err(e) = registrar.register(PairingAgent).await {
         match e.disposition() {
            Disposition::Fatal => return Err(e),
            _ => warn!("{e}"),
         }
      }

      let adapter = AdapterLocator::new(
         &self.bus,
         self.config.discovery_attempts,
         self.config.discovery_delay(),
      )
      .locate()
      .await
      .map_err(StageError::at(Stage::LocateAdapter))?;

      AdapterProvisioner::new(&self.bus, &adapter)
         .provision(&self.config.alias)
         .await;

      let events = self
         .bus
         .subscribe(adapter.path())
         .await
         .map_err(StageError::at(Stage::Subscribe))?;

      info!(
         "Ready. Pair your phone with '{}' and select it as audio output.",
         self.config.alias
      );
      Ok((adapter, events))
   }

   /// Starts up, then reacts to connections until the subscription ends.
   pub async fn run(&self) -> std::result::Result<(), StageError> {
      let (adapter, events) = self.start().await?;
      ConnectReactor::new(&self.bus, &adapter)
         .run(events)
         .await
         .map_err(StageError::at(Stage::ReceiveEvents))
   }
}
