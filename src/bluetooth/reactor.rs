//! Reaction to devices connecting.
//!
//! Every `PropertiesChanged` signal under the adapter is run through
//! [`plan`]. A device whose `Connected` property turns `true` gets marked
//! trusted, so it can reconnect for audio later without being asked again,
//! and the adapter is made discoverable again for the next phone.
//!
//! The reactor keeps no record of devices it has seen. Trusting a device
//! twice is harmless, so a device that flaps simply triggers the same two
//! writes again.

use std::fmt;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use zbus::zvariant::OwnedObjectPath;

use crate::{
   bluetooth::locator::AdapterHandle,
   dbus::{BluezBus, DEVICE_IFACE},
   error::{Result, SinkError},
   event::{DeviceChangeEvent, PropertyValue, PropertyWrite},
};

/// Writes triggered by one device connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
   pub device: OwnedObjectPath,
   pub trust: PropertyWrite,
   pub rearm: PropertyWrite,
}

/// What actually happened for a [`Reaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
   pub device: OwnedObjectPath,
   pub trusted: bool,
   pub rearmed: bool,
}

impl fmt::Display for Outcome {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      if self.trusted {
         write!(f, "Device connected and trusted: {}", self.device.as_str())?;
      } else {
         write!(f, "Device connected but not trusted: {}", self.device.as_str())?;
      }
      if !self.rearmed {
         f.write_str(" (adapter no longer discoverable)")?;
      }
      Ok(())
   }
}

/// Decides whether `event` is a device connecting, and if so what to write.
///
/// Only `Device1` events whose changed set has `Connected = true` qualify.
/// Disconnects, RSSI and name updates, and adapter-level changes all yield
/// `None`.
pub fn plan(event: &DeviceChangeEvent, adapter: &AdapterHandle) -> Option<Reaction> {
   if event.interface != DEVICE_IFACE {
      return None;
   }
   if event.changed("Connected").and_then(PropertyValue::as_bool) != Some(true) {
      return None;
   }

   Some(Reaction {
      device: event.path.clone(),
      trust: PropertyWrite::new(event.path.clone(), DEVICE_IFACE, "Trusted", true),
      rearm: adapter.write("Discoverable", true),
   })
}

pub struct ConnectReactor<'a, B> {
   bus: &'a B,
   adapter: &'a AdapterHandle,
}

impl<'a, B: BluezBus> ConnectReactor<'a, B> {
   pub const fn new(bus: &'a B, adapter: &'a AdapterHandle) -> Self {
      Self { bus, adapter }
   }

   /// Handles one notification to completion.
   ///
   /// Both writes are attempted regardless of each other's result.
   pub async fn handle(&self, event: &DeviceChangeEvent) -> Option<Outcome> {
      let reaction = plan(event, self.adapter)?;
      let device = reaction.device.as_str();

      let trusted = match self.bus.set_property(&reaction.trust).await {
         Ok(()) => true,
         Err(e) => {
            warn!("Failed to trust {device}: {e}");
            false
         },
      };

      // Keep the adapter discoverable for the next phone
      let rearmed = match self.bus.set_property(&reaction.rearm).await {
         Ok(()) => true,
         Err(e) => {
            warn!("Failed to re-arm discoverable on {}: {e}", self.adapter.path().as_str());
            false
         },
      };

      Some(Outcome {
         device: reaction.device,
         trusted,
         rearmed,
      })
   }

   /// Processes notifications one at a time until the stream ends.
   ///
   /// The stream only ends if the bus connection goes away, which is
   /// reported as [`SinkError::SubscriptionClosed`].
   pub async fn run(&self, mut events: mpsc::Receiver<DeviceChangeEvent>) -> Result<()> {
      while let Some(event) = events.recv().await {
         match self.handle(&event).await {
            Some(outcome) => info!("{outcome}"),
            None => debug!("Ignoring {} change on {}", event.interface, event.path.as_str()),
         }
      }
      Err(SinkError::SubscriptionClosed)
   }
}
