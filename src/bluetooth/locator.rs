//! Waiting for BlueZ to export an adapter.
//!
//! `bluetoothd` registers the adapter asynchronously, so when the service
//! starts at boot the object may not exist yet. The locator polls the
//! object registry a bounded number of times before giving up.

use std::time::Duration;

use log::{debug, info};
use smol_str::SmolStr;
use zbus::zvariant::OwnedObjectPath;

use crate::{
   dbus::{ADAPTER_IFACE, BluezBus, adapter_object_path},
   error::{Result, SinkError},
   event::{PropertyValue, PropertyWrite},
};

/// The adapter the service drives for the rest of its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterHandle {
   name: SmolStr,
   path: OwnedObjectPath,
}

impl AdapterHandle {
   pub fn new(name: impl Into<SmolStr>) -> Result<Self> {
      let name = name.into();
      let path = adapter_object_path(&name)?;
      Ok(Self { name, path })
   }

   pub fn name(&self) -> &str {
      &self.name
   }

   pub const fn path(&self) -> &OwnedObjectPath {
      &self.path
   }

   /// Builds a write of an `Adapter1` property on this adapter.
   pub fn write(&self, property: &'static str, value: impl Into<PropertyValue>) -> PropertyWrite {
      PropertyWrite::new(self.path.clone(), ADAPTER_IFACE, property, value)
   }
}

pub struct AdapterLocator<'a, B> {
   bus: &'a B,
   max_attempts: u32,
   delay: Duration,
}

impl<'a, B: BluezBus> AdapterLocator<'a, B> {
   pub const fn new(bus: &'a B, max_attempts: u32, delay: Duration) -> Self {
      Self {
         bus,
         max_attempts,
         delay,
      }
   }

   /// Polls until BlueZ exports an adapter.
   ///
   /// The first adapter by name wins; any others are ignored. Failed polls
   /// count as attempts that found nothing.
   pub async fn locate(&self) -> Result<AdapterHandle> {
      for attempt in 1..=self.max_attempts {
         if attempt > 1 {
            tokio::time::sleep(self.delay).await;
         }

         match self.bus.adapter_names().await {
            Ok(names) => {
               if let Some(name) = names.into_iter().next() {
                  let adapter = AdapterHandle::new(name)?;
                  info!("Using adapter {} (attempt {attempt})", adapter.name());
                  return Ok(adapter);
               }
               debug!("No adapter yet (attempt {attempt}/{})", self.max_attempts);
            },
            Err(e) => {
               debug!("Adapter poll failed (attempt {attempt}/{}): {e}", self.max_attempts);
            },
         }
      }

      Err(SinkError::AdapterNotFound {
         attempts: self.max_attempts,
      })
   }
}
