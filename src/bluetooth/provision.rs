//! Startup adapter configuration.

use log::{info, warn};
use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::{
   bluetooth::locator::AdapterHandle,
   dbus::BluezBus,
   event::PropertyWrite,
};

/// Outcome of one provisioning pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
   pub applied: SmallVec<[&'static str; 4]>,
   pub failed: SmallVec<[&'static str; 4]>,
}

impl ProvisionReport {
   pub fn is_complete(&self) -> bool {
      self.failed.is_empty()
   }
}

/// Powers the adapter and makes it pairable, discoverable and named.
pub struct AdapterProvisioner<'a, B> {
   bus: &'a B,
   adapter: &'a AdapterHandle,
}

impl<'a, B: BluezBus> AdapterProvisioner<'a, B> {
   pub const fn new(bus: &'a B, adapter: &'a AdapterHandle) -> Self {
      Self { bus, adapter }
   }

   /// The writes applied at startup, in order.
   pub fn writes(&self, alias: &SmolStr) -> [PropertyWrite; 4] {
      [
         self.adapter.write("Powered", true),
         self.adapter.write("Pairable", true),
         self.adapter.write("Discoverable", true),
         self.adapter.write("Alias", alias.clone()),
      ]
   }

   /// Attempts every write once. A rejected write does not stop the
   /// remaining ones.
   pub async fn provision(&self, alias: &SmolStr) -> ProvisionReport {
      let mut report = ProvisionReport::default();

      for write in self.writes(alias) {
         match self.bus.set_property(&write).await {
            Ok(()) => report.applied.push(write.property),
            Err(e) => {
               warn!("Failed setting {}: {e}", write.property);
               report.failed.push(write.property);
            },
         }
      }

      if report.is_complete() {
         info!("Adapter {} ready as '{alias}'", self.adapter.name());
      } else {
         warn!(
            "Adapter {} partially provisioned, applied: [{}]",
            self.adapter.name(),
            report.applied.join(", ")
         );
      }
      report
   }
}
