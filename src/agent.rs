//! Zero-interaction BlueZ pairing agent.
//!
//! The agent answers every `org.bluez.Agent1` callback immediately and
//! approves everything. Together with the `NoInputNoOutput` capability this
//! makes phones fall back to Just Works pairing, so nobody has to confirm a
//! code on the headless side.

use log::{debug, info, warn};
use smol_str::SmolStr;
use zbus::{interface, zvariant::OwnedObjectPath};

use crate::{
   dbus::BluezBus,
   error::{Disposition, Stage, StageError, disposition},
};

/// Stateless responder exported at the agent path.
#[derive(Debug, Clone, Copy, Default)]
pub struct PairingAgent;

#[interface(name = "org.bluez.Agent1")]
impl PairingAgent {
   fn release(&self) {
      debug!("Agent released by BlueZ");
   }

   fn request_pin_code(&self, device: OwnedObjectPath) -> String {
      debug!("PIN code requested by {}, answering empty", device.as_str());
      String::new()
   }

   fn display_pin_code(&self, device: OwnedObjectPath, pincode: String) {
      debug!("PIN code for {}: {pincode}", device.as_str());
   }

   fn request_passkey(&self, device: OwnedObjectPath) -> u32 {
      debug!("Passkey requested by {}, answering 0", device.as_str());
      0
   }

   fn display_passkey(&self, device: OwnedObjectPath, passkey: u32, entered: u16) {
      debug!("Passkey for {}: {passkey:06} ({entered} entered)", device.as_str());
   }

   fn request_confirmation(&self, device: OwnedObjectPath, passkey: u32) {
      debug!("Confirming passkey {passkey:06} for {}", device.as_str());
   }

   fn request_authorization(&self, device: OwnedObjectPath) {
      debug!("Authorizing {}", device.as_str());
   }

   fn authorize_service(&self, device: OwnedObjectPath, uuid: String) {
      debug!("Authorizing service {uuid} for {}", device.as_str());
   }

   fn cancel(&self) {
      debug!("Pairing request cancelled");
   }
}

/// How the agent ended up registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
   Registered,
   /// BlueZ still held a registration for the path, e.g. from before a restart.
   AlreadyRegistered,
   /// BlueZ refused the registration. Default promotion was still requested,
   /// so a registration left over from earlier can keep working.
   Rejected,
}

/// Registers [`PairingAgent`] with `AgentManager1` and makes it the default.
pub struct AgentRegistrar<'a, B> {
   bus: &'a B,
   path: OwnedObjectPath,
   capability: SmolStr,
}

impl<'a, B: BluezBus> AgentRegistrar<'a, B> {
   pub const fn new(bus: &'a B, path: OwnedObjectPath, capability: SmolStr) -> Self {
      Self {
         bus,
         path,
         capability,
      }
   }

   /// Exports `agent`, registers it, and requests it as the default agent.
   ///
   /// A refused registration is logged and reported as
   /// [`Registration::Rejected`]; the default agent is requested either way.
   /// Export and promotion failures are returned.
   pub async fn register(
      &self,
      agent: PairingAgent,
   ) -> std::result::Result<Registration, StageError> {
      self
         .bus
         .export_agent(&self.path, agent)
         .await
         .map_err(StageError::at(Stage::ExportAgent))?;

      let registration = match self.bus.register_agent(&self.path, &self.capability).await {
         Ok(()) => Registration::Registered,
         Err(e) => match disposition(Stage::RegisterAgent, &e) {
            Disposition::Accept => Registration::AlreadyRegistered,
            _ => {
               warn!("{}", StageError::at(Stage::RegisterAgent)(e));
               Registration::Rejected
            },
         },
      };

      self
         .bus
         .request_default_agent(&self.path)
         .await
         .map_err(StageError::at(Stage::RequestDefaultAgent))?;

      info!(
         "Pairing agent {} at {} is the default agent ({registration:?})",
         self.capability,
         self.path.as_str()
      );
      Ok(registration)
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::{
      error::SinkError,
      testing::{BusCall, FakeBus, agent_path, bluez_failed},
   };

   fn registrar(bus: &FakeBus) -> AgentRegistrar<'_, FakeBus> {
      AgentRegistrar::new(bus, agent_path(), SmolStr::new_static("NoInputNoOutput"))
   }

   fn device() -> OwnedObjectPath {
      OwnedObjectPath::try_from("/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF").unwrap()
   }

   #[test]
   fn test_agent_never_waits_for_input() {
      let agent = PairingAgent;
      assert_eq!(agent.request_pin_code(device()), "");
      assert_eq!(agent.request_passkey(device()), 0);
      agent.request_confirmation(device(), 123_456);
      agent.request_authorization(device());
      agent.authorize_service(device(), "0000110b-0000-1000-8000-00805f9b34fb".into());
      agent.display_pin_code(device(), "0000".into());
      agent.display_passkey(device(), 42, 1);
      agent.cancel();
      agent.release();
   }

   #[tokio::test]
   async fn test_register_fresh() {
      let bus = FakeBus::new();
      let registrar = registrar(&bus);

      let registration = registrar.register(PairingAgent).await.unwrap();
      assert_eq!(registration, Registration::Registered);
      assert_eq!(
         bus.calls(),
         vec![
            BusCall::ExportAgent(agent_path()),
            BusCall::RegisterAgent(agent_path(), "NoInputNoOutput".into()),
            BusCall::RequestDefaultAgent(agent_path()),
         ]
      );
   }

   #[tokio::test]
   async fn test_register_already_registered_is_success() {
      let bus = FakeBus::new();
      bus.fail_register_with(|| SinkError::AgentAlreadyRegistered);
      let registrar = registrar(&bus);

      let registration = registrar.register(PairingAgent).await.unwrap();
      assert_eq!(registration, Registration::AlreadyRegistered);
      assert!(bus.calls().contains(&BusCall::RequestDefaultAgent(agent_path())));
   }

   #[tokio::test]
   async fn test_rejected_registration_still_requests_default() {
      let bus = FakeBus::new();
      bus.fail_register_with(bluez_failed);

      let registration = registrar(&bus).register(PairingAgent).await.unwrap();
      assert_eq!(registration, Registration::Rejected);
      assert_eq!(
         bus.calls(),
         vec![
            BusCall::ExportAgent(agent_path()),
            BusCall::RegisterAgent(agent_path(), "NoInputNoOutput".into()),
            BusCall::RequestDefaultAgent(agent_path()),
         ]
      );
   }

   #[tokio::test]
   async fn test_request_default_failure_is_reported() {
      let bus = FakeBus::new();
      bus.fail_request_default();
      let registrar = registrar(&bus);

      let failure = registrar.register(PairingAgent).await.unwrap_err();
      assert_eq!(failure.stage, Stage::RequestDefaultAgent);
      assert!(failure.to_string().starts_with("Failed to request default agent"));
   }
}
