//! In-memory [`BluezBus`] that records every remote call, plus a log
//! capture for asserting on the service's output lines.

use std::sync::Once;

use log::{Level, LevelFilter, Metadata, Record};
use parking_lot::Mutex;
use smol_str::SmolStr;
use tokio::sync::mpsc;
use zbus::zvariant::OwnedObjectPath;

use crate::{
   agent::PairingAgent,
   bluetooth::locator::AdapterHandle,
   dbus::{BluezBus, DEVICE_IFACE},
   error::{Result, SinkError},
   event::{DeviceChangeEvent, PropertyWrite},
};

pub const ADAPTER_NAME: &str = "hci0";
pub const ADAPTER_PATH: &str = "/org/bluez/hci0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusCall {
   AdapterNames,
   SetProperty(PropertyWrite),
   ExportAgent(OwnedObjectPath),
   RegisterAgent(OwnedObjectPath, SmolStr),
   RequestDefaultAgent(OwnedObjectPath),
   Subscribe(OwnedObjectPath),
}

#[derive(Default)]
struct State {
   calls: Vec<BusCall>,
   polls: u32,
   /// Number of empty polls before the adapter shows up; `None` means never.
   adapter_after: Option<u32>,
   failing_polls: u32,
   extra_adapters: Vec<SmolStr>,
   register_failure: Option<fn() -> SinkError>,
   request_default_fails: bool,
   failing_properties: Vec<&'static str>,
   queued_events: Vec<DeviceChangeEvent>,
}

#[derive(Default)]
pub struct FakeBus {
   state: Mutex<State>,
}

impl FakeBus {
   /// A bus on which no adapter ever appears.
   pub fn new() -> Self {
      Self::default()
   }

   /// A bus whose adapter is already present.
   pub fn with_adapter() -> Self {
      Self::with_adapter_after(0)
   }

   pub fn with_adapter_after(empty_polls: u32) -> Self {
      let bus = Self::new();
      bus.state.lock().adapter_after = Some(empty_polls);
      bus
   }

   pub fn add_adapter(&self, name: &str) {
      self.state.lock().extra_adapters.push(SmolStr::new(name));
   }

   /// The first `count` polls fail outright instead of coming back empty.
   pub fn fail_polls(&self, count: u32) {
      self.state.lock().failing_polls = count;
   }

   pub fn fail_register_with(&self, error: fn() -> SinkError) {
      self.state.lock().register_failure = Some(error);
   }

   pub fn fail_request_default(&self) {
      self.state.lock().request_default_fails = true;
   }

   /// Every write of `property`, on any object, fails.
   pub fn fail_property(&self, property: &'static str) {
      self.state.lock().failing_properties.push(property);
   }

   /// Delivered in order once the subscription is made, after which the
   /// stream ends.
   pub fn queue_event(&self, event: DeviceChangeEvent) {
      self.state.lock().queued_events.push(event);
   }

   pub fn calls(&self) -> Vec<BusCall> {
      self.state.lock().calls.clone()
   }

   pub fn polls(&self) -> u32 {
      self.state.lock().polls
   }

   pub fn writes(&self) -> Vec<PropertyWrite> {
      self
         .calls()
         .into_iter()
         .filter_map(|call| match call {
            BusCall::SetProperty(write) => Some(write),
            _ => None,
         })
         .collect()
   }
}

impl BluezBus for FakeBus {
   async fn adapter_names(&self) -> Result<Vec<SmolStr>> {
      let mut state = self.state.lock();
      state.calls.push(BusCall::AdapterNames);
      state.polls += 1;

      if state.polls <= state.failing_polls {
         return Err(zbus::Error::Failure("org.bluez is not running".into()).into());
      }

      let mut names = Vec::new();
      if state.adapter_after.is_some_and(|after| state.polls > after) {
         names.push(SmolStr::new_static(ADAPTER_NAME));
         names.extend(state.extra_adapters.iter().cloned());
      }
      Ok(names)
   }

   async fn set_property(&self, write: &PropertyWrite) -> Result<()> {
      let mut state = self.state.lock();
      state.calls.push(BusCall::SetProperty(write.clone()));
      if state.failing_properties.contains(&write.property) {
         return Err(bluez_failed());
      }
      Ok(())
   }

   async fn export_agent(&self, path: &OwnedObjectPath, _agent: PairingAgent) -> Result<()> {
      self.state.lock().calls.push(BusCall::ExportAgent(path.clone()));
      Ok(())
   }

   async fn register_agent(&self, path: &OwnedObjectPath, capability: &str) -> Result<()> {
      let mut state = self.state.lock();
      state
         .calls
         .push(BusCall::RegisterAgent(path.clone(), SmolStr::new(capability)));
      match state.register_failure {
         Some(error) => Err(error()),
         None => Ok(()),
      }
   }

   async fn request_default_agent(&self, path: &OwnedObjectPath) -> Result<()> {
      let mut state = self.state.lock();
      state.calls.push(BusCall::RequestDefaultAgent(path.clone()));
      if state.request_default_fails {
         return Err(bluez_failed());
      }
      Ok(())
   }

   async fn subscribe(
      &self,
      namespace: &OwnedObjectPath,
   ) -> Result<mpsc::Receiver<DeviceChangeEvent>> {
      let mut state = self.state.lock();
      state.calls.push(BusCall::Subscribe(namespace.clone()));

      let events = std::mem::take(&mut state.queued_events);
      let (tx, rx) = mpsc::channel(events.len().max(1));
      for event in events {
         let _ = tx.try_send(event);
      }
      Ok(rx)
   }
}

pub fn object_path(path: &str) -> OwnedObjectPath {
   OwnedObjectPath::try_from(path).unwrap()
}

pub fn adapter_path() -> OwnedObjectPath {
   object_path(ADAPTER_PATH)
}

pub fn adapter_handle() -> AdapterHandle {
   AdapterHandle::new(ADAPTER_NAME).unwrap()
}

pub fn agent_path() -> OwnedObjectPath {
   object_path("/bt/agent")
}

/// `suffix` fills in the last address byte, e.g. `"01"` for `AA_BB_CC_DD_EE_01`.
pub fn device_path(suffix: &str) -> OwnedObjectPath {
   object_path(&format!("{ADAPTER_PATH}/dev_AA_BB_CC_DD_EE_{suffix}"))
}

pub fn bluez_failed() -> SinkError {
   zbus::fdo::Error::Failed("org.bluez.Error.Failed".into()).into()
}

/// `PropertiesChanged` on `Device1` for `device` reporting `Connected`.
pub fn connected_event(device: &OwnedObjectPath, connected: bool) -> DeviceChangeEvent {
   DeviceChangeEvent::new(device.clone(), DEVICE_IFACE).with_change("Connected", connected)
}

static LOGS: Mutex<Vec<(Level, String)>> = Mutex::new(Vec::new());

struct CaptureLogger;

impl log::Log for CaptureLogger {
   fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
      true
   }

   fn log(&self, record: &Record<'_>) {
      LOGS.lock().push((record.level(), record.args().to_string()));
   }

   fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;

/// Installs the capturing logger. Records from every test end up in the
/// same buffer, so assertions should filter on something test-specific.
pub fn capture_logs() {
   static INIT: Once = Once::new();
   INIT.call_once(|| {
      let _ = log::set_logger(&LOGGER);
      log::set_max_level(LevelFilter::Debug);
   });
}

pub fn captured_logs() -> Vec<(Level, String)> {
   LOGS.lock().clone()
}
