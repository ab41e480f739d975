//! BlueZ access over the system D-Bus.
//!
//! [`BluezBus`] is the narrow contract the rest of the service is written
//! against: adapter enumeration, property writes, agent export and
//! registration, and a `PropertiesChanged` subscription. [`SystemBus`]
//! implements it with a bluer session for adapters and devices, and a zbus
//! connection for the agent object and the signal subscription.

use std::collections::HashMap;

use bluer::{Address, Session};
use futures::stream::StreamExt;
use log::{debug, warn};
use smol_str::SmolStr;
use tokio::sync::mpsc;
use zbus::{
   Connection, MatchRule, Message, MessageStream,
   message::Type as MessageType,
   proxy,
   zvariant::{ObjectPath, OwnedObjectPath, OwnedValue},
};

use crate::{
   agent::PairingAgent,
   error::{Result, SinkError},
   event::{DeviceChangeEvent, PropertyValue, PropertyWrite},
};

pub const ADAPTER_IFACE: &str = "org.bluez.Adapter1";
pub const DEVICE_IFACE: &str = "org.bluez.Device1";
const BLUEZ_ROOT: &str = "/org/bluez/";
const PROPERTIES_IFACE: &str = "org.freedesktop.DBus.Properties";
const PROPERTIES_CHANGED: &str = "PropertiesChanged";

/// Error BlueZ returns from `RegisterAgent` when the path is already registered
const ALREADY_EXISTS: &str = "org.bluez.Error.AlreadyExists";

/// Property change queue depth
const CHANNEL_BUFFER_SIZE: usize = 256;

#[proxy(
   interface = "org.bluez.AgentManager1",
   default_service = "org.bluez",
   default_path = "/org/bluez"
)]
trait AgentManager1 {
   fn register_agent(&self, agent: &ObjectPath<'_>, capability: &str) -> zbus::Result<()>;

   fn request_default_agent(&self, agent: &ObjectPath<'_>) -> zbus::Result<()>;
}

/// Object path BlueZ exports an adapter at.
pub fn adapter_object_path(name: &str) -> Result<OwnedObjectPath> {
   Ok(OwnedObjectPath::try_from(format!("{BLUEZ_ROOT}{name}"))?)
}

/// A BlueZ object identified from its object path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BluezObject {
   /// `/org/bluez/hci0`
   Adapter(SmolStr),
   /// `/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF`
   Device(SmolStr, Address),
}

impl BluezObject {
   pub fn from_path(path: &str) -> Option<Self> {
      let rest = path.strip_prefix(BLUEZ_ROOT)?;
      match rest.split_once('/') {
         None if !rest.is_empty() => Some(Self::Adapter(SmolStr::new(rest))),
         None => None,
         Some((adapter, device)) => {
            let address = device.strip_prefix("dev_")?.replace('_', ":").parse().ok()?;
            Some(Self::Device(SmolStr::new(adapter), address))
         },
      }
   }
}

/// Remote operations the service needs from BlueZ.
pub trait BluezBus {
   /// Names of the adapters BlueZ currently exports, sorted.
   async fn adapter_names(&self) -> Result<Vec<SmolStr>>;

   async fn set_property(&self, write: &PropertyWrite) -> Result<()>;

   /// Publishes the agent so BlueZ can call into it.
   async fn export_agent(&self, path: &OwnedObjectPath, agent: PairingAgent) -> Result<()>;

   /// Fails with [`SinkError::AgentAlreadyRegistered`] when BlueZ already
   /// holds a registration for `path`.
   async fn register_agent(&self, path: &OwnedObjectPath, capability: &str) -> Result<()>;

   async fn request_default_agent(&self, path: &OwnedObjectPath) -> Result<()>;

   /// Delivers every `PropertiesChanged` signal emitted at or below
   /// `namespace`, in arrival order.
   async fn subscribe(
      &self,
      namespace: &OwnedObjectPath,
   ) -> Result<mpsc::Receiver<DeviceChangeEvent>>;
}

/// [`BluezBus`] backed by the system bus.
pub struct SystemBus {
   session: Session,
   connection: Connection,
}

impl SystemBus {
   pub const fn new(session: Session, connection: Connection) -> Self {
      Self {
         session,
         connection,
      }
   }
}

impl BluezBus for SystemBus {
   async fn adapter_names(&self) -> Result<Vec<SmolStr>> {
      let mut names: Vec<SmolStr> = self
         .session
         .adapter_names()
         .await?
         .into_iter()
         .map(SmolStr::from)
         .collect();
      names.sort_unstable();
      Ok(names)
   }

   async fn set_property(&self, write: &PropertyWrite) -> Result<()> {
      let unsupported = || SinkError::UnsupportedValue(SmolStr::new(write.to_string()));

      match BluezObject::from_path(write.path.as_str()) {
         Some(BluezObject::Adapter(name)) if write.interface == ADAPTER_IFACE => {
            let adapter = self.session.adapter(&name)?;
            match (write.property, &write.value) {
               ("Powered", PropertyValue::Bool(on)) => adapter.set_powered(*on).await?,
               ("Pairable", PropertyValue::Bool(on)) => adapter.set_pairable(*on).await?,
               ("Discoverable", PropertyValue::Bool(on)) => adapter.set_discoverable(*on).await?,
               ("Alias", PropertyValue::Str(alias)) => adapter.set_alias(alias.to_string()).await?,
               _ => return Err(unsupported()),
            }
         },
         Some(BluezObject::Device(adapter, address)) if write.interface == DEVICE_IFACE => {
            let device = self.session.adapter(&adapter)?.device(address)?;
            match (write.property, &write.value) {
               ("Trusted", PropertyValue::Bool(trusted)) => device.set_trusted(*trusted).await?,
               _ => return Err(unsupported()),
            }
         },
         _ => return Err(SinkError::UnknownObject(write.path.as_str().into())),
      }
      Ok(())
   }

   async fn export_agent(&self, path: &OwnedObjectPath, agent: PairingAgent) -> Result<()> {
      let added = self
         .connection
         .object_server()
         .at(path.as_str(), agent)
         .await?;
      if !added {
         return Err(SinkError::AgentPathInUse(path.as_str().into()));
      }
      Ok(())
   }

   async fn register_agent(&self, path: &OwnedObjectPath, capability: &str) -> Result<()> {
      let manager = AgentManager1Proxy::new(&self.connection).await?;
      match manager.register_agent(path, capability).await {
         Err(zbus::Error::MethodError(name, ..)) if name.as_str() == ALREADY_EXISTS => {
            Err(SinkError::AgentAlreadyRegistered)
         },
         other => Ok(other?),
      }
   }

   async fn request_default_agent(&self, path: &OwnedObjectPath) -> Result<()> {
      let manager = AgentManager1Proxy::new(&self.connection).await?;
      manager.request_default_agent(path).await?;
      Ok(())
   }

   async fn subscribe(
      &self,
      namespace: &OwnedObjectPath,
   ) -> Result<mpsc::Receiver<DeviceChangeEvent>> {
      let rule = MatchRule::builder()
         .msg_type(MessageType::Signal)
         .interface(PROPERTIES_IFACE)?
         .member(PROPERTIES_CHANGED)?
         .path_namespace(namespace.as_str())?
         .build();
      let mut stream =
         MessageStream::for_match_rule(rule, &self.connection, Some(CHANNEL_BUFFER_SIZE)).await?;

      let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
      tokio::spawn(async move {
         while let Some(msg) = stream.next().await {
            let msg = match msg {
               Ok(msg) => msg,
               Err(e) => {
                  warn!("Error receiving property change: {e}");
                  continue;
               },
            };
            let Some(event) = parse_properties_changed(&msg) else {
               debug!("Ignoring malformed PropertiesChanged signal");
               continue;
            };
            if tx.send(event).await.is_err() {
               break;
            }
         }
         debug!("Property change stream ended");
      });

      Ok(rx)
   }
}

fn parse_properties_changed(msg: &Message) -> Option<DeviceChangeEvent> {
   let header = msg.header();
   let path = OwnedObjectPath::from(header.path()?.clone());
   let (interface, changed, invalidated): (String, HashMap<String, OwnedValue>, Vec<String>) =
      msg.body().deserialize().ok()?;

   let mut event = DeviceChangeEvent::new(path, interface);
   for (name, value) in &changed {
      event = event.with_change(name, PropertyValue::from_variant(value));
   }
   event.invalidated = invalidated.into_iter().map(SmolStr::from).collect();
   Some(event)
}
