//! Property values, writes and change notifications exchanged with BlueZ.
//!
//! These are the plain data types flowing between the bus layer and the
//! reactor; nothing here talks to D-Bus directly.

use std::{collections::HashMap, fmt};

use smol_str::SmolStr;
use zbus::zvariant::{OwnedObjectPath, Value};

/// A property value as seen by the service.
///
/// Only the shapes the service reads or writes get their own variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
   Bool(bool),
   Str(SmolStr),
   U32(u32),
   I16(i16),
   Other,
}

impl PropertyValue {
   pub fn from_variant(value: &Value<'_>) -> Self {
      match value {
         Value::Bool(b) => Self::Bool(*b),
         Value::Str(s) => Self::Str(SmolStr::new(s.as_str())),
         Value::U32(n) => Self::U32(*n),
         Value::I16(n) => Self::I16(*n),
         Value::Value(inner) => Self::from_variant(inner),
         _ => Self::Other,
      }
   }

   pub const fn as_bool(&self) -> Option<bool> {
      match self {
         Self::Bool(b) => Some(*b),
         _ => None,
      }
   }
}

impl fmt::Display for PropertyValue {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         Self::Bool(b) => write!(f, "{b}"),
         Self::Str(s) => write!(f, "{s:?}"),
         Self::U32(n) => write!(f, "{n}"),
         Self::I16(n) => write!(f, "{n}"),
         Self::Other => f.write_str("<other>"),
      }
   }
}

impl From<bool> for PropertyValue {
   fn from(value: bool) -> Self {
      Self::Bool(value)
   }
}

impl From<&str> for PropertyValue {
   fn from(value: &str) -> Self {
      Self::Str(SmolStr::new(value))
   }
}

impl From<SmolStr> for PropertyValue {
   fn from(value: SmolStr) -> Self {
      Self::Str(value)
   }
}

/// A single `Properties.Set` call against one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyWrite {
   pub path: OwnedObjectPath,
   pub interface: &'static str,
   pub property: &'static str,
   pub value: PropertyValue,
}

impl PropertyWrite {
   pub fn new(
      path: OwnedObjectPath,
      interface: &'static str,
      property: &'static str,
      value: impl Into<PropertyValue>,
   ) -> Self {
      Self {
         path,
         interface,
         property,
         value: value.into(),
      }
   }
}

impl fmt::Display for PropertyWrite {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "{}.{} = {} on {}", self.interface, self.property, self.value, self.path.as_str())
   }
}

/// One `PropertiesChanged` notification from an object under the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceChangeEvent {
   /// Object that emitted the signal.
   pub path: OwnedObjectPath,
   /// Interface whose properties changed.
   pub interface: SmolStr,
   pub changed: HashMap<SmolStr, PropertyValue>,
   /// Carried for completeness; never inspected.
   pub invalidated: Vec<SmolStr>,
}

impl DeviceChangeEvent {
   pub fn new(path: OwnedObjectPath, interface: impl Into<SmolStr>) -> Self {
      Self {
         path,
         interface: interface.into(),
         changed: HashMap::new(),
         invalidated: Vec::new(),
      }
   }

   pub fn with_change(mut self, property: &str, value: impl Into<PropertyValue>) -> Self {
      self.changed.insert(SmolStr::new(property), value.into());
      self
   }

   pub fn changed(&self, property: &str) -> Option<&PropertyValue> {
      self.changed.get(property)
   }
}
