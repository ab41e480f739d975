//! Configuration management for the sink service.
//!
//! This module handles loading and saving the adapter alias, pairing
//! capability and adapter discovery window from disk.

use std::{env, fs, path::PathBuf, time::Duration};

use log::warn;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use zbus::zvariant::OwnedObjectPath;

use crate::error::{Result, SinkError};

/// Main configuration structure for the service.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
   /// Name the adapter advertises to phones.
   #[serde(default = "default_alias")]
   pub alias: SmolStr,

   /// IO capability declared to `AgentManager1`.
   #[serde(default = "default_capability")]
   pub capability: SmolStr,

   /// Object path the pairing agent is exported at.
   #[serde(default = "default_agent_path")]
   pub agent_path: SmolStr,

   #[serde(default = "default_discovery_attempts")]
   pub discovery_attempts: u32,

   #[serde(default = "default_discovery_delay_ms")]
   pub discovery_delay_ms: u64,
}

fn default_alias() -> SmolStr {
   SmolStr::new_static("Pi Speaker")
}

fn default_capability() -> SmolStr {
   SmolStr::new_static("NoInputNoOutput")
}

fn default_agent_path() -> SmolStr {
   SmolStr::new_static("/bt/agent")
}

const fn default_discovery_attempts() -> u32 {
   10
}

const fn default_discovery_delay_ms() -> u64 {
   500
}

impl Default for Config {
   fn default() -> Self {
      Self {
         alias: default_alias(),
         capability: default_capability(),
         agent_path: default_agent_path(),
         discovery_attempts: default_discovery_attempts(),
         discovery_delay_ms: default_discovery_delay_ms(),
      }
   }
}

impl Config {
   /// Loads configuration from disk or creates default if not exists.
   ///
   /// A headless host may run the service without any config directory;
   /// in that case the defaults are used as-is.
   pub fn load() -> Result<Self> {
      let config_path = match Self::config_path() {
         Ok(path) => path,
         Err(e) => {
            warn!("{e}, using default configuration");
            return Ok(Self::default());
         },
      };

      if config_path.exists() {
         let contents = fs::read_to_string(&config_path)?;
         let config: Self = toml::from_str(&contents)?;
         config.agent_object_path()?;
         Ok(config)
      } else {
         let config = Self::default();
         if let Err(e) = config.save() {
            warn!("Failed to write default config to {}: {e}", config_path.display());
         }
         Ok(config)
      }
   }

   /// Saves the current configuration to disk.
   pub fn save(&self) -> Result<()> {
      let config_path = Self::config_path()?;

      // Ensure directory exists
      if let Some(parent) = config_path.parent() {
         fs::create_dir_all(parent)?;
      }

      let contents = toml::to_string_pretty(self)?;
      fs::write(&config_path, contents)?;

      Ok(())
   }

   fn config_path() -> Result<PathBuf> {
      if let Ok(sink_home) = env::var("BTSINK_HOME") {
         return Ok(PathBuf::from(sink_home).join("config.toml"));
      }

      let config_dir = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
         PathBuf::from(config_home)
      } else if let Some(dir) = dirs::config_dir() {
         dir
      } else {
         return Err(SinkError::ConfigDirNotFound);
      };

      Ok(config_dir.join("btsinkd").join("config.toml"))
   }

   /// The agent path as a D-Bus object path.
   pub fn agent_object_path(&self) -> Result<OwnedObjectPath> {
      Ok(OwnedObjectPath::try_from(self.agent_path.as_str())?)
   }

   /// Delay between two adapter discovery polls.
   pub const fn discovery_delay(&self) -> Duration {
      Duration::from_millis(self.discovery_delay_ms)
   }
}
