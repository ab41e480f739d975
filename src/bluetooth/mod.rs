//! Adapter lifecycle: finding it, configuring it, and reacting to the
//! devices that connect to it.

pub mod locator;
pub mod provision;
pub mod reactor;
