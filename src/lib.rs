//! PS2Pad - PlayStation 2 controller subsystem
//!
//! An emulator-side gamepad layer supporting:
//! - Host key / touch events mapped to virtual DualShock 2 buttons
//! - Physical gamepads through a pluggable device provider (gilrs)
//! - SIO pad protocol (digital, analog and DS2 native modes)
//! - "LinPad" save-state blocks (freeze / thaw)
//! - Settings store and an application bridge for the VM lifecycle

pub mod button;
pub mod key_status;
pub mod bindings;
pub mod protocol;
pub mod freeze;
pub mod device;
pub mod settings;
pub mod config;
pub mod emu_config;
pub mod pad;
pub mod bridge;
