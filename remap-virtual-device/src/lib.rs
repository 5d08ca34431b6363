//! The virtual HID collaborator: a `uinput` keyboard/consumer/pointer
//! device consuming `remap-core`'s post-processor output, standing in for
//! the kernel extension a real remapper would drive over IOKit.

pub mod device;
pub mod keycode_map;

pub use device::{VirtualHidDevice, VirtualHidError};
