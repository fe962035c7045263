pub mod add_device;
pub mod add_host;
pub mod list_devices;
pub mod set_device;
