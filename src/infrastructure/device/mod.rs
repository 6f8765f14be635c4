pub mod device_transport;

pub use device_transport::{DeviceTransport, NoDeviceTransport, SessionId, TransportKind};
