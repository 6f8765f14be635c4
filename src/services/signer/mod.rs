pub mod hardware_device;
pub mod local_key;
pub mod registry;
pub mod remote_mpc;
pub mod signer_trait;
pub mod signing_input;

pub use hardware_device::HardwareDeviceSigner;
pub use local_key::LocalKeySigner;
pub use registry::SignerRegistry;
pub use remote_mpc::RemoteMpcSigner;
pub use signer_trait::{BackendKind, SignOutcome, SigningBackend};
pub use signing_input::{SigningInput, finalize, signing_input};
