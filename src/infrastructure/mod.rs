pub mod device;
pub mod mpc;
pub mod provider;
pub mod storage;
