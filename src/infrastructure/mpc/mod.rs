pub mod mpc_client;

pub use mpc_client::{
    JsonRpcMpcClient, MpcClient, MpcResponse, MpcSignRequest, StaticTokenRefresher, TokenRefresher,
};
