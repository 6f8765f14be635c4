pub mod account;
pub mod chain;
pub mod payload;
pub mod request;
pub mod transaction;

pub use account::{Account, ActiveWallet, Contact, Wallet, WalletContext, WalletType};
pub use chain::{ChainAlias, ChainId, SolanaCluster, VmType};
pub use payload::{
    AccountAction, DisplayPayload, MessageKind, MessagePayload, MfaChallenge, MfaProof,
    NormalizedRequest, SignPayload, SignResult, SignedPayload, TypedDataVersion,
};
pub use request::{InboundRequest, Origin, RequestId, RequestStatus, RpcMethod, SigningRequest};
pub use transaction::{Fee, FeeBreakdown, FeeUnit, NormalizedTransaction, TxBody};
