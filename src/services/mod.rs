pub mod approval;
pub mod chain;
pub mod dispatcher;
pub mod fee;
pub mod normalizer;
pub mod signer;

pub use approval::{ApprovalGate, ApprovalPrompt, Decision, UserDecision};
pub use chain::ChainRouter;
pub use dispatcher::RequestDispatcher;
pub use fee::FeeEstimator;
pub use normalizer::TransactionNormalizer;
pub use signer::SignerRegistry;
