pub mod approval_gate;

pub use approval_gate::{ApprovalGate, ApprovalPrompt, Decision, PendingDecision, UserDecision};
