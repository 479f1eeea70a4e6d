mod gate;
mod hooks;
mod runner;
mod store;

pub use gate::{HookResolution, TrustDecision, TrustGate, TrustMode, TrustRequest};
pub use hooks::{deserialize_command_list, HookFile, HookKind};
pub use runner::{run_hooks, HookEnv};
pub use store::TrustStore;
