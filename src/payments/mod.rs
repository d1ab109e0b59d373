pub mod orchestrator;
pub mod upi;

pub use orchestrator::{verify_shared_secret, PaymentOrchestrator};
