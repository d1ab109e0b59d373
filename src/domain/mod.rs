pub mod member;
pub mod order;
pub mod renewal;

pub use member::*;
pub use order::*;
pub use renewal::*;
