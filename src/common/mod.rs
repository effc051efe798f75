mod address;
pub mod compact;
mod id;
mod peer;

pub use address::*;
pub use id::*;
pub use peer::*;
