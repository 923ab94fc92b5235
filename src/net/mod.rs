pub mod baseline;
pub mod protocol;
pub mod snapshot;
pub mod wire;
