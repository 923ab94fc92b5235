pub mod history;
pub mod rewind;
pub mod system;
