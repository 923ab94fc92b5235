pub mod constants;
pub mod input_buffer;
pub mod movement;
pub mod state;
