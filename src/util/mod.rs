pub mod fixed;
pub mod vec3;
