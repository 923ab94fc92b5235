pub mod predictor;
pub mod smoothing;
