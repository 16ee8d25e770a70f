pub mod constants;
pub mod physics;
pub mod state;
