pub mod input;
pub mod match_state;
pub mod registry;
pub mod slot;
