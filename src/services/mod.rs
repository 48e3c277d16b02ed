pub mod catalog;
pub mod mutator;
pub mod profile;
pub mod sequencer;
pub mod trips;
