pub mod controller;
pub mod error;
pub mod estimator;
pub mod events;
pub mod feasibility;
pub mod intents;
pub mod model;
pub mod pacing;

#[cfg(test)]
pub mod testing;
