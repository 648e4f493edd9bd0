pub mod mission;
pub mod registry;
pub mod topology;
