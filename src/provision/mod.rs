mod client;
mod steps;

pub use client::{GeoServerClient, ProvisionError, ProvisionReport};
pub use steps::{Method, Payload, ProvisionPlan, Step};
