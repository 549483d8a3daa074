//! Shared value types: the hostname/pathname parameter map, plus
//! request/response plumbing types used across the routing pipeline.

mod params;

pub use params::ParamMap;
