//! Four-way intersection signal controller: one timer task per lane and a
//! coordinator that hands green to the next lane in round-robin order.

pub mod config;
pub mod coordinator;
pub mod cycle;
mod intersection;
pub mod timer_actor;

pub use config::{CycleTiming, IntersectionConfig};
pub use coordinator::{Coordinator, DurationUpdate};
pub use intersection::Intersection;
