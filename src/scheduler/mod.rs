pub mod arrival;
pub mod rate_plan;

pub use arrival::{recommended_channel_capacity, ArrivalModel, ArrivalScheduler, FirePermit};
pub use rate_plan::{Phase, RatePlan};
