pub mod errorfmt;
pub mod ratelimit;
