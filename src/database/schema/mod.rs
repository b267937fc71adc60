pub mod job;
pub mod route;
pub mod workflow;
