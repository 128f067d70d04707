pub mod dashboard;
pub mod events;
pub mod runs;
pub mod schedules;
pub mod workflows;
pub mod ws;
