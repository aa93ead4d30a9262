pub mod attendance;
pub mod checkin;
pub mod core;
pub mod history;
pub mod roster;
