pub mod attendance_session;
pub mod class;
pub mod presence_event;
pub mod user;
