pub mod calendar;
pub mod habits;
pub mod storage;
pub mod streaks;
