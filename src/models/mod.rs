pub mod habit;
pub mod habit_trait;
pub mod note;
pub mod occurrence;
pub mod profile;
