pub mod backup;
pub mod classrooms;
pub mod core;
pub mod courses;
pub mod dashboard;
pub mod focus;
pub mod grades;
pub mod profile;
pub mod schedule;
pub mod stats;
pub mod subjects;
pub mod tasks;
