pub mod attendance;
pub mod calc;
pub mod core;
pub mod fees;
pub mod marks;
pub mod reports;
pub mod settings;
pub mod students;
pub mod subjects;
