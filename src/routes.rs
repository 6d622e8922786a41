pub mod account;
pub mod students;
