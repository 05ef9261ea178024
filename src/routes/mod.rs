pub mod dashboard;
pub mod execute;
pub mod folders;
pub mod health;
pub mod results;
