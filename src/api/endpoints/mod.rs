pub mod health;
pub mod results;
pub mod status;
