pub mod config;
pub mod result;
pub mod role_assignment;
pub mod role_definition;
pub mod scope;
