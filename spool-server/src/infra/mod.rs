pub mod app_state;
pub mod errors;
pub mod flush;
pub mod startup;
