pub mod events;
pub mod limits;
pub mod models;
