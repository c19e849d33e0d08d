pub mod auth;
pub mod bag;
pub mod items;
pub mod orders;
pub mod users;
