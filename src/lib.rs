pub mod clock;
pub mod config;
pub mod credentials;
pub mod duration;
pub mod models;
pub mod portal;
pub mod storage;
