pub mod connection;
pub mod entities;
pub mod migrations;
