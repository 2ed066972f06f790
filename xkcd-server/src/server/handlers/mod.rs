pub mod comics;
pub mod fallback;
pub mod health;
pub mod images;
pub mod translations;
