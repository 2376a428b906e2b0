pub mod error;
pub mod health;
pub mod otp;
pub mod user;
