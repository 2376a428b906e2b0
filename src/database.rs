pub mod otp;
pub mod postgres_repository;
pub mod session;
pub mod user;
