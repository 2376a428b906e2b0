pub mod elevation;
pub mod otp;
pub mod otp_counter;
pub mod session;
pub mod user;
