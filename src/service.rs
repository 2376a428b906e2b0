pub mod email;
pub mod otp;
