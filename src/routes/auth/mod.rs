pub mod claims;
pub mod session;
