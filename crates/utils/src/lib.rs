pub mod build_info;
pub mod response;
pub mod serde_helpers;
pub mod tokens;
