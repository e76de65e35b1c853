pub mod page;
pub mod sso;
