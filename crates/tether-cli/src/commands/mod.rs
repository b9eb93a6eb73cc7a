pub mod call;
pub mod layout;
