pub mod call;
pub mod chat;
