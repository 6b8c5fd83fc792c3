pub mod approval;
pub mod conversation;
