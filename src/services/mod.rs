pub mod coordinator;
pub mod form;
pub mod presign;
pub mod transfer;
