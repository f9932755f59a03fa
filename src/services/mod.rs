pub mod gateway;
pub mod naming;
