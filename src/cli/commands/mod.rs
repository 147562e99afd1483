pub mod control;
pub mod env;
pub mod remote;
pub mod status;
