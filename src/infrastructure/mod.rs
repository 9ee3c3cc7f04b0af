pub mod mock;
pub mod persistence;
