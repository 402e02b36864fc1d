pub mod access;
pub mod catalog;
pub mod storage;
pub mod table;

pub use table::Table;
