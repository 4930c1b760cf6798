pub mod fdb;
