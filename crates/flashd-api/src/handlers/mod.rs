//! HTTP request handlers for the flash API

pub mod flash;
