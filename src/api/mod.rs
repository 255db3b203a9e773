pub mod client_key;
pub mod rest;
