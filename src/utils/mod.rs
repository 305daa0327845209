// src/utils/mod.rs

pub mod conn_url;
pub mod ident;
