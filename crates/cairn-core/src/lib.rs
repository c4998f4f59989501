pub mod cancel;
pub mod commands;
pub mod config;
pub mod destination;
pub mod entry;
pub mod error;
pub mod filter;
pub mod hash;
pub mod keys;
pub mod pipeline;
pub mod pool;
pub mod source;
pub mod stream;

#[cfg(test)]
mod testutil;
