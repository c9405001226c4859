pub mod api;
pub mod bidding;
pub mod channel;
pub mod presenter;
pub mod sync;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;
