pub mod decoder;
pub mod endpoint;
pub mod fetcher;
#[cfg(test)]
pub(crate) mod mock;
pub mod normalizer;
pub mod schema;
pub mod types;
