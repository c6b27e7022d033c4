#[cfg(test)]
pub mod persistence_tests;
#[cfg(test)]
pub mod settlement_concurrency_tests;
#[cfg(test)]
pub mod utils;
