//! Integration tests: services reacting to each other only through the bus.

#[cfg(test)]
mod fixtures;

pub mod e2e_choreography;
pub mod flows;
