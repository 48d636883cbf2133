pub mod repository;
pub mod strategy;
