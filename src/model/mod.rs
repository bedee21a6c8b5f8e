pub mod keys;
pub mod potential;
pub mod quantity;
pub mod topology;
