pub mod bootstrap;
pub mod executor;
pub mod params;
