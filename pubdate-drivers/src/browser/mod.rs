pub mod cluster;
pub mod driver;
pub mod fingerprint;
pub mod profile;
