pub mod errors;
pub mod events;
pub mod fingerprint;
pub mod ids;
