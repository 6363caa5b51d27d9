pub mod fingerprint;
pub mod search;
pub mod status;
