pub mod alt;
pub mod ata;

pub use alt::AltCache;
pub use ata::cached_associated_token_address;
