pub mod channel_utils;
pub mod relay_utils;
pub mod signature_utils;
