pub mod facebook;
pub mod tiktok;

pub use facebook::FacebookAdapter;
pub use tiktok::TiktokAdapter;
