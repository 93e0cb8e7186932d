pub mod poly;
pub mod savgol;
pub mod stats;
