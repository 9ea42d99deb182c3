pub mod ema;
pub mod rolling;
pub mod rsi;
pub mod sma;
