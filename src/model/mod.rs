pub mod candle;
pub mod feature;
