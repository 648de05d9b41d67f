pub mod candle;
pub mod model;
