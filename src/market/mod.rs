pub mod kline;

pub use kline::{Kline, KlineSeries};
