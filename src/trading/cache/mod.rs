pub mod candle_series_cache;
