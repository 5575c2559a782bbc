pub mod capital_reader;
pub mod concurrent_reader;
pub mod retry;
pub mod weather_reader;

pub use capital_reader::{CapitalDirectory, RestCountriesDirectory, StaticDirectory};
pub use concurrent_reader::WeatherIngestor;
pub use retry::{AttemptState, RecordingSleeper, RetryPolicy, RetryState, Sleeper, TokioSleeper, Transience};
pub use weather_reader::{FetchError, OpenWeatherClient, WeatherSource};
