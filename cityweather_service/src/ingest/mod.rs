/// Upstream data clients.
///
/// - `http`: the GET capability every client is built on, plus the
///   `reqwest` implementation used in production.
/// - `openweather`: OpenWeather current-weather client.

pub mod http;
pub mod openweather;
