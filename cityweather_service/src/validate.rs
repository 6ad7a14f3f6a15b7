/// Response schema validation for OpenWeather current-weather payloads.
///
/// Turns an untyped JSON value into a `WeatherReading`:
///   1. Deserialize into the wire structs below (presence + type checks).
///   2. Range-check every physical quantity.
///   3. Resolve the first `weather[]` entry into a `Condition`.
///
/// Any failure rejects the whole payload. Optional blocks (`sys`, `rain`,
/// `visibility`, ...) default to absent; keys not modelled here (`base`,
/// `icon`, `sea_level`) are ignored.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::model::{
    Condition, LATITUDE_RANGE, LONGITUDE_RANGE, MAX_PRESSURE_HPA, ValidationError,
};

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize)]
struct OwCoord {
    lon: f64,
    lat: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    id: i64,
    main: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    #[serde(default)]
    feels_like: Option<f64>,
    #[serde(default)]
    temp_min: Option<f64>,
    #[serde(default)]
    temp_max: Option<f64>,
    // Wide integers so out-of-range values are reported by field, not as a
    // type error.
    pressure: i64,
    humidity: i64,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
    deg: f64,
    #[serde(default)]
    gust: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwClouds {
    all: i64,
}

#[derive(Debug, Deserialize)]
struct OwSys {
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    sunrise: Option<i64>,
    #[serde(default)]
    sunset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OwResponse {
    coord: OwCoord,
    weather: Vec<OwWeather>,
    main: OwMain,
    wind: OwWind,
    clouds: OwClouds,
    id: i64,
    name: String,
    cod: i64,
    #[serde(default)]
    visibility: Option<i64>,
    #[serde(default)]
    dt: Option<i64>,
    #[serde(default)]
    timezone: Option<i64>,
    #[serde(default)]
    sys: Option<OwSys>,
    #[serde(default)]
    rain: Option<HashMap<String, f64>>,
}

// ============================================================================
// Validated reading
// ============================================================================

/// Optional `sys` block.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemInfo {
    pub country: Option<String>,
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
}

/// Optional `rain` block, precipitation volume in mm.
#[derive(Debug, Clone, PartialEq)]
pub struct Rain {
    pub last_1h: Option<f64>,
    pub last_3h: Option<f64>,
}

/// A validated weather payload. Fields are read-only once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReading {
    latitude: f64,
    longitude: f64,
    condition: Condition,
    condition_id: i64,
    description: String,
    temperature: f64,
    feels_like: Option<f64>,
    temp_min: Option<f64>,
    temp_max: Option<f64>,
    pressure: i32,
    humidity: i32,
    wind_speed: f64,
    wind_direction: f64,
    wind_gust: Option<f64>,
    clouds: i32,
    location_id: i64,
    location_name: String,
    response_code: i64,
    visibility: Option<i64>,
    observed_at: Option<i64>,
    timezone_offset: Option<i64>,
    system: Option<SystemInfo>,
    rain: Option<Rain>,
}

impl WeatherReading {
    pub fn latitude(&self) -> f64 {
        self.latitude
    }
    pub fn longitude(&self) -> f64 {
        self.longitude
    }
    pub fn condition(&self) -> Condition {
        self.condition
    }
    pub fn condition_id(&self) -> i64 {
        self.condition_id
    }
    pub fn description(&self) -> &str {
        &self.description
    }
    /// Kelvin.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }
    pub fn feels_like(&self) -> Option<f64> {
        self.feels_like
    }
    pub fn temp_min(&self) -> Option<f64> {
        self.temp_min
    }
    pub fn temp_max(&self) -> Option<f64> {
        self.temp_max
    }
    /// hPa.
    pub fn pressure(&self) -> i32 {
        self.pressure
    }
    pub fn humidity(&self) -> i32 {
        self.humidity
    }
    /// m/s.
    pub fn wind_speed(&self) -> f64 {
        self.wind_speed
    }
    /// Degrees, meteorological.
    pub fn wind_direction(&self) -> f64 {
        self.wind_direction
    }
    pub fn wind_gust(&self) -> Option<f64> {
        self.wind_gust
    }
    pub fn clouds(&self) -> i32 {
        self.clouds
    }
    pub fn location_id(&self) -> i64 {
        self.location_id
    }
    pub fn location_name(&self) -> &str {
        &self.location_name
    }
    pub fn response_code(&self) -> i64 {
        self.response_code
    }
    pub fn visibility(&self) -> Option<i64> {
        self.visibility
    }
    /// Provider observation time (unix seconds). Not used as the stored timestamp.
    pub fn observed_at(&self) -> Option<i64> {
        self.observed_at
    }
    pub fn timezone_offset(&self) -> Option<i64> {
        self.timezone_offset
    }
    pub fn system(&self) -> Option<&SystemInfo> {
        self.system.as_ref()
    }
    pub fn rain(&self) -> Option<&Rain> {
        self.rain.as_ref()
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Validate a raw provider payload.
pub fn parse(raw: &Value) -> Result<WeatherReading, ValidationError> {
    // The path prefix (`main.humidity: ...`) names the offending field.
    let response: OwResponse = serde_path_to_error::deserialize(raw)
        .map_err(|e| ValidationError::Malformed(e.to_string()))?;

    check_range_f64("lat", response.coord.lat, LATITUDE_RANGE.0, LATITUDE_RANGE.1, false, "[-90, 90]")?;
    check_range_f64("lon", response.coord.lon, LONGITUDE_RANGE.0, LONGITUDE_RANGE.1, false, "[-180, 180]")?;
    check_finite("temp", response.main.temp)?;
    let pressure = check_range_i64(
        "pressure",
        response.main.pressure,
        1,
        i64::from(MAX_PRESSURE_HPA),
        "(0, 1500]",
    )?;
    let humidity = check_range_i64("humidity", response.main.humidity, 0, 100, "[0, 100]")?;
    check_finite("wind_speed", response.wind.speed)?;
    if response.wind.speed < 0.0 {
        return Err(out_of_range("wind_speed", response.wind.speed, ">= 0"));
    }
    check_range_f64("wind_direction", response.wind.deg, 0.0, 360.0, true, "[0, 360)")?;
    let clouds = check_range_i64("clouds", response.clouds.all, 0, 100, "[0, 100]")?;
    if let Some(gust) = response.wind.gust {
        check_finite("wind_gust", gust)?;
        if gust < 0.0 {
            return Err(out_of_range("wind_gust", gust, ">= 0"));
        }
    }

    let first = response
        .weather
        .into_iter()
        .next()
        .ok_or(ValidationError::MissingCondition)?;
    let condition: Condition = first.main.parse()?;

    let rain = response.rain.map(|r| Rain {
        last_1h: r.get("1h").copied(),
        last_3h: r.get("3h").copied(),
    });
    let system = response.sys.map(|s| SystemInfo {
        country: s.country,
        sunrise: s.sunrise,
        sunset: s.sunset,
    });

    Ok(WeatherReading {
        latitude: response.coord.lat,
        longitude: response.coord.lon,
        condition,
        condition_id: first.id,
        description: first.description,
        temperature: response.main.temp,
        feels_like: response.main.feels_like,
        temp_min: response.main.temp_min,
        temp_max: response.main.temp_max,
        pressure,
        humidity,
        wind_speed: response.wind.speed,
        wind_direction: response.wind.deg,
        wind_gust: response.wind.gust,
        clouds,
        location_id: response.id,
        location_name: response.name,
        response_code: response.cod,
        visibility: response.visibility,
        observed_at: response.dt,
        timezone_offset: response.timezone,
        system,
        rain,
    })
}

fn out_of_range(
    field: &'static str,
    value: impl ToString,
    expected: &'static str,
) -> ValidationError {
    ValidationError::OutOfRange {
        field,
        value: value.to_string(),
        expected,
    }
}

fn check_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(out_of_range(field, value, "a finite number"))
    }
}

/// `[min, max]`, narrowed to the stored width.
fn check_range_i64(
    field: &'static str,
    value: i64,
    min: i64,
    max: i64,
    expected: &'static str,
) -> Result<i32, ValidationError> {
    if !(min..=max).contains(&value) {
        return Err(out_of_range(field, value, expected));
    }
    i32::try_from(value).map_err(|_| out_of_range(field, value, expected))
}

/// `[min, max]`, or `[min, max)` when `exclusive_max`.
fn check_range_f64(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
    exclusive_max: bool,
    expected: &'static str,
) -> Result<(), ValidationError> {
    let above = if exclusive_max { value >= max } else { value > max };
    if !value.is_finite() || value < min || above {
        return Err(out_of_range(field, value, expected));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "coord": { "lon": 139.6922, "lat": 35.6897 },
            "weather": [
                { "id": 803, "main": "Clouds", "description": "broken clouds", "icon": "04d" }
            ],
            "base": "stations",
            "main": {
                "temp": 288.15,
                "feels_like": 287.6,
                "temp_min": 286.0,
                "temp_max": 290.2,
                "pressure": 1013,
                "humidity": 80
            },
            "visibility": 10000,
            "wind": { "speed": 5.1, "deg": 270 },
            "clouds": { "all": 40 },
            "dt": 1700000000,
            "sys": { "type": 2, "id": 268395, "country": "JP", "sunrise": 1699995000, "sunset": 1700033000 },
            "timezone": 32400,
            "id": 1850147,
            "name": "Tokyo",
            "cod": 200
        })
    }

    #[test]
    fn test_valid_payload_keeps_values_unchanged() {
        let reading = parse(&payload()).expect("well-formed payload should validate");
        assert_eq!(reading.pressure(), 1013);
        assert_eq!(reading.humidity(), 80);
        assert_eq!(reading.wind_speed(), 5.1);
        assert_eq!(reading.wind_direction(), 270.0);
        assert_eq!(reading.clouds(), 40);
        assert_eq!(reading.temperature(), 288.15);
        assert_eq!(reading.condition(), Condition::Clouds);
        assert_eq!(reading.description(), "broken clouds");
        assert_eq!(reading.location_name(), "Tokyo");
        assert_eq!(reading.location_id(), 1850147);
        assert_eq!(reading.response_code(), 200);
        assert_eq!(reading.system().and_then(|s| s.country.as_deref()), Some("JP"));
        assert!(reading.rain().is_none());
    }

    #[test]
    fn test_humidity_150_is_rejected() {
        let mut raw = payload();
        raw["main"]["humidity"] = json!(150);
        let err = parse(&raw).unwrap_err();
        assert_eq!(err.field(), Some("humidity"));
        assert!(err.to_string().contains("150"));
    }

    #[test]
    fn test_pressure_bounds() {
        let mut raw = payload();
        raw["main"]["pressure"] = json!(0);
        assert_eq!(parse(&raw).unwrap_err().field(), Some("pressure"));

        raw["main"]["pressure"] = json!(1501);
        assert_eq!(parse(&raw).unwrap_err().field(), Some("pressure"));

        raw["main"]["pressure"] = json!(1500);
        assert!(parse(&raw).is_ok());
    }

    #[test]
    fn test_wind_direction_360_is_rejected_but_0_accepted() {
        let mut raw = payload();
        raw["wind"]["deg"] = json!(360);
        assert_eq!(parse(&raw).unwrap_err().field(), Some("wind_direction"));

        raw["wind"]["deg"] = json!(0);
        assert!(parse(&raw).is_ok());
    }

    #[test]
    fn test_negative_wind_speed_is_rejected() {
        let mut raw = payload();
        raw["wind"]["speed"] = json!(-0.5);
        assert_eq!(parse(&raw).unwrap_err().field(), Some("wind_speed"));
    }

    #[test]
    fn test_clouds_above_100_is_rejected() {
        let mut raw = payload();
        raw["clouds"]["all"] = json!(101);
        assert_eq!(parse(&raw).unwrap_err().field(), Some("clouds"));
    }

    #[test]
    fn test_coordinates_out_of_range_are_rejected() {
        let mut raw = payload();
        raw["coord"]["lat"] = json!(-91.0);
        assert_eq!(parse(&raw).unwrap_err().field(), Some("lat"));

        let mut raw = payload();
        raw["coord"]["lon"] = json!(181.0);
        assert_eq!(parse(&raw).unwrap_err().field(), Some("lon"));
    }

    #[test]
    fn test_missing_required_block_is_malformed() {
        let mut raw = payload();
        raw.as_object_mut().unwrap().remove("wind");
        match parse(&raw) {
            Err(ValidationError::Malformed(msg)) => assert!(msg.contains("wind"), "{}", msg),
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_type_is_malformed() {
        let mut raw = payload();
        raw["main"]["humidity"] = json!("eighty");
        match parse(&raw) {
            Err(ValidationError::Malformed(msg)) => {
                assert!(msg.contains("main.humidity"), "{}", msg);
                assert!(msg.contains("eighty"), "{}", msg);
            }
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_integer_overflow_is_out_of_range_not_malformed() {
        let mut raw = payload();
        raw["main"]["humidity"] = json!(5_000_000_000i64);
        let err = parse(&raw).unwrap_err();
        assert_eq!(err.field(), Some("humidity"));
        assert!(err.to_string().contains("5000000000"), "{}", err);

        let mut raw = payload();
        raw["main"]["pressure"] = json!(-3_000_000_000i64);
        assert_eq!(parse(&raw).unwrap_err().field(), Some("pressure"));

        let mut raw = payload();
        raw["clouds"]["all"] = json!(i64::MAX);
        assert_eq!(parse(&raw).unwrap_err().field(), Some("clouds"));
    }

    #[test]
    fn test_empty_weather_array_is_rejected() {
        let mut raw = payload();
        raw["weather"] = json!([]);
        assert_eq!(parse(&raw), Err(ValidationError::MissingCondition));
    }

    #[test]
    fn test_unknown_condition_is_rejected() {
        let mut raw = payload();
        raw["weather"][0]["main"] = json!("Sunshine");
        assert_eq!(
            parse(&raw),
            Err(ValidationError::UnknownCondition("Sunshine".to_string()))
        );
    }

    #[test]
    fn test_optional_blocks_default_to_absent() {
        let mut raw = payload();
        let obj = raw.as_object_mut().unwrap();
        obj.remove("sys");
        obj.remove("visibility");
        obj.remove("dt");
        obj.remove("timezone");
        obj.remove("base");
        let reading = parse(&raw).unwrap();
        assert!(reading.system().is_none());
        assert!(reading.visibility().is_none());
        assert!(reading.observed_at().is_none());
    }

    #[test]
    fn test_rain_block_is_read() {
        let mut raw = payload();
        raw["rain"] = json!({ "1h": 0.42 });
        raw["weather"][0]["main"] = json!("Rain");
        let reading = parse(&raw).unwrap();
        let rain = reading.rain().expect("rain block present");
        assert_eq!(rain.last_1h, Some(0.42));
        assert_eq!(rain.last_3h, None);
        assert_eq!(reading.condition(), Condition::Rain);
    }

    #[test]
    fn test_non_object_payload_is_malformed() {
        assert!(matches!(parse(&json!("not-an-object")), Err(ValidationError::Malformed(_))));
        assert!(matches!(parse(&Value::Null), Err(ValidationError::Malformed(_))));
    }
}
