//! Temperature scale conversions

/// Convert Fahrenheit to Celsius
#[must_use]
pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) / 1.8
}

/// Convert Fahrenheit to Kelvin
#[must_use]
pub fn fahrenheit_to_kelvin(f: f64) -> f64 {
    (f - 32.0) / 1.8 + 273.15
}

/// Convert Celsius to Kelvin
#[must_use]
pub fn celsius_to_kelvin(c: f64) -> f64 {
    c + 273.15
}

/// Convert Kelvin to Celsius
#[must_use]
pub fn kelvin_to_celsius(k: f64) -> f64 {
    k - 273.15
}

/// Normalize a reading to Celsius; `None` for an unrecognized unit
#[must_use]
pub fn to_celsius(value: f64, unit: &str) -> Option<f64> {
    match unit {
        "C" | "Cel" => Some(value),
        "F" => Some(fahrenheit_to_celsius(value)),
        "K" => Some(kelvin_to_celsius(value)),
        _ => None,
    }
}
