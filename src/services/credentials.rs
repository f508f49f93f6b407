// services/credentials.rs
//
// Request credentials for Daraja. The timestamp is rendered in the process's
// local zone, so deployments must run with TZ set to the merchant's zone
// (Africa/Nairobi for Kenyan shortcodes).
use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Current wall-clock time as `YYYYMMDDHHMMSS`.
pub fn timestamp() -> String {
    format_timestamp(&Local::now())
}

pub fn format_timestamp<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// base64(shortcode + passkey + timestamp). Embeds the timestamp, so it is
/// derived fresh for every request.
pub fn password(short_code: &str, pass_key: &str, timestamp: &str) -> String {
    base64.encode(format!("{}{}{}", short_code, pass_key, timestamp))
}

pub fn basic_auth(consumer_key: &str, consumer_secret: &str) -> String {
    base64.encode(format!("{}:{}", consumer_key, consumer_secret))
}
