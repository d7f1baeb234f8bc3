use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tracker::LocationEntry;

#[derive(Debug, Deserialize)]
pub struct UploadLocationRequest {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize)]
pub struct LocationInfo {
    pub latitude: f64,
    pub longitude: f64,
    pub observed_at: DateTime<Utc>,
}

impl From<LocationEntry> for LocationInfo {
    fn from(entry: LocationEntry) -> Self {
        Self {
            latitude: entry.latitude,
            longitude: entry.longitude,
            observed_at: entry.observed_at,
        }
    }
}
