use serde::{Deserialize, Serialize};

/// 地球半径（公里）
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// 地理围栏区域，静态配置，运行期间不会修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceZone {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
}

impl GeofenceZone {
    /// 点到围栏中心的距离不超过半径即视为在围栏内（含边界）
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        haversine_km(self.latitude, self.longitude, latitude, longitude) * 1000.0
            <= self.radius_meters
    }
}

// 使用Haversine公式计算两点间的球面距离，返回公里
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// 任意一个围栏包含该点时返回 `multiplier`，否则返回 1.0
pub fn zone_multiplier(zones: &[GeofenceZone], latitude: f64, longitude: f64, multiplier: f64) -> f64 {
    if zones.iter().any(|zone| zone.contains(latitude, longitude)) {
        multiplier
    } else {
        1.0
    }
}

/// 坐标合法性检查：拒绝 NaN、无穷大和越界值
pub fn is_valid_coordinate(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}
