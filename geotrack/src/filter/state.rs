//! Filter state: position/velocity vector and covariance.
//!
//! Position is held as metric offsets (north, east) from a geodetic origin set
//! at reset, so the covariance and the measurement noise share units (m²).
//! Latitude/longitude are recovered with an equirectangular projection, which
//! is accurate well below a meter over the few kilometers the filter lets the
//! offset grow before recentering.

use nalgebra::{Matrix4, Vector2, Vector4};

/// Meters per degree of latitude (mean Earth radius).
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Smallest cosine used for longitude scaling (avoids blow-up at the poles).
const MIN_LONGITUDE_SCALE: f64 = 1e-6;

/// Offset at which the origin is moved back under the current position.
pub(crate) const RECENTER_DISTANCE_METERS: f64 = 5_000.0;

/// `[lat, lon, vel_north, vel_east]` plus its 4×4 covariance.
///
/// Owned exclusively by one [`PositionFilter`](super::PositionFilter).
#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    /// Geodetic origin of the local frame (degrees).
    origin: (f64, f64),

    /// `[north_m, east_m, vel_north, vel_east]`.
    pub(crate) x: Vector4<f64>,

    /// State covariance (m², m²/s, m²/s²).
    pub(crate) p: Matrix4<f64>,
}

impl FilterState {
    /// State at rest at `(latitude, longitude)` with a diagonal covariance.
    pub(crate) fn at_rest(
        latitude: f64,
        longitude: f64,
        position_variance: f64,
        velocity_variance: f64,
    ) -> Self {
        Self {
            origin: (latitude, longitude),
            x: Vector4::zeros(),
            p: Matrix4::from_diagonal(&Vector4::new(
                position_variance,
                position_variance,
                velocity_variance,
                velocity_variance,
            )),
        }
    }

    /// Latitude in degrees.
    pub fn latitude(&self) -> f64 {
        self.origin.0 + self.x[0] / METERS_PER_DEGREE
    }

    /// Longitude in degrees.
    pub fn longitude(&self) -> f64 {
        self.origin.1 + self.x[1] / (METERS_PER_DEGREE * self.longitude_scale())
    }

    /// Northward velocity in m/s.
    pub fn velocity_north(&self) -> f64 {
        self.x[2]
    }

    /// Eastward velocity in m/s.
    pub fn velocity_east(&self) -> f64 {
        self.x[3]
    }

    /// Ground speed in m/s.
    pub fn speed(&self) -> f64 {
        self.x[2].hypot(self.x[3])
    }

    /// Covariance matrix.
    pub fn covariance(&self) -> &Matrix4<f64> {
        &self.p
    }

    /// Project a geodetic position into this state's local frame (meters).
    pub(crate) fn to_local(&self, latitude: f64, longitude: f64) -> Vector2<f64> {
        Vector2::new(
            (latitude - self.origin.0) * METERS_PER_DEGREE,
            (longitude - self.origin.1) * METERS_PER_DEGREE * self.longitude_scale(),
        )
    }

    /// Move the origin under the current position once the offset gets large.
    ///
    /// A pure translation: covariance and velocity are unchanged.
    pub(crate) fn recenter_if_far(&mut self) -> bool {
        if self.x[0].abs() < RECENTER_DISTANCE_METERS && self.x[1].abs() < RECENTER_DISTANCE_METERS
        {
            return false;
        }
        self.origin = (self.latitude(), self.longitude());
        self.x[0] = 0.0;
        self.x[1] = 0.0;
        true
    }

    fn longitude_scale(&self) -> f64 {
        self.origin.0.to_radians().cos().abs().max(MIN_LONGITUDE_SCALE)
    }
}
