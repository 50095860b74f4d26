//! Linear constant-velocity Kalman filter over `[lat, lon, vel_n, vel_e]`.
//!
//! # Cycle
//!
//! - [`PositionFilter::predict`] advances position by velocity, optionally
//!   integrates inertial acceleration into velocity, and grows the covariance
//!   with `P = F·P·Fᵗ + Q`.
//! - [`PositionFilter::update`] absorbs a position-only measurement with
//!   `R = diag(err², err²)` and contracts the covariance with `P = (I − K·H)·P`.
//!
//! Between fixes the filter dead-reckons; when a fix returns it snaps back,
//! weighted by the covariance accumulated during the gap.

use nalgebra::{Matrix2, Matrix2x4, Matrix4, Vector4};
use tokio::time::Instant;

use super::state::FilterState;
use crate::state::{InertialSample, LocationEstimate};

/// z-score of the two-sided 95% interval.
const CONFIDENCE_95: f64 = 1.96;

/// Determinant below which the innovation covariance is treated as singular.
const DEGENERATE_DETERMINANT: f64 = 1e-12;

/// Floor on the reported measurement error (meters).
const MIN_MEASUREMENT_ERROR: f64 = 0.5;

/// Floor on covariance diagonal entries after an update.
const MIN_VARIANCE: f64 = 1e-9;

/// Noise parameters of the filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterTuning {
    /// Position variance after reset (m²). Wide so the next fix dominates.
    pub initial_position_variance: f64,

    /// Velocity variance after reset ((m/s)²).
    pub initial_velocity_variance: f64,

    /// Process noise added to each position variance per predict (m²).
    pub position_process_noise: f64,

    /// Process noise added to each velocity variance per predict ((m/s)²).
    pub velocity_process_noise: f64,
}

impl Default for FilterTuning {
    fn default() -> Self {
        Self {
            initial_position_variance: 1_000.0,
            initial_velocity_variance: 100.0,
            position_process_noise: 0.5,
            velocity_process_noise: 0.25,
        }
    }
}

impl FilterTuning {
    fn process_noise(&self) -> Matrix4<f64> {
        Matrix4::from_diagonal(&Vector4::new(
            self.position_process_noise,
            self.position_process_noise,
            self.velocity_process_noise,
            self.velocity_process_noise,
        ))
    }
}

/// Result of a measurement update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Standard Kalman update applied.
    Applied,
    /// Filter was uninitialized; the fix seeded it.
    Initialized,
    /// Innovation covariance was singular; identity inverse substituted.
    DegenerateInnovation,
    /// Measurement contained non-finite values and was ignored.
    Rejected,
}

/// Position-only measurement model.
fn observation() -> Matrix2x4<f64> {
    Matrix2x4::new(
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0,
    )
}

/// Constant-velocity state transition for `dt` seconds.
fn transition(dt: f64) -> Matrix4<f64> {
    let mut f = Matrix4::identity();
    f[(0, 2)] = dt;
    f[(1, 3)] = dt;
    f
}

/// Closed-form 2×2 inverse.
///
/// Returns the identity and `false` when the determinant is degenerate.
pub(crate) fn invert_2x2(m: &Matrix2<f64>) -> (Matrix2<f64>, bool) {
    let (a, b, c, d) = (m[(0, 0)], m[(0, 1)], m[(1, 0)], m[(1, 1)]);
    let det = a * d - b * c;
    if !det.is_finite() || det.abs() < DEGENERATE_DETERMINANT {
        return (Matrix2::identity(), false);
    }
    (Matrix2::new(d, -b, -c, a) / det, true)
}

/// Kalman filter for a single tracked vehicle.
#[derive(Debug, Clone)]
pub struct PositionFilter {
    /// `None` until the first reset or fix.
    state: Option<FilterState>,
    tuning: FilterTuning,
    last_update: Option<Instant>,
}

impl Default for PositionFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionFilter {
    /// Create an uninitialized filter with default tuning.
    pub fn new() -> Self {
        Self::with_tuning(FilterTuning::default())
    }

    /// Create an uninitialized filter with custom tuning.
    pub fn with_tuning(tuning: FilterTuning) -> Self {
        Self {
            state: None,
            tuning,
            last_update: None,
        }
    }

    /// Current state, if initialized.
    pub fn state(&self) -> Option<&FilterState> {
        self.state.as_ref()
    }

    /// Returns true once the filter has been reset or seeded by a fix.
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// When the filter was last reset or updated.
    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    /// Reinitialize at rest at `(latitude, longitude)`, discarding all prior state.
    ///
    /// Non-finite coordinates are ignored.
    pub fn reset(&mut self, latitude: f64, longitude: f64) {
        if !latitude.is_finite() || !longitude.is_finite() {
            tracing::warn!(latitude, longitude, "Ignoring filter reset to non-finite position");
            return;
        }
        self.state = Some(FilterState::at_rest(
            latitude,
            longitude,
            self.tuning.initial_position_variance,
            self.tuning.initial_velocity_variance,
        ));
        self.last_update = Some(Instant::now());
        tracing::debug!(latitude, longitude, "Position filter reset");
    }

    /// Advance the state by `dt` seconds.
    ///
    /// Position moves by velocity·dt; an inertial sample, if given, is rotated
    /// into north/east and integrated into velocity. No-op for `dt <= 0` or an
    /// uninitialized filter.
    pub fn predict(&mut self, dt: f64, inertial: Option<InertialSample>) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }
        let Some(state) = self.state.as_mut() else {
            return;
        };

        let f = transition(dt);
        state.x = f * state.x;

        if let Some(sample) = inertial {
            let (accel_north, accel_east) = sample.north_east_acceleration();
            if accel_north.is_finite() && accel_east.is_finite() {
                state.x[2] += accel_north * dt;
                state.x[3] += accel_east * dt;
            }
        }

        state.p = f * state.p * f.transpose() + self.tuning.process_noise();
        state.recenter_if_far();
    }

    /// Absorb an absolute position measurement.
    ///
    /// An uninitialized filter is seeded at the measurement instead.
    pub fn update(&mut self, latitude: f64, longitude: f64, horizontal_error: f64) -> UpdateOutcome {
        if !latitude.is_finite() || !longitude.is_finite() || !horizontal_error.is_finite() {
            tracing::warn!(
                latitude,
                longitude,
                horizontal_error,
                "Rejecting non-finite position measurement"
            );
            return UpdateOutcome::Rejected;
        }

        let Some(state) = self.state.as_mut() else {
            self.reset(latitude, longitude);
            return UpdateOutcome::Initialized;
        };

        let error = horizontal_error.abs().max(MIN_MEASUREMENT_ERROR);
        let r = Matrix2::from_diagonal_element(error * error);
        let h = observation();
        let ht = h.transpose();

        let z = state.to_local(latitude, longitude);
        let innovation = z - h * state.x;
        let s = h * state.p * ht + r;

        let (s_inv, well_conditioned) = invert_2x2(&s);
        if !well_conditioned {
            tracing::warn!("Innovation covariance is singular, using identity inverse");
        }

        let k = state.p * ht * s_inv;
        state.x += k * innovation;
        state.p = (Matrix4::identity() - k * h) * state.p;

        // Re-symmetrize and keep variances strictly positive.
        state.p = (state.p + state.p.transpose()) * 0.5;
        for i in 0..4 {
            if state.p[(i, i)].is_nan() || state.p[(i, i)] < MIN_VARIANCE {
                state.p[(i, i)] = MIN_VARIANCE;
            }
        }

        state.recenter_if_far();
        self.last_update = Some(Instant::now());

        if well_conditioned {
            UpdateOutcome::Applied
        } else {
            UpdateOutcome::DegenerateInnovation
        }
    }

    /// Current estimate, if initialized.
    ///
    /// The 95% radius is `1.96 · sqrt(P[0][0] + P[1][1])`.
    pub fn estimate(&self) -> Option<LocationEstimate> {
        self.state.as_ref().map(|state| LocationEstimate {
            latitude: state.latitude(),
            longitude: state.longitude(),
            horizontal_error_95: CONFIDENCE_95 * (state.p[(0, 0)] + state.p[(1, 1)]).sqrt(),
            velocity: state.speed(),
            produced_at: Instant::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn moving_filter() -> PositionFilter {
        let mut filter = PositionFilter::new();
        filter.reset(10.0, 20.0);
        // 2 m/s² north-east for 1 s
        let sample = InertialSample::new(2.0, 0.0, std::f64::consts::FRAC_PI_4);
        filter.predict(1.0, Some(sample));
        filter
    }

    #[test]
    fn test_new_filter_has_no_estimate() {
        let filter = PositionFilter::new();
        assert!(!filter.is_initialized());
        assert!(filter.estimate().is_none());
        assert!(filter.last_update().is_none());
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut filter = moving_filter();
        filter.reset(1.0, 2.0);
        let first = filter.state().cloned();
        filter.reset(1.0, 2.0);

        assert_eq!(filter.state().cloned(), first);
        let estimate = filter.estimate().unwrap();
        assert_eq!(estimate.latitude, 1.0);
        assert_eq!(estimate.longitude, 2.0);
        assert_eq!(estimate.velocity, 0.0);
    }

    #[test]
    fn test_reset_ignores_non_finite() {
        let mut filter = PositionFilter::new();
        filter.reset(1.0, 2.0);
        filter.reset(f64::NAN, 2.0);
        assert_eq!(filter.estimate().unwrap().latitude, 1.0);
    }

    #[test]
    fn test_fix_convergence() {
        let mut filter = PositionFilter::new();
        filter.reset(10.0, 20.0);
        let before = filter.estimate().unwrap();

        let outcome = filter.update(10.001, 20.001, 5.0);
        let after = filter.estimate().unwrap();

        assert_eq!(outcome, UpdateOutcome::Applied);
        assert!(after.latitude > before.latitude && after.latitude <= 10.001);
        assert!(after.longitude > before.longitude && after.longitude <= 20.001);
        assert!(after.horizontal_error_95 < before.horizontal_error_95);
    }

    #[test]
    fn test_tight_fix_dominates_wide_prior() {
        let mut filter = PositionFilter::new();
        filter.reset(10.0, 20.0);
        filter.update(10.001, 20.0, 5.0);

        // Prior variance 1000 m² vs 25 m² measurement: gain ≈ 0.976
        let lat = filter.estimate().unwrap().latitude;
        assert!((lat - 10.001).abs() < 0.00003);
    }

    #[test]
    fn test_update_seeds_uninitialized_filter() {
        let mut filter = PositionFilter::new();
        assert_eq!(filter.update(5.0, 6.0, 3.0), UpdateOutcome::Initialized);
        let estimate = filter.estimate().unwrap();
        assert_eq!((estimate.latitude, estimate.longitude), (5.0, 6.0));
    }

    #[test]
    fn test_update_rejects_non_finite() {
        let mut filter = PositionFilter::new();
        filter.reset(5.0, 6.0);
        let before = filter.state().cloned();

        assert_eq!(filter.update(f64::NAN, 6.0, 3.0), UpdateOutcome::Rejected);
        assert_eq!(filter.update(5.0, 6.0, f64::INFINITY), UpdateOutcome::Rejected);
        assert_eq!(filter.state().cloned(), before);
    }

    #[test]
    fn test_zero_error_measurement_keeps_positive_variance() {
        let mut filter = PositionFilter::new();
        filter.reset(5.0, 6.0);
        filter.update(5.0, 6.0, 0.0);
        let p = filter.state().unwrap().covariance();
        assert!(p[(0, 0)] > 0.0);
        assert!(p[(1, 1)] > 0.0);
    }

    #[test]
    fn test_predict_non_positive_dt_is_noop() {
        let mut filter = moving_filter();
        let before = filter.state().cloned();

        filter.predict(0.0, None);
        filter.predict(-1.0, Some(InertialSample::new(5.0, 5.0, 0.0)));
        filter.predict(f64::NAN, None);

        assert_eq!(filter.state().cloned(), before);
    }

    #[test]
    fn test_predict_uninitialized_is_noop() {
        let mut filter = PositionFilter::new();
        filter.predict(1.0, Some(InertialSample::new(1.0, 0.0, 0.0)));
        assert!(!filter.is_initialized());
    }

    #[test]
    fn test_inertial_integration_direction() {
        let filter = moving_filter();
        let state = filter.state().unwrap();

        let expected = 2.0 * std::f64::consts::FRAC_1_SQRT_2;
        assert!((state.velocity_north() - expected).abs() < 1e-9);
        assert!((state.velocity_east() - expected).abs() < 1e-9);
        assert!((state.speed() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_dead_reckoning_is_monotonic() {
        let mut filter = moving_filter();
        let mut previous = filter.estimate().unwrap();

        for _ in 0..50 {
            filter.predict(0.1, None);
            let current = filter.estimate().unwrap();

            assert!(current.latitude > previous.latitude);
            assert!(current.longitude > previous.longitude);
            assert!(current.horizontal_error_95 >= previous.horizontal_error_95);
            assert!((current.velocity - previous.velocity).abs() < 1e-12);
            previous = current;
        }
    }

    #[test]
    fn test_longer_gap_trusts_fix_more() {
        let mut short_gap = PositionFilter::new();
        let mut long_gap = PositionFilter::new();
        short_gap.reset(10.0, 20.0);
        long_gap.reset(10.0, 20.0);
        short_gap.update(10.0, 20.0, 5.0);
        long_gap.update(10.0, 20.0, 5.0);

        for _ in 0..10 {
            short_gap.predict(0.1, None);
        }
        for _ in 0..300 {
            long_gap.predict(0.1, None);
        }
        assert!(
            long_gap.estimate().unwrap().horizontal_error_95
                > short_gap.estimate().unwrap().horizontal_error_95
        );

        short_gap.update(10.001, 20.0, 5.0);
        long_gap.update(10.001, 20.0, 5.0);

        let short_pull = short_gap.estimate().unwrap().latitude - 10.0;
        let long_pull = long_gap.estimate().unwrap().latitude - 10.0;
        assert!(short_pull > 0.0);
        assert!(long_pull > short_pull);
        assert!(long_pull <= 0.001);
    }

    #[test]
    fn test_invert_2x2() {
        let m = Matrix2::new(4.0, 1.0, 2.0, 3.0);
        let (inv, ok) = invert_2x2(&m);
        assert!(ok);
        let product = m * inv;
        assert!((product - Matrix2::identity()).norm() < 1e-12);
    }

    #[test]
    fn test_invert_2x2_degenerate_falls_back_to_identity() {
        let singular = Matrix2::new(1.0, 2.0, 2.0, 4.0);
        let (inv, ok) = invert_2x2(&singular);
        assert!(!ok);
        assert_eq!(inv, Matrix2::identity());

        let (inv, ok) = invert_2x2(&Matrix2::new(f64::NAN, 0.0, 0.0, 1.0));
        assert!(!ok);
        assert_eq!(inv, Matrix2::identity());
    }

    #[derive(Debug, Clone)]
    enum Step {
        Predict(f64, Option<(f64, f64, f64)>),
        Update(f64, f64, f64),
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        prop_oneof![
            (
                0.01f64..5.0,
                prop::option::of((-10.0f64..10.0, -10.0f64..10.0, -3.2f64..3.2))
            )
                .prop_map(|(dt, s)| Step::Predict(dt, s)),
            (-0.01f64..0.01, -0.01f64..0.01, 1.0f64..200.0)
                .prop_map(|(dlat, dlon, err)| Step::Update(dlat, dlon, err)),
        ]
    }

    proptest! {
        #[test]
        fn prop_covariance_stays_positive_and_finite(
            steps in prop::collection::vec(step_strategy(), 1..200)
        ) {
            let mut filter = PositionFilter::new();
            filter.reset(45.0, 7.0);

            for step in steps {
                match step {
                    Step::Predict(dt, sample) => {
                        let sample = sample.map(|(ax, ay, h)| InertialSample::new(ax, ay, h));
                        filter.predict(dt, sample);
                    }
                    Step::Update(dlat, dlon, err) => {
                        let estimate = filter.estimate().unwrap();
                        filter.update(estimate.latitude + dlat, estimate.longitude + dlon, err);
                    }
                }

                let p = filter.state().unwrap().covariance();
                prop_assert!(p[(0, 0)].is_finite() && p[(0, 0)] > 0.0);
                prop_assert!(p[(1, 1)].is_finite() && p[(1, 1)] > 0.0);
            }
        }
    }
}
