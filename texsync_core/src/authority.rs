//! The authority driver: the only mutation path for `SharedState`.
//!
//! Each tick advances time and angle and bumps `version` exactly once. Every
//! `regenerate_every`-th version the generator redraws the payload. Control
//! commands can force a redraw or restart the sequence at any point.

use crate::generator::generate;
use crate::state::{Dimensions, SharedState};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// How `angle` is brought back into `[0, 360)` after each advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleWrap {
    /// Subtract 360 once if the angle reached 360.
    ///
    /// Matches the established behaviour. A single advance of more than 360
    /// degrees (`dt * degrees_per_second >= 360`) leaves the angle at or
    /// above 360.
    #[default]
    SingleSubtraction,
    
    /// Full Euclidean reduction; always lands in `[0, 360)`.
    Modulo,
}

impl AngleWrap {
    /// Applies the wrap policy.
    pub fn wrap(&self, angle: f32) -> f32 {
        match self {
            AngleWrap::SingleSubtraction => {
                if angle >= 360.0 {
                    angle - 360.0
                } else {
                    angle
                }
            }
            AngleWrap::Modulo => {
                let wrapped = angle.rem_euclid(360.0);
                // rem_euclid can round up to exactly 360 for tiny negatives
                if wrapped >= 360.0 {
                    0.0
                } else {
                    wrapped
                }
            }
        }
    }
}

impl std::str::FromStr for AngleWrap {
    type Err = String;
    
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" | "single_subtraction" | "subtract" => Ok(AngleWrap::SingleSubtraction),
            "modulo" | "mod" | "euclid" => Ok(AngleWrap::Modulo),
            _ => Err(format!("Unknown angle wrap policy: {}", s)),
        }
    }
}

/// Configuration for the authority driver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Regenerate when `version % regenerate_every == 0` (0 disables the cadence)
    pub regenerate_every: u64,
    
    /// Angular speed in degrees per simulated second
    pub degrees_per_second: f32,
    
    /// Wraparound policy for `angle`
    pub angle_wrap: AngleWrap,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            regenerate_every: 30,
            degrees_per_second: 90.0,
            angle_wrap: AngleWrap::SingleSubtraction,
        }
    }
}

impl DriverConfig {
    /// Sets the regeneration cadence.
    pub fn with_regenerate_every(mut self, ticks: u64) -> Self {
        self.regenerate_every = ticks;
        self
    }
    
    /// Sets the angle wrap policy.
    pub fn with_angle_wrap(mut self, wrap: AngleWrap) -> Self {
        self.angle_wrap = wrap;
        self
    }
}

/// Outcome of one authority tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Version after the tick
    pub version: u64,
    
    /// Whether the payload was regenerated during this tick
    pub regenerated: bool,
}

/// Owns and advances the canonical state.
pub struct AuthorityDriver {
    config: DriverConfig,
    state: SharedState,
    regenerations: u64,
    /// Set by a forced regenerate so the next advance keeps `update_flag`.
    refresh_pending: bool,
}

impl AuthorityDriver {
    /// Creates a driver with zeroed time, angle and version.
    ///
    /// The initial texture is generated immediately, at version 0.
    pub fn new(dims: Dimensions, config: DriverConfig) -> Self {
        let mut driver = Self {
            config,
            state: SharedState::initial(dims),
            regenerations: 0,
            refresh_pending: false,
        };
        driver.redraw();
        driver
    }
    
    /// Returns the current state.
    pub fn state(&self) -> &SharedState {
        &self.state
    }
    
    /// Returns an owned copy of the current state for publication.
    ///
    /// The copy shares the pixel buffer, which is never written in place, so
    /// later ticks cannot alter it.
    pub fn snapshot(&self) -> SharedState {
        self.state.clone()
    }
    
    /// Returns the driver configuration.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }
    
    /// Number of times the generator has run, including the initial texture.
    pub fn regenerations(&self) -> u64 {
        self.regenerations
    }
    
    /// Returns true if reaching `version` triggers the regeneration cadence.
    pub fn is_regeneration_version(&self, version: u64) -> bool {
        self.config.regenerate_every != 0 && version % self.config.regenerate_every == 0
    }
    
    /// Advance transition: time, angle and version.
    ///
    /// `update_flag` is cleared unless a forced regenerate happened since the
    /// previous advance; that texture has not been published yet.
    pub fn advance(&mut self, dt: f32) {
        let carry = std::mem::take(&mut self.refresh_pending);
        let state = &mut self.state;
        state.update_flag = carry;
        state.time += dt;
        state.angle = self
            .config
            .angle_wrap
            .wrap(state.angle + dt * self.config.degrees_per_second);
        state.version += 1;
    }
    
    /// Forced regenerate: redraws the payload without touching the version.
    ///
    /// The refreshed flag survives into the snapshot of the next tick.
    pub fn regenerate(&mut self) {
        self.redraw();
        self.refresh_pending = true;
    }
    
    /// Redraws the payload from the current time, angle and version.
    fn redraw(&mut self) {
        let state = &mut self.state;
        state.payload = generate(state.dimensions(), state.time, state.angle, state.version);
        state.update_flag = true;
        self.regenerations += 1;
        
        info!(
            version = state.version,
            time = state.time,
            angle = state.angle,
            "generated texture"
        );
    }
    
    /// Restarts the sequence: time, angle and version go back to zero.
    ///
    /// The payload is left as is until the cadence next fires.
    pub fn reset(&mut self) {
        self.state.time = 0.0;
        self.state.angle = 0.0;
        self.state.version = 0;
        debug!("authority state reset");
    }
    
    /// One full tick: advance, then regenerate if the cadence says so.
    pub fn tick(&mut self, dt: f32) -> TickReport {
        self.advance(dt);
        
        let version = self.state.version;
        let regenerated = self.is_regeneration_version(version);
        if regenerated {
            self.redraw();
        }
        
        TickReport { version, regenerated }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    
    fn driver() -> AuthorityDriver {
        AuthorityDriver::new(Dimensions::square(8).unwrap(), DriverConfig::default())
    }
    
    #[test]
    fn test_initial_state_and_texture() {
        let driver = driver();
        let state = driver.state();
        
        assert_eq!(state.time, 0.0);
        assert_eq!(state.angle, 0.0);
        assert_eq!(state.version, 0);
        assert!(state.update_flag);
        assert_eq!(driver.regenerations(), 1);
        assert_eq!(state.payload, generate(state.dimensions(), 0.0, 0.0, 0));
    }
    
    #[test]
    fn test_single_tick_at_sixty_hz() {
        let mut driver = driver();
        let report = driver.tick(1.0 / 60.0);
        
        let state = driver.state();
        assert_relative_eq!(state.time, 0.0167, epsilon = 1e-4);
        assert_relative_eq!(state.angle, 1.5, epsilon = 1e-4);
        assert_eq!(state.version, 1);
        assert!(!report.regenerated);
        assert!(!state.update_flag);
        assert_eq!(driver.regenerations(), 1);
    }
    
    #[test]
    fn test_regeneration_cadence_boundaries() {
        let driver = driver();
        assert!(driver.is_regeneration_version(0));
        assert!(!driver.is_regeneration_version(29));
        assert!(driver.is_regeneration_version(30));
        assert!(!driver.is_regeneration_version(59));
        assert!(driver.is_regeneration_version(60));
    }
    
    #[test]
    fn test_tick_29_to_30_regenerates_once() {
        let mut driver = driver();
        for _ in 0..29 {
            assert!(!driver.tick(1.0 / 60.0).regenerated);
        }
        assert_eq!(driver.state().version, 29);
        let before = driver.regenerations();
        
        let report = driver.tick(1.0 / 60.0);
        
        assert!(report.regenerated);
        assert_eq!(report.version, 30);
        assert_eq!(driver.regenerations(), before + 1);
        
        let state = driver.state();
        assert!(state.update_flag);
        assert_eq!(
            state.payload,
            generate(state.dimensions(), state.time, state.angle, 30)
        );
    }
    
    #[test]
    fn test_update_flag_cleared_next_tick() {
        let mut driver = driver();
        for _ in 0..30 {
            driver.tick(0.01);
        }
        assert!(driver.state().update_flag);
        
        driver.tick(0.01);
        assert!(!driver.state().update_flag);
    }
    
    #[test]
    fn test_zero_dt_only_bumps_version() {
        let mut driver = driver();
        driver.tick(0.5);
        let (time, angle) = (driver.state().time, driver.state().angle);
        
        driver.tick(0.0);
        
        assert_eq!(driver.state().time, time);
        assert_eq!(driver.state().angle, angle);
        assert_eq!(driver.state().version, 2);
    }
    
    #[test]
    fn test_version_strictly_increments() {
        let mut driver = driver();
        for expected in 1..=200u64 {
            let report = driver.tick(1.0 / 30.0);
            assert_eq!(report.version, expected);
        }
    }
    
    #[test]
    fn test_reset_restarts_cadence() {
        let mut driver = driver();
        for _ in 0..47 {
            driver.tick(1.0 / 60.0);
        }
        
        driver.reset();
        assert_eq!(driver.state().time, 0.0);
        assert_eq!(driver.state().angle, 0.0);
        assert_eq!(driver.state().version, 0);
        
        let before = driver.regenerations();
        for _ in 0..29 {
            assert!(!driver.tick(1.0 / 60.0).regenerated);
        }
        assert!(driver.tick(1.0 / 60.0).regenerated);
        assert_eq!(driver.regenerations(), before + 1);
        assert_eq!(driver.state().version, 30);
    }
    
    #[test]
    fn test_forced_regenerate_keeps_version() {
        let mut driver = driver();
        driver.tick(0.25);
        let before = driver.snapshot();
        
        driver.regenerate();
        
        let after = driver.state();
        assert_eq!(after.version, before.version);
        assert!(after.update_flag);
        assert_eq!(after.payload, generate(after.dimensions(), after.time, after.angle, 1));
    }
    
    #[test]
    fn test_forced_regenerate_flag_reaches_next_tick() {
        let mut driver = driver();
        driver.tick(0.1);
        driver.tick(0.1);
        
        driver.regenerate();
        let forced = driver.state().payload.clone();
        let report = driver.tick(0.1);
        
        assert!(!report.regenerated);
        assert!(driver.state().update_flag);
        assert_eq!(driver.state().payload, forced);
        
        driver.tick(0.1);
        assert!(!driver.state().update_flag);
    }
    
    #[test]
    fn test_initial_texture_flag_cleared_by_first_tick() {
        let mut driver = driver();
        assert!(driver.state().update_flag);
        
        driver.tick(0.1);
        assert!(!driver.state().update_flag);
    }
    
    #[test]
    fn test_snapshot_is_isolated_from_later_ticks() {
        let mut driver = driver();
        for _ in 0..29 {
            driver.tick(0.1);
        }
        let snapshot = driver.snapshot();
        let pixels = snapshot.payload.as_bytes().to_vec();
        
        driver.tick(0.1);
        
        assert_eq!(snapshot.version, 29);
        assert_eq!(snapshot.payload.as_bytes(), &pixels[..]);
        assert_ne!(driver.state().payload, snapshot.payload);
    }
    
    #[test]
    fn test_wrap_at_boundary() {
        let mut driver = driver();
        // 4 seconds at 90 deg/s lands exactly on 360
        driver.tick(4.0);
        assert_eq!(driver.state().angle, 0.0);
    }
    
    #[test]
    fn test_single_subtraction_overshoots_on_large_dt() {
        let mut driver = driver();
        driver.tick(9.0); // 810 degrees in one step
        assert_eq!(driver.state().angle, 450.0);
        
        let mut modulo = AuthorityDriver::new(
            Dimensions::square(8).unwrap(),
            DriverConfig::default().with_angle_wrap(AngleWrap::Modulo),
        );
        modulo.tick(9.0);
        assert_eq!(modulo.state().angle, 90.0);
    }
    
    #[test]
    fn test_angle_wrap_parsing() {
        assert_eq!("single".parse::<AngleWrap>(), Ok(AngleWrap::SingleSubtraction));
        assert_eq!("MODULO".parse::<AngleWrap>(), Ok(AngleWrap::Modulo));
        assert!("clamp".parse::<AngleWrap>().is_err());
    }
    
    proptest! {
        #[test]
        fn prop_angle_bounded_for_sub_turn_steps(steps in proptest::collection::vec(0.0f32..3.99, 1..300)) {
            let mut driver = AuthorityDriver::new(
                Dimensions::square(2).unwrap(),
                DriverConfig::default().with_regenerate_every(0),
            );
            for dt in steps {
                driver.advance(dt);
                let angle = driver.state().angle;
                prop_assert!((0.0..360.0).contains(&angle), "angle {}", angle);
            }
        }
        
        #[test]
        fn prop_modulo_bounded_for_any_step(steps in proptest::collection::vec(0.0f32..1000.0, 1..100)) {
            let mut driver = AuthorityDriver::new(
                Dimensions::square(2).unwrap(),
                DriverConfig::default()
                    .with_regenerate_every(0)
                    .with_angle_wrap(AngleWrap::Modulo),
            );
            for dt in steps {
                driver.advance(dt);
                let angle = driver.state().angle;
                prop_assert!((0.0..360.0).contains(&angle), "angle {}", angle);
            }
        }
    }
}
