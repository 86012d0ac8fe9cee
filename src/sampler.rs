//! Admission sampler.
//!
//! Leaky bucket of one: a frame is admitted only when at least
//! `1 / target_fps` has passed since the previously admitted frame. Frames
//! arriving sooner are rejected, not queued; a stale live frame has no value.

use std::time::{Duration, Instant};

use crate::error::{IntakeError, Result};

/// Rate limiter deciding, per incoming live frame, whether to admit it.
#[derive(Clone, Debug)]
pub struct FrameSampler {
    target_interval: Duration,
    last_admitted: Option<Instant>,
    admitted: u64,
    rejected: u64,
}

impl FrameSampler {
    pub fn new(target_fps: f64) -> Result<Self> {
        if !target_fps.is_finite() || target_fps <= 0.0 {
            return Err(IntakeError::Config(format!(
                "target fps must be a positive number (got {})",
                target_fps
            )));
        }
        let target_interval = Duration::try_from_secs_f64(1.0 / target_fps).map_err(|_| {
            IntakeError::Config(format!(
                "target fps {} is too low to express as a frame interval",
                target_fps
            ))
        })?;
        Ok(Self {
            target_interval,
            last_admitted: None,
            admitted: 0,
            rejected: 0,
        })
    }

    pub fn target_interval(&self) -> Duration {
        self.target_interval
    }

    /// Decide for a frame arriving now.
    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Decide for a frame arriving at `now`.
    ///
    /// The first call always admits. Rejection leaves the state unchanged.
    pub fn allow_at(&mut self, now: Instant) -> bool {
        let admit = match self.last_admitted {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.target_interval,
        };
        if admit {
            self.last_admitted = Some(now);
            self.admitted += 1;
        } else {
            self.rejected += 1;
        }
        admit
    }

    pub fn admitted(&self) -> u64 {
        self.admitted
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn first_call_always_admits() -> Result<()> {
        let mut sampler = FrameSampler::new(1.0)?;
        assert!(sampler.allow());
        Ok(())
    }

    #[test]
    fn calls_closer_than_interval_are_rejected() -> Result<()> {
        let mut sampler = FrameSampler::new(5.0)?;
        let t0 = Instant::now();
        assert!(sampler.allow_at(t0));
        assert!(!sampler.allow_at(t0 + ms(50)));
        Ok(())
    }

    #[test]
    fn calls_further_than_interval_are_admitted() -> Result<()> {
        let mut sampler = FrameSampler::new(5.0)?;
        let t0 = Instant::now();
        assert!(sampler.allow_at(t0));
        assert!(sampler.allow_at(t0 + ms(250)));
        Ok(())
    }

    #[test]
    fn rejection_does_not_move_the_reference() -> Result<()> {
        let mut sampler = FrameSampler::new(5.0)?;
        let t0 = Instant::now();
        assert!(sampler.allow_at(t0));
        assert!(!sampler.allow_at(t0 + ms(150)));
        // 200ms after the last *admitted* frame, not after the rejected one.
        assert!(sampler.allow_at(t0 + ms(200)));
        assert_eq!((sampler.admitted(), sampler.rejected()), (2, 1));
        Ok(())
    }

    #[test]
    fn burst_is_thinned_to_target_rate() -> Result<()> {
        let mut sampler = FrameSampler::new(10.0)?;
        let t0 = Instant::now();
        // One second of frames at 100 fps.
        let admitted: Vec<u64> = (0..100)
            .filter(|i| sampler.allow_at(t0 + ms(i * 10)))
            .collect();
        assert_eq!(admitted.len(), 10);
        for pair in admitted.windows(2) {
            assert!(pair[1] - pair[0] >= 10);
        }
        Ok(())
    }

    #[test]
    fn non_positive_fps_is_rejected() {
        assert!(FrameSampler::new(0.0).is_err());
        assert!(FrameSampler::new(-3.0).is_err());
        assert!(FrameSampler::new(f64::NAN).is_err());
    }

    #[test]
    fn vanishingly_small_fps_is_a_config_error() {
        assert!(matches!(
            FrameSampler::new(1e-20),
            Err(IntakeError::Config(_))
        ));
        assert!(matches!(
            FrameSampler::new(f64::MIN_POSITIVE),
            Err(IntakeError::Config(_))
        ));
    }
}
