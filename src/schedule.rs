use std::num::{NonZeroU64, NonZeroUsize};

use crate::{Result, WganErr, config::TrainingConfig};

/// Decides when the generator trains, when losses are reported and when artifacts are saved.
#[derive(Debug, Clone)]
pub struct Schedule {
    critic_update_ratio: NonZeroU64,
    print_every: NonZeroU64,
    save_every: NonZeroUsize,
    epochs: usize,
}

impl Schedule {
    pub fn new(
        critic_update_ratio: NonZeroU64,
        print_every: NonZeroU64,
        save_every: NonZeroUsize,
        epochs: usize,
    ) -> Self {
        Self {
            critic_update_ratio,
            print_every,
            save_every,
            epochs,
        }
    }

    pub fn from_config(config: &TrainingConfig) -> Result<Self> {
        let nonzero = |name: &str| WganErr::Config(format!("{name} must be greater than 0"));

        Ok(Self::new(
            NonZeroU64::new(config.critic_update_ratio).ok_or_else(|| nonzero("critic_update_ratio"))?,
            NonZeroU64::new(config.print_every).ok_or_else(|| nonzero("print_every"))?,
            NonZeroUsize::new(config.save_every).ok_or_else(|| nonzero("save_every"))?,
            config.epochs,
        ))
    }

    /// Returns true if the generator is updated on this global step.
    #[inline]
    pub fn updates_generator(&self, step: u64) -> bool {
        step % self.critic_update_ratio.get() == 0
    }

    /// Returns true if the losses are evaluated and recorded on this global step.
    #[inline]
    pub fn reports(&self, step: u64) -> bool {
        step % self.print_every.get() == 0
    }

    /// Returns true if the boundary of this 0-based epoch writes a grid and a checkpoint.
    #[inline]
    pub fn saves_at(&self, epoch: usize) -> bool {
        epoch % self.save_every.get() == 0 || self.is_final(epoch)
    }

    #[inline]
    pub fn is_final(&self, epoch: usize) -> bool {
        epoch + 1 == self.epochs
    }

    pub fn epochs(&self) -> usize {
        self.epochs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(ratio: u64, print_every: u64, save_every: usize, epochs: usize) -> Schedule {
        Schedule::new(
            NonZeroU64::new(ratio).unwrap(),
            NonZeroU64::new(print_every).unwrap(),
            NonZeroUsize::new(save_every).unwrap(),
            epochs,
        )
    }

    #[test]
    fn generator_trains_every_ratio_steps() {
        let s = schedule(5, 30, 1, 1);

        let updates: Vec<u64> = (0..12).filter(|&step| s.updates_generator(step)).collect();
        assert_eq!(updates, [0, 5, 10]);
        assert!(s.reports(0));
        assert!(!s.reports(29));
        assert!(s.reports(60));
    }

    #[test]
    fn saves_on_cadence_and_on_the_final_epoch() {
        let s = schedule(5, 30, 3, 5);

        let saves: Vec<usize> = (0..5).filter(|&e| s.saves_at(e)).collect();
        assert_eq!(saves, [0, 3, 4]);
        assert!(s.is_final(4));
        assert!(!s.is_final(3));
    }

    #[test]
    fn zero_cadences_are_config_errors() {
        let config = TrainingConfig {
            print_every: 0,
            ..Default::default()
        };

        assert!(matches!(Schedule::from_config(&config), Err(WganErr::Config(_))));
    }
}
