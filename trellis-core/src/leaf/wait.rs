use std::time::Duration;

use serde_json::json;

use crate::chip::{Behavior, ChipBase, MementoData, Signal};
use crate::error::Result;

const ELAPSED_KEY: &str = "elapsed";

/// Terminates once the accumulated tick time reaches its duration.
///
/// Time is summed from `TickInfo::time_since_last_tick` while active; paused
/// ticks do not count. The accumulated time survives a hot reload.
#[derive(Debug, Clone, PartialEq)]
pub struct Wait {
    /// Milliseconds.
    duration: f64,
    elapsed: f64,
}

impl Wait {
    pub fn new(duration: Duration) -> Self {
        Self::millis(duration.as_secs_f64() * 1000.0)
    }

    pub fn millis(duration: f64) -> Self {
        Self {
            duration,
            elapsed: 0.0,
        }
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }
}

impl Behavior for Wait {
    fn chip_type(&self) -> &'static str {
        "Wait"
    }

    fn on_activate(&mut self, chip: &mut ChipBase) -> Result<()> {
        self.elapsed = match chip.reload_memento() {
            Some(memento) => memento.field(ELAPSED_KEY)?.unwrap_or(0.0),
            None => 0.0,
        };
        Ok(())
    }

    fn on_tick(&mut self, chip: &mut ChipBase) -> Result<()> {
        self.elapsed += chip.tick_info().time_since_last_tick;
        if self.elapsed >= self.duration {
            chip.request_termination(Signal::default())?;
        }
        Ok(())
    }

    fn reload_memento_data(&self) -> Result<MementoData> {
        let mut data = MementoData::new();
        data.insert(ELAPSED_KEY.to_string(), json!(self.elapsed));
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::{Chip, ChipContext, ChipState, Leaf, ReloadMemento, TickInfo};

    fn activate(chip: &mut Leaf<Wait>, memento: Option<ReloadMemento>) {
        chip.activate(TickInfo::default(), ChipContext::new(), Signal::default(), memento)
            .unwrap();
    }

    #[test]
    fn ends_on_the_tick_that_crosses_the_duration() {
        let mut chip = Leaf::new(Wait::millis(50.0));
        activate(&mut chip, None);

        chip.tick(TickInfo::new(20.0)).unwrap();
        chip.tick(TickInfo::new(20.0)).unwrap();
        assert_eq!(chip.state(), ChipState::Active);

        chip.tick(TickInfo::new(20.0)).unwrap();
        assert_eq!(chip.state(), ChipState::Inactive);
        assert_eq!(chip.output_signal(), Some(&Signal::default()));
    }

    #[test]
    fn paused_time_does_not_count() {
        let mut chip = Leaf::new(Wait::new(Duration::from_millis(30)));
        activate(&mut chip, None);

        chip.pause(TickInfo::default()).unwrap();
        chip.tick(TickInfo::new(100.0)).unwrap();
        chip.resume(TickInfo::default()).unwrap();
        assert_eq!(chip.behavior().elapsed(), 0.0);
        assert_eq!(chip.state(), ChipState::Active);
    }

    #[test]
    fn reactivation_starts_over() {
        let mut chip = Leaf::new(Wait::millis(10.0));
        activate(&mut chip, None);
        chip.tick(TickInfo::new(15.0)).unwrap();
        assert_eq!(chip.state(), ChipState::Inactive);

        activate(&mut chip, None);
        assert_eq!(chip.behavior().elapsed(), 0.0);
    }

    #[test]
    fn elapsed_time_survives_reload() {
        let mut chip = Leaf::new(Wait::millis(100.0));
        activate(&mut chip, None);
        chip.tick(TickInfo::new(40.0)).unwrap();

        let memento = chip.make_reload_memento().unwrap();
        chip.terminate(None).unwrap();

        let mut reloaded = Leaf::new(Wait::millis(100.0));
        activate(&mut reloaded, Some(memento));
        assert_eq!(reloaded.behavior().elapsed(), 40.0);

        reloaded.tick(TickInfo::new(60.0)).unwrap();
        assert_eq!(reloaded.state(), ChipState::Inactive);
    }

    #[test]
    fn memento_of_another_type_is_ignored() {
        let mut data = MementoData::new();
        data.insert(ELAPSED_KEY.to_string(), json!(99.0));
        let foreign = ReloadMemento::new("Block").with_data(data);

        let mut chip = Leaf::new(Wait::millis(100.0));
        activate(&mut chip, Some(foreign));
        assert_eq!(chip.behavior().elapsed(), 0.0);
    }
}
