use serde::{Deserialize, Serialize};

use crate::chip::{ChipState, Signal};
use crate::composite::{ChipActivationInfo, Composite, CompositeBehavior, CompositeCore};
use crate::error::{ChipError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParallelOptions {
    /// Terminate once every child has terminated.
    pub terminate_on_completion: bool,
}

impl Default for ParallelOptions {
    fn default() -> Self {
        Self {
            terminate_on_completion: true,
        }
    }
}

/// Runs all of its children at once.
///
/// With `terminate_on_completion` (the default) the Parallel ends with the
/// default signal after its last child has ended, including right away when
/// it has no children at all.
#[derive(Debug, Clone)]
pub struct Parallel {
    entries: Vec<(String, ChipActivationInfo)>,
    options: ParallelOptions,
    next_id: usize,
}

impl Parallel {
    pub fn new<I>(children: impl IntoIterator<Item = I>) -> Self
    where
        I: Into<ChipActivationInfo>,
    {
        Self::with_options(children, ParallelOptions::default())
    }

    pub fn with_options<I>(children: impl IntoIterator<Item = I>, options: ParallelOptions) -> Self
    where
        I: Into<ChipActivationInfo>,
    {
        let mut parallel = Self {
            entries: Vec::new(),
            options,
            next_id: 0,
        };
        for info in children {
            parallel.push(info.into());
        }
        parallel
    }

    pub fn options(&self) -> &ParallelOptions {
        &self.options
    }

    /// Ids of every member, running or not.
    pub fn member_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    fn push(&mut self, mut info: ChipActivationInfo) -> String {
        let id = match &info.id {
            Some(id) => id.clone(),
            None => {
                let id = self.next_id.to_string();
                self.next_id += 1;
                info.id = Some(id.clone());
                id
            }
        };
        self.entries.push((id.clone(), info));
        id
    }

    fn request_completion(&self, core: &mut CompositeCore) -> Result<()> {
        if self.options.terminate_on_completion
            && core.child_count() == 0
            && !core.is_terminating()
        {
            core.request_termination(Signal::default())?;
        }
        Ok(())
    }
}

impl CompositeBehavior for Parallel {
    fn chip_type(&self) -> &'static str {
        "Parallel"
    }

    fn on_activate(&mut self, core: &mut CompositeCore) -> Result<()> {
        for (_, info) in &self.entries {
            core.activate_child_chip(info.clone())?;
        }
        self.request_completion(core)
    }

    fn on_after_tick(&mut self, core: &mut CompositeCore) -> Result<()> {
        self.request_completion(core)
    }
}

impl Composite<Parallel> {
    /// Add a member, activating it at once if the Parallel is running.
    /// Returns the member id.
    pub fn add_child_chip(&mut self, info: impl Into<ChipActivationInfo>) -> Result<String> {
        let info = info.into();
        self.with_behavior(|parallel, core| {
            if let Some(id) = &info.id {
                if parallel.entries.iter().any(|(member, _)| member == id) {
                    return Err(ChipError::DuplicateChildId(id.clone()));
                }
            }

            let next_id = parallel.next_id;
            let id = parallel.push(info);
            let started = parallel.entries.last().map(|(_, info)| info.clone());
            if let Some(info) = started.filter(|_| core.state() != ChipState::Inactive) {
                if let Err(err) = core.activate_child_chip(info) {
                    // A member that failed to start is not kept.
                    parallel.entries.pop();
                    parallel.next_id = next_id;
                    return Err(err);
                }
            }
            Ok(id)
        })
    }

    /// Remove a member, terminating its chip if it is running.
    pub fn remove_child_chip(&mut self, id: &str) -> Result<()> {
        self.with_behavior(|parallel, core| {
            let index = parallel
                .entries
                .iter()
                .position(|(member, _)| member == id)
                .ok_or_else(|| ChipError::UnknownChild(id.to_string()))?;
            parallel.entries.remove(index);

            if core.has_child(id) {
                core.terminate_child_chip(id, None)?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::{chip_ref, with_chip_mut, Chip, ChipContext, Leaf, TickInfo};
    use crate::leaf::{Block, Forever, Transitory};
    use crate::testing::MockChip;
    use std::rc::Rc;

    fn start(parallel: Parallel) -> Composite<Parallel> {
        let mut chip = Composite::new(parallel);
        chip.activate(TickInfo::default(), ChipContext::new(), Signal::default(), None)
            .unwrap();
        chip
    }

    #[test]
    fn ticks_every_child() {
        let (a, probe_a) = MockChip::new().into_parts();
        let (b, probe_b) = MockChip::new().into_parts();
        let mut chip = start(Parallel::new([Leaf::new(a), Leaf::new(b)]));

        chip.tick(TickInfo::new(16.0)).unwrap();
        chip.tick(TickInfo::new(16.0)).unwrap();
        assert_eq!(probe_a.ticks(), 2);
        assert_eq!(probe_b.ticks(), 2);
        assert_eq!(chip.core().child_ids(), vec!["0", "1"]);
    }

    #[test]
    fn empty_parallel_ends_immediately() {
        let chip = start(Parallel::new(Vec::<ChipActivationInfo>::new()));
        assert_eq!(chip.output_signal(), Some(&Signal::default()));
    }

    #[test]
    fn keeps_running_without_terminate_on_completion() {
        let mut chip = start(Parallel::with_options(
            [Leaf::new(Transitory::new("done"))],
            ParallelOptions {
                terminate_on_completion: false,
            },
        ));
        chip.tick(TickInfo::new(16.0)).unwrap();
        assert!(chip.output_signal().is_none());
        assert_eq!(chip.state(), ChipState::Active);
    }

    #[test]
    fn add_and_remove_members() {
        let mut chip = start(Parallel::new([Leaf::new(Forever)]));

        let block = chip_ref(Leaf::new(Block));
        let id = chip
            .add_child_chip(ChipActivationInfo::new(Rc::clone(&block)).id("block"))
            .unwrap();
        assert_eq!(id, "block");
        assert!(chip.core().has_child("block"));

        chip.remove_child_chip("block").unwrap();
        assert!(!chip.core().has_child("block"));
        assert_eq!(block.borrow().state(), ChipState::Inactive);
        assert_eq!(chip.behavior().member_ids().collect::<Vec<_>>(), vec!["0"]);

        let err = chip.remove_child_chip("block").unwrap_err();
        assert_eq!(err.code(), "CHIP_UNKNOWN_CHILD");
    }

    #[test]
    fn rejected_add_leaves_members_unchanged() {
        let mut chip = start(Parallel::new([ChipActivationInfo::new(Leaf::new(Forever)).id("a")]));

        let err = chip
            .add_child_chip(ChipActivationInfo::new(Leaf::new(Forever)).id("a"))
            .unwrap_err();
        assert_eq!(err.code(), "CHIP_DUPLICATE_CHILD_ID");
        assert_eq!(chip.behavior().member_ids().collect::<Vec<_>>(), vec!["a"]);

        chip.terminate(None).unwrap();
        chip.activate(TickInfo::default(), ChipContext::new(), Signal::default(), None)
            .unwrap();
        assert_eq!(chip.core().child_ids(), vec!["a"]);
    }

    #[test]
    fn removing_the_last_member_completes() {
        let block = chip_ref(Leaf::new(Block));
        let mut chip = start(Parallel::new([ChipActivationInfo::new(Rc::clone(&block))]));

        with_chip_mut::<Leaf<Block>, _>(&block, |b| b.done(None))
            .unwrap()
            .unwrap();
        chip.tick(TickInfo::new(16.0)).unwrap();
        assert_eq!(chip.output_signal(), Some(&Signal::default()));
    }

    #[test]
    fn options_from_json() {
        let options: ParallelOptions =
            crate::options::fill_in_options(&serde_json::json!({ "terminateOnCompletion": false }))
                .unwrap();
        assert!(!options.terminate_on_completion);
    }
}
