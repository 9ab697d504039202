use indexmap::IndexMap;
use tracing::trace;

use crate::chip::Signal;
use crate::composite::{ChipActivationInfo, CompositeBehavior, CompositeCore};
use crate::error::Result;

#[derive(Debug, Clone)]
struct Branch {
    info: ChipActivationInfo,
    signal: Option<Signal>,
}

/// Races its children: the first one to terminate decides the outcome.
///
/// The Alternative ends with the signal configured for the winning branch.
/// Without one it passes on the winner's own signal, and a winner that ended
/// with the default signal is reported by its index (`"0"`, `"1"`, ...).
/// Later terminations are ignored.
#[derive(Debug, Clone)]
pub struct Alternative {
    branches: Vec<Branch>,
    /// Child id to branch index.
    ids: IndexMap<String, usize>,
    child_terminated: bool,
}

impl Alternative {
    pub fn new<I>(children: impl IntoIterator<Item = I>) -> Self
    where
        I: Into<ChipActivationInfo>,
    {
        Self {
            branches: children
                .into_iter()
                .map(|info| Branch {
                    info: info.into(),
                    signal: None,
                })
                .collect(),
            ids: IndexMap::new(),
            child_terminated: false,
        }
    }

    /// Add a branch that ends the Alternative with `signal` when it wins.
    #[must_use]
    pub fn branch(mut self, info: impl Into<ChipActivationInfo>, signal: impl Into<Signal>) -> Self {
        self.branches.push(Branch {
            info: info.into(),
            signal: Some(signal.into()),
        });
        self
    }

    fn winning_signal(&self, index: usize, signal: &Signal) -> Signal {
        match self.branches.get(index).and_then(|branch| branch.signal.clone()) {
            Some(configured) => configured,
            None if signal.is_default() => Signal::new(index.to_string()),
            None => signal.clone(),
        }
    }
}

impl CompositeBehavior for Alternative {
    fn chip_type(&self) -> &'static str {
        "Alternative"
    }

    fn on_activate(&mut self, core: &mut CompositeCore) -> Result<()> {
        self.child_terminated = false;
        self.ids.clear();

        for (index, branch) in self.branches.iter().enumerate() {
            let id = branch
                .info
                .id
                .clone()
                .unwrap_or_else(|| index.to_string());
            self.ids.insert(id.clone(), index);
            core.activate_child_chip(branch.info.clone().id(id))?;
        }
        Ok(())
    }

    fn on_child_terminated(
        &mut self,
        core: &mut CompositeCore,
        id: &str,
        signal: &Signal,
    ) -> Result<()> {
        if self.child_terminated {
            return Ok(());
        }
        let Some(&index) = self.ids.get(id) else {
            return Ok(());
        };
        self.child_terminated = true;

        let winner = self.winning_signal(index, signal);
        trace!(child = %id, signal = %winner, "alternative decided");
        core.request_termination(winner)
    }
}
