use indexmap::IndexMap;

use crate::chip::Signal;
use crate::composite::{ChipActivationInfo, CompositeBehavior, CompositeCore};
use crate::error::Result;

/// Id of the main child.
pub const MAIN_CHIP_ID: &str = "main";

/// Activates provider chips, then a main chip that can reach them.
///
/// Each provider is exposed in the context of later children under its name,
/// so the main chip (and its descendants) can look it up with
/// [`ChipContext::chip`](crate::chip::ChipContext::chip). The ContextProvider
/// ends with the main chip's signal.
#[derive(Debug, Clone)]
pub struct ContextProvider {
    providers: IndexMap<String, ChipActivationInfo>,
    main: ChipActivationInfo,
}

impl ContextProvider {
    pub fn new<K, P>(
        providers: impl IntoIterator<Item = (K, P)>,
        main: impl Into<ChipActivationInfo>,
    ) -> Self
    where
        K: Into<String>,
        P: Into<ChipActivationInfo>,
    {
        Self {
            providers: providers
                .into_iter()
                .map(|(name, info)| (name.into(), info.into()))
                .collect(),
            main: main.into(),
        }
    }

    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}

impl CompositeBehavior for ContextProvider {
    fn chip_type(&self) -> &'static str {
        "ContextProvider"
    }

    fn on_activate(&mut self, core: &mut CompositeCore) -> Result<()> {
        for (name, info) in &self.providers {
            core.activate_child_chip(
                info.clone()
                    .id(name.clone())
                    .include_in_child_context(true),
            )?;
        }

        let main = core.activate_child_chip(self.main.clone().id(MAIN_CHIP_ID))?;
        if main.is_none() {
            core.request_termination(Signal::default())?;
        }
        Ok(())
    }

    fn on_child_terminated(
        &mut self,
        core: &mut CompositeCore,
        id: &str,
        signal: &Signal,
    ) -> Result<()> {
        if id == MAIN_CHIP_ID {
            core.request_termination(signal.clone())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::{Chip, ChipContext, ChipState, Leaf, TickInfo};
    use crate::composite::Composite;
    use crate::leaf::{Forever, Lambda};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn main_chip_sees_providers() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let main = Lambda::new(move |context: &ChipContext, _: &Signal| {
            let audio = context.chip("audio").map(|chip| {
                let chip_type = chip.borrow().chip_type();
                chip_type
            });
            sink.borrow_mut().push(audio);
            "ready"
        });

        let mut chip = Composite::new(ContextProvider::new(
            [("audio", Leaf::new(Forever))],
            Leaf::new(main),
        ));
        chip.activate(TickInfo::default(), ChipContext::new(), Signal::default(), None)
            .unwrap();

        assert_eq!(*seen.borrow(), vec![Some("Forever")]);
        assert_eq!(chip.output_signal(), Some(&Signal::new("ready")));

        chip.tick(TickInfo::new(16.0)).unwrap();
        assert_eq!(chip.state(), ChipState::Inactive);
        assert!(chip.children().is_empty());
    }

    #[test]
    fn providers_leave_the_context_when_they_end() {
        let mut chip = Composite::new(ContextProvider::new(
            [("audio", Leaf::new(Forever))],
            Leaf::new(Forever),
        ));
        chip.activate(TickInfo::default(), ChipContext::new(), Signal::default(), None)
            .unwrap();
        assert!(chip.core().child_context(None).chip("audio").is_some());

        chip.with_behavior(|_, core| core.terminate_child_chip("audio", None))
            .unwrap();
        assert!(chip.core().child_context(None).chip("audio").is_none());
        assert_eq!(chip.core().child_ids(), vec![MAIN_CHIP_ID]);
    }
}
