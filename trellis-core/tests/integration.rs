//! Integration Tests for Chip Composition
//!
//! These tests drive whole chip trees through the public API, the way a host
//! application would.

use std::cell::RefCell;
use std::rc::Rc;

use trellis_core::combinators::{
    Alternative, ContextProvider, Parallel, Sequence, SequenceOptions, StateDescriptor,
    StateMachine, StateMachineOptions,
};
use trellis_core::leaf::{Block, Forever, Lambda, Transitory, Wait};
use trellis_core::testing::{ChipHarness, MockChip};
use trellis_core::{
    chip_ref, with_chip_mut, Chip, ChipActivationInfo, ChipContext, ChipEvent, ChipState,
    Composite, Leaf, ReloadMemento, Signal, TickInfo,
};

fn frame() -> TickInfo {
    TickInfo::new(16.0)
}

fn start<C: Chip>(chip: &mut C) {
    chip.activate(TickInfo::default(), ChipContext::new(), Signal::default(), None)
        .unwrap();
}

fn finish_block(block: &trellis_core::ChipRef, signal: &str) {
    with_chip_mut::<Leaf<Block>, _>(block, |b| b.done(Some(Signal::new(signal))))
        .unwrap()
        .unwrap();
}

/// Test that a sequence hands over from one child to the next.
#[test]
fn sequence_advances_to_next_child() {
    let (a, probe_a) = MockChip::new().terminate_on_tick(2, "x").into_parts();
    let (b, probe_b) = MockChip::new().into_parts();
    let (c, probe_c) = MockChip::new().into_parts();

    let mut sequence = Composite::new(Sequence::new([Leaf::new(a), Leaf::new(b), Leaf::new(c)]));
    start(&mut sequence);
    sequence.tick(frame()).unwrap();
    assert_eq!(sequence.core().child_ids(), vec!["0"]);

    // A ends with "x" during this tick
    sequence.tick(frame()).unwrap();
    assert_eq!(sequence.core().child_ids(), vec!["1"]);
    assert_eq!(probe_a.terminations(), 1);
    assert_eq!(probe_b.activations(), 1);
    assert_eq!(probe_c.activations(), 0);
    assert!(sequence.output_signal().is_none());
}

/// Test that a looping sequence restarts and never ends on its own.
#[test]
fn looping_sequence_never_ends() {
    let (a, probe_a) = MockChip::new().terminate_on_tick(1, "a").into_parts();
    let (b, probe_b) = MockChip::new().terminate_on_tick(1, "b").into_parts();
    let options = SequenceOptions {
        looping: true,
        ..SequenceOptions::default()
    };

    let mut sequence = Composite::new(Sequence::with_options([Leaf::new(a), Leaf::new(b)], options));
    start(&mut sequence);

    for _ in 0..5 {
        sequence.tick(frame()).unwrap();
        assert!(sequence.output_signal().is_none());
        assert_eq!(sequence.core().child_count(), 1);
    }
    assert_eq!(probe_a.activations(), 3);
    assert_eq!(probe_b.activations(), 3);
    assert_eq!(sequence.state(), ChipState::Active);
}

/// Test that a parallel ends only after every child has ended.
#[test]
fn parallel_completes_after_all_children() {
    let a = chip_ref(Leaf::new(Block));
    let b = chip_ref(Leaf::new(Block));
    let mut parallel = Composite::new(Parallel::new([Rc::clone(&a), Rc::clone(&b)]));
    start(&mut parallel);

    finish_block(&a, "a");
    parallel.tick(frame()).unwrap();
    assert!(parallel.output_signal().is_none());
    assert_eq!(b.borrow().state(), ChipState::Active);

    finish_block(&b, "b");
    parallel.tick(frame()).unwrap();
    assert_eq!(parallel.output_signal(), Some(&Signal::default()));

    parallel.tick(frame()).unwrap();
    assert_eq!(parallel.state(), ChipState::Inactive);
}

/// Test that the signal table moves a state machine to the next state.
#[test]
fn state_machine_follows_signal_table() {
    let x = MockChip::new().terminate_on_tick(1, "anything");
    let mut machine = Composite::new(StateMachine::new(
        [
            ("a", StateDescriptor::new(Leaf::new(x))),
            ("b", StateDescriptor::new(Leaf::new(Forever))),
        ],
        StateMachineOptions::default()
            .starting_state("a")
            .signal("a", "b"),
    ));
    start(&mut machine);
    assert_eq!(machine.core().child_ids(), vec!["a"]);

    machine.tick(frame()).unwrap();
    assert_eq!(machine.core().child_ids(), vec!["b"]);

    let visited: Vec<&str> = machine
        .behavior()
        .visited_states()
        .iter()
        .map(Signal::name)
        .collect();
    assert_eq!(visited, vec!["a", "b"]);
}

/// Test that reaching an ending state ends the machine without a chip.
#[test]
fn state_machine_stops_at_ending_state() {
    let activated = Rc::new(RefCell::new(Vec::new()));
    let mut machine = Composite::new(StateMachine::new(
        [("start", Leaf::new(Transitory::new("done")))],
        StateMachineOptions::default()
            .signal("start", "end")
            .ending_states(["end"]),
    ));
    let sink = Rc::clone(&activated);
    machine
        .events()
        .on(trellis_core::chip::ACTIVATED_CHILD_CHIP, move |event: &ChipEvent| {
            if let ChipEvent::ActivatedChildChip { id } = event {
                sink.borrow_mut().push(id.clone());
            }
        });

    start(&mut machine);
    machine.tick(frame()).unwrap();
    assert_eq!(machine.output_signal().map(Signal::name), Some("end"));

    machine.tick(frame()).unwrap();
    assert_eq!(machine.state(), ChipState::Inactive);
    assert_eq!(*activated.borrow(), vec!["start"]);
}

/// Test that the first child to end decides an alternative.
#[test]
fn alternative_takes_first_winner() {
    let a = chip_ref(Leaf::new(Block));
    let b = chip_ref(Leaf::new(Block));
    let mut alternative = Composite::new(Alternative::new([Rc::clone(&a), Rc::clone(&b)]));
    start(&mut alternative);

    finish_block(&b, "won");
    alternative.tick(frame()).unwrap();
    assert_eq!(alternative.output_signal(), Some(&Signal::new("won")));

    // A ends too, then the alternative completes
    finish_block(&a, "lost");
    alternative.tick(frame()).unwrap();
    assert_eq!(alternative.state(), ChipState::Inactive);
    assert_eq!(alternative.output_signal(), Some(&Signal::new("won")));
}

/// Test that nested composites forward ticks down the tree.
#[test]
fn nested_composites_run_to_completion() {
    let mut harness = ChipHarness::new(chip_ref(Composite::new(Sequence::new([
        ChipActivationInfo::new(Composite::new(Parallel::new([
            Leaf::new(Wait::millis(30.0)),
            Leaf::new(Wait::millis(50.0)),
        ]))),
        ChipActivationInfo::new(Leaf::new(Transitory::new("over"))),
    ]))))
    .with_step(10.0);

    assert_eq!(harness.run(100).unwrap(), Some(Signal::new("over")));
    assert!(harness.elapsed_ticks() < 100);
}

/// Test that a provider chip is reachable from deep inside the main chip.
#[test]
fn context_provider_reaches_descendants() {
    let found = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&found);
    let lookup = Lambda::new(move |context: &ChipContext, _: &Signal| {
        *sink.borrow_mut() = context.chip("music").map(|chip| {
            let state = chip.borrow().state();
            state
        });
    });

    let mut provider = Composite::new(ContextProvider::new(
        [("music", Leaf::new(Forever))],
        Composite::new(Sequence::new([Leaf::new(lookup)])),
    ));
    start(&mut provider);
    assert_eq!(*found.borrow(), Some(ChipState::Active));
}

/// Test that a reload memento restores nested progress.
#[test]
fn reload_memento_restores_progress() {
    let build = || {
        Composite::new(Sequence::new([
            ChipActivationInfo::new(Leaf::new(Wait::millis(100.0))),
            ChipActivationInfo::new(Leaf::new(Forever)),
        ]))
    };

    let mut before = build();
    start(&mut before);
    before.tick(TickInfo::new(40.0)).unwrap();
    let bytes = before.make_reload_memento().unwrap().to_msgpack().unwrap();
    before.terminate(None).unwrap();

    // Fresh chips, as after a code swap
    let memento = ReloadMemento::from_msgpack(&bytes).unwrap();
    let mut after = build();
    after
        .activate(TickInfo::default(), ChipContext::new(), Signal::default(), Some(memento))
        .unwrap();
    assert_eq!(after.core().child_ids(), vec!["0"]);

    after.tick(TickInfo::new(60.0)).unwrap();
    assert_eq!(after.core().child_ids(), vec!["1"]);
}

/// Test that a memento is idempotent when nothing changed in between.
#[test]
fn reload_memento_is_stable() {
    let mut machine = Composite::new(StateMachine::new(
        [
            ("start", StateDescriptor::new(Leaf::new(Forever))),
            ("level", StateDescriptor::new(Leaf::new(Wait::millis(500.0)))),
        ],
        StateMachineOptions::default(),
    ));
    start(&mut machine);
    machine.change_state("level").unwrap();
    machine.tick(TickInfo::new(25.0)).unwrap();

    let first = machine.make_reload_memento().unwrap();
    machine.terminate(None).unwrap();
    machine
        .activate(TickInfo::default(), ChipContext::new(), Signal::default(), Some(first.clone()))
        .unwrap();
    let second = machine.make_reload_memento().unwrap();

    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
}

/// Test that lifecycle calls out of order are rejected.
#[test]
fn lifecycle_order_is_enforced() {
    let mut chip = Composite::new(Parallel::new([Leaf::new(Forever)]));
    assert_eq!(chip.tick(frame()).unwrap_err().code(), "CHIP_INVALID_STATE");
    assert_eq!(chip.terminate(None).unwrap_err().code(), "CHIP_INVALID_STATE");
    assert_eq!(chip.resume(frame()).unwrap_err().code(), "CHIP_INVALID_STATE");

    start(&mut chip);
    assert!(chip.output_signal().is_none());
    assert_eq!(
        chip.activate(TickInfo::default(), ChipContext::new(), Signal::default(), None)
            .unwrap_err()
            .code(),
        "CHIP_INVALID_STATE"
    );

    chip.pause(frame()).unwrap();
    assert_eq!(chip.pause(frame()).unwrap_err().code(), "CHIP_INVALID_STATE");
    chip.resume(frame()).unwrap();

    chip.terminate(Some(Signal::new("stop"))).unwrap();
    assert_eq!(chip.output_signal(), Some(&Signal::new("stop")));
    assert!(chip.children().is_empty());
}

/// Test that a terminated chip can be activated again from scratch.
#[test]
fn chips_can_be_reactivated() {
    let (mock, probe) = MockChip::new().terminate_on_tick(1, "again").into_parts();
    let mut harness = ChipHarness::new(chip_ref(Composite::new(Sequence::new([Leaf::new(mock)]))));

    assert_eq!(harness.run(10).unwrap(), Some(Signal::new("again")));
    assert_eq!(harness.run(10).unwrap(), Some(Signal::new("again")));
    assert_eq!(probe.activations(), 2);
    assert_eq!(probe.terminations(), 2);
}
