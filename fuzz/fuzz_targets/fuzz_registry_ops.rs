#![no_main]

use std::cell::Cell;
use std::rc::Rc;

use arbitrary::Arbitrary;
use deferral_callbacks::{Callback, Callbacks, RegistryFlags};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum RegistryOp {
    Add,
    AddAgain(u8),
    AddStopper,
    AddRefire,
    AddRemover(u8),
    Remove(u8),
    Fire(u8),
    Disable,
    Lock,
    Empty,
}

#[derive(Arbitrary, Debug)]
struct Input {
    flags: u8,
    ops: Vec<RegistryOp>,
}

fuzz_target!(|input: Input| {
    let flags = RegistryFlags::from_bits_truncate(input.flags);
    let registry: Callbacks<(), u8> = Callbacks::new(flags);
    let calls = Rc::new(Cell::new(0usize));
    let mut known: Vec<Callback<(), u8>> = Vec::new();
    let mut created = 0usize;

    let counting = |calls: &Rc<Cell<usize>>| {
        let calls = Rc::clone(calls);
        Callback::new(move |_: &u8| calls.set(calls.get() + 1))
    };

    for op in input.ops.into_iter().take(256) {
        let was_fired = registry.fired();
        let was_disabled = registry.disabled();
        let before = calls.get();

        if matches!(
            op,
            RegistryOp::Add | RegistryOp::AddStopper | RegistryOp::AddRefire | RegistryOp::AddRemover(_)
        ) {
            created += 1;
        }

        match op {
            RegistryOp::Add => {
                let cb = counting(&calls);
                known.push(cb.clone());
                registry.add(cb);
            }
            RegistryOp::AddAgain(i) => {
                if let Some(cb) = known.get(usize::from(i) % known.len().max(1)) {
                    registry.add(cb.clone());
                }
            }
            RegistryOp::AddStopper => {
                let c = Rc::clone(&calls);
                let cb = Callback::new(move |v: &u8| {
                    c.set(c.get() + 1);
                    *v % 2 == 0
                });
                known.push(cb.clone());
                registry.add(cb);
            }
            RegistryOp::AddRefire => {
                let c = Rc::clone(&calls);
                let handle = registry.clone();
                let cb = Callback::new(move |v: &u8| {
                    c.set(c.get() + 1);
                    if *v == 0 {
                        handle.fire(1);
                    }
                });
                registry.add(cb);
            }
            RegistryOp::AddRemover(i) => {
                let c = Rc::clone(&calls);
                let handle = registry.clone();
                let victim = known.get(usize::from(i) % known.len().max(1)).cloned();
                let cb = Callback::new(move |_: &u8| {
                    c.set(c.get() + 1);
                    if let Some(victim) = &victim {
                        handle.remove(victim);
                    }
                });
                registry.add(cb);
            }
            RegistryOp::Remove(i) => {
                if let Some(cb) = known.get(usize::from(i) % known.len().max(1)) {
                    registry.remove(cb);
                    assert!(!registry.has(cb));
                }
            }
            RegistryOp::Fire(v) => {
                registry.fire(v);
            }
            RegistryOp::Disable => {
                registry.disable();
                assert!(registry.disabled());
            }
            RegistryOp::Lock => {
                registry.lock();
                assert!(registry.locked());
            }
            RegistryOp::Empty => {
                registry.empty();
                assert!(registry.is_empty());
            }
        }

        assert!(!registry.is_firing());
        assert!(!was_fired || registry.fired());
        if was_disabled {
            assert!(registry.disabled());
            assert_eq!(calls.get(), before);
            assert!(registry.is_empty());
        }
        if flags.contains(RegistryFlags::UNIQUE) {
            assert!(registry.len() <= created);
        }
    }

    // Listeners hold handles to the registry.
    registry.disable();
});
