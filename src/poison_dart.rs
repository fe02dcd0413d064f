// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

pub type PoisonSignal = Arc<AtomicBool>;

/// RAII guard to catch panics in the compaction thread
/// and poison the tree
pub struct PoisonDart {
    name: &'static str,
    signal: PoisonSignal,
}

impl PoisonDart {
    pub fn new(name: &'static str, signal: PoisonSignal) -> Self {
        Self { name, signal }
    }

    /// Marks the tree as unusable.
    pub fn poison(&self) {
        log::error!("Poisoning tree because of failure in {:?}", self.name);
        self.signal.store(true, Ordering::Release);
    }
}

impl Drop for PoisonDart {
    fn drop(&mut self) {
        if std::thread::panicking() {
            log::error!("Panic in background worker {:?}", self.name);
            self.poison();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn poison_dart_on_panic() {
        let signal = PoisonSignal::default();

        let handle = {
            let signal = signal.clone();

            std::thread::spawn(move || {
                let _dart = PoisonDart::new("test", signal);
                panic!("oops");
            })
        };

        assert!(handle.join().is_err());
        assert!(signal.load(Ordering::Acquire));
    }

    #[test]
    fn poison_dart_clean_exit() {
        let signal = PoisonSignal::default();

        {
            let _dart = PoisonDart::new("test", signal.clone());
        }

        assert!(!signal.load(Ordering::Acquire));
    }
}
