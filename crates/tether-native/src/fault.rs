use crate::BridgeError;
use std::cell::RefCell;

thread_local! {
    // One entry per active invocation on this thread, innermost last.
    static FAULTS: RefCell<Vec<Option<BridgeError>>> = const { RefCell::new(Vec::new()) };
}

/// Collects faults raised by trampolines while one invocation is in progress.
pub(crate) struct FaultScope {
    depth: usize,
}

impl FaultScope {
    pub(crate) fn enter() -> Self {
        FAULTS.with(|faults| {
            let mut faults = faults.borrow_mut();
            faults.push(None);
            FaultScope { depth: faults.len() }
        })
    }

    /// Ends the scope, returning the first fault recorded in it.
    pub(crate) fn finish(self) -> Option<BridgeError> {
        FAULTS.with(|faults| {
            faults
                .borrow_mut()
                .get_mut(self.depth - 1)
                .and_then(Option::take)
        })
    }
}

impl Drop for FaultScope {
    fn drop(&mut self) {
        FAULTS.with(|faults| faults.borrow_mut().truncate(self.depth - 1));
    }
}

/// Records `fault` against the innermost invocation on this thread.
pub(crate) fn report(fault: BridgeError) {
    FAULTS.with(|faults| match faults.borrow_mut().last_mut() {
        Some(Some(first)) => {
            log::warn!("{} (after earlier fault: {})", fault, first);
        }
        Some(slot) => {
            log::warn!("{}", fault);
            *slot = Some(fault);
        }
        None => {
            log::error!("{} (no invocation in progress)", fault);
        }
    });
}
