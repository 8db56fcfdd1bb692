//! Process-wide panic hook.
//!
//! Backtraces must be captured while the panicking frame is still on the
//! stack, which only a hook can do. Panics raised inside a guard scope are
//! stashed in a thread-local for the guard to log; all other panics are
//! handed to the previously installed hook unchanged.

use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic;
use std::sync::Once;

thread_local! {
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_REPORT: RefCell<Option<PanicReport>> = const { RefCell::new(None) };
}

static INSTALL: Once = Once::new();

/// What the hook saw at the panic site.
#[derive(Debug, Clone, Default)]
pub struct PanicReport {
    pub location: Option<String>,
    pub backtrace: String,
}

/// Install the hook. Idempotent.
pub fn install_hook() {
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if in_guard() {
                let report = PanicReport {
                    location: info.location().map(|l| l.to_string()),
                    backtrace: Backtrace::force_capture().to_string(),
                };
                LAST_REPORT.with(|slot| *slot.borrow_mut() = Some(report));
            } else {
                previous(info);
            }
        }));
    });
}

/// Take the report left by the most recent guarded panic on this thread.
pub fn take_report() -> Option<PanicReport> {
    LAST_REPORT.with(|slot| slot.borrow_mut().take())
}

/// Whether the current thread is executing inside a guard.
pub fn in_guard() -> bool {
    GUARD_DEPTH.with(Cell::get) > 0
}

/// Marks the current thread as inside a guard until dropped.
pub(crate) struct GuardScope(());

impl GuardScope {
    pub(crate) fn enter() -> Self {
        GUARD_DEPTH.with(|depth| depth.set(depth.get() + 1));
        GuardScope(())
    }
}

impl Drop for GuardScope {
    fn drop(&mut self) {
        GUARD_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}
