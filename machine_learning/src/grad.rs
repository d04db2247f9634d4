//! Gradient bookkeeping mode.
//!
//! Layers only keep the forward metadata needed by `backward` while gradient tracking is
//! enabled. Tracking is a per-thread flag that can be suspended for a scope with [`no_grad`].

use std::{cell::Cell, marker::PhantomData};

thread_local! {
    static GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Returns whether gradient bookkeeping is enabled on the current thread.
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(Cell::get)
}

/// Suspends gradient bookkeeping until the returned guard is dropped.
///
/// The previous state is restored on drop, so guards nest and unwinding out of the scope
/// never leaves tracking disabled.
///
/// # Returns
/// The guard owning the suspension.
#[must_use = "gradient tracking is restored as soon as the guard is dropped"]
pub fn no_grad() -> NoGradGuard {
    let prev = GRAD_ENABLED.with(|enabled| enabled.replace(false));
    NoGradGuard {
        prev,
        _thread_bound: PhantomData,
    }
}

/// Scoped suspension of gradient bookkeeping, see [`no_grad`].
pub struct NoGradGuard {
    prev: bool,
    // The flag is thread local, the guard must be dropped on the thread that created it.
    _thread_bound: PhantomData<*const ()>,
}

impl Drop for NoGradGuard {
    fn drop(&mut self) {
        GRAD_ENABLED.with(|enabled| enabled.set(self.prev));
    }
}

#[cfg(test)]
mod tests {
    use std::panic;

    use super::*;

    #[test]
    fn guard_restores_previous_state() {
        assert!(is_grad_enabled());
        {
            let _outer = no_grad();
            assert!(!is_grad_enabled());
            {
                let _inner = no_grad();
                assert!(!is_grad_enabled());
            }
            assert!(!is_grad_enabled());
        }
        assert!(is_grad_enabled());
    }

    #[test]
    fn guard_restores_on_unwind() {
        let res = panic::catch_unwind(|| {
            let _guard = no_grad();
            panic!("boom");
        });

        assert!(res.is_err());
        assert!(is_grad_enabled());
    }
}
