use std::sync::atomic::{AtomicBool, Ordering};

pub mod persistence;
pub mod version;

pub fn generate_id(prefix: &str) -> String {
    let value = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &value[..8])
}

/// Single-slot token for an operation that must not overlap with itself.
///
/// The flag is set while the guard lives and cleared on drop, on every exit path.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    /// Returns `None` when another holder already owns the flag.
    pub fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_is_exclusive_and_released_on_drop() {
        let flag = AtomicBool::new(false);
        let guard = InFlightGuard::try_acquire(&flag);
        assert!(guard.is_some());
        assert!(InFlightGuard::try_acquire(&flag).is_none());
        drop(guard);
        assert!(!flag.load(Ordering::Acquire));
        assert!(InFlightGuard::try_acquire(&flag).is_some());
    }

    #[test]
    fn ids_are_prefixed_and_unique() {
        let a = generate_id("item");
        let b = generate_id("item");
        assert!(a.starts_with("item-"));
        assert_ne!(a, b);
    }
}
