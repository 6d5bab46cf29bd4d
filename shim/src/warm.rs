use once_cell::sync::OnceCell;
use tracing::debug;

/// State kept for the lifetime of an execution environment.
///
/// The value is built by the first invocation that asks for it and handed out to every
/// later (warm) invocation of the same process. It is never rebuilt, so it must hold only
/// data that stays valid across invocations: clients, parsed configuration, caches the
/// handler means to share. A failed initialization leaves the cell empty and the next
/// invocation tries again.
///
/// ```
/// use shim_runtime::Warm;
///
/// static KEYS: Warm<Vec<&'static str>> = Warm::new("keys");
///
/// let keys = KEYS.get_or_init(|| vec!["alpha", "beta"]);
/// assert_eq!(keys.len(), 2);
/// assert!(KEYS.is_initialized());
/// ```
#[derive(Debug)]
pub struct Warm<T> {
    name: &'static str,
    cell: OnceCell<T>,
}

impl<T> Warm<T> {
    /// Creates an empty cell. `name` identifies the state in logs.
    pub const fn new(name: &'static str) -> Self {
        Warm {
            name,
            cell: OnceCell::new(),
        }
    }

    /// The value, if an earlier invocation initialized it.
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    /// Whether the value has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Returns the value, building it with `init` on first use.
    pub fn get_or_init<F>(&self, init: F) -> &T
    where
        F: FnOnce() -> T,
    {
        self.cell.get_or_init(|| {
            debug!(state = self.name, "initializing warm state");
            init()
        })
    }

    /// Returns the value, building it with `init` on first use. Errors are returned to
    /// the caller and leave the cell empty.
    pub fn get_or_try_init<F, E>(&self, init: F) -> Result<&T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.cell.get_or_try_init(|| {
            debug!(state = self.name, "initializing warm state");
            init()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn initializes_once() {
        let warm = Warm::new("counter");
        let calls = Cell::new(0);
        for _ in 0..3 {
            let value = warm.get_or_init(|| {
                calls.set(calls.get() + 1);
                42
            });
            assert_eq!(*value, 42);
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn failed_init_is_retried() {
        let warm: Warm<u32> = Warm::new("flaky");
        let first: Result<&u32, &str> = warm.get_or_try_init(|| Err("not yet"));
        assert_eq!(first, Err("not yet"));
        assert!(!warm.is_initialized());
        assert_eq!(warm.get_or_try_init::<_, &str>(|| Ok(7)), Ok(&7));
        assert_eq!(warm.get(), Some(&7));
    }

    #[test]
    fn usable_in_statics() {
        static SHARED: Warm<String> = Warm::new("shared");
        let first = SHARED.get_or_init(|| "first".to_owned()) as *const String;
        let second = SHARED.get_or_init(|| "second".to_owned()) as *const String;
        assert_eq!(first, second);
        assert_eq!(SHARED.get().map(String::as_str), Some("first"));
    }
}
