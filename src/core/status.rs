use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide readiness flag.
///
/// Flipped once the configuration is loaded and every routing operation has
/// its handler chains built. Read by the readiness probe endpoint.
static GATEWAY_READY: AtomicBool = AtomicBool::new(false);

/// Mark the gateway as ready to accept traffic.
pub fn mark_ready(operations: usize) {
    GATEWAY_READY.store(true, Ordering::SeqCst);
    log::info!("{operations} routing operations initialized, gateway is ready");
}

/// Check if the gateway is ready to handle traffic.
pub fn is_ready() -> bool {
    GATEWAY_READY.load(Ordering::SeqCst)
}

/// Reset readiness status (useful for testing)
#[allow(dead_code)]
pub fn reset() {
    GATEWAY_READY.store(false, Ordering::SeqCst);
    log::debug!("Readiness status reset");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests share the global flag, serialize them.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_initial_state_not_ready() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset();
        assert!(!is_ready());
    }

    #[test]
    fn test_mark_ready() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset();
        mark_ready(3);
        assert!(is_ready());
        mark_ready(3);
        assert!(is_ready());
    }
}
