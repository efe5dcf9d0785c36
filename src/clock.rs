use std::time::{SystemTime, UNIX_EPOCH};

/// Fuente de tiempo en segundos desde epoch.
///
/// Las ventanas de rate limiting y el store embebido leen la hora a través de
/// este trait para que los tests puedan avanzar el reloj manualmente.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Reloj del sistema
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

#[cfg(test)]
pub use manual::ManualClock;
