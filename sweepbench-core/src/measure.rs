//! Operation Timing
//!
//! Wall-clock timing around a single codec or allocator call, plus CPU
//! pinning for the worker thread.

use std::time::Instant;

/// Timer for measuring one operation
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer
    #[inline(always)]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Stop the timer and return elapsed nanoseconds
    #[inline(always)]
    pub fn stop(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
}

/// Convert nanoseconds to fractional milliseconds
#[inline]
pub fn nanos_to_ms(nanos: u64) -> f64 {
    nanos as f64 / 1_000_000.0
}

/// Set CPU affinity to pin the current thread to a specific core
///
/// Keeps consecutive operations on one core so timings are comparable.
#[cfg(target_os = "linux")]
pub fn pin_to_cpu(cpu: usize) -> Result<(), std::io::Error> {
    use std::mem::MaybeUninit;

    unsafe {
        let mut set = MaybeUninit::<libc::cpu_set_t>::zeroed();
        let set_ref = set.assume_init_mut();

        libc::CPU_ZERO(set_ref);
        libc::CPU_SET(cpu, set_ref);

        let result = libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), set_ref);

        if result == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn pin_to_cpu(_cpu: usize) -> Result<(), std::io::Error> {
    // CPU pinning not supported on this platform
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        std::thread::sleep(Duration::from_millis(10));
        let nanos = timer.stop();

        // Should be at least 5ms in nanos
        assert!(nanos >= 5_000_000);
    }

    #[test]
    fn test_nanos_to_ms() {
        assert_eq!(nanos_to_ms(1_500_000), 1.5);
        assert_eq!(nanos_to_ms(0), 0.0);
    }
}
