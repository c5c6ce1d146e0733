use std::thread;

use tracing::warn;

/// Host-derived runtime settings for the server binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemProfile {
    pub logical_cores: usize,
    pub worker_threads: usize,
    pub strict_durability: bool, // true = fsync per record, false = OS buffer (faster)
}

impl SystemProfile {
    pub fn detect() -> Self {
        let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self::for_cores(cores)
    }

    pub fn for_cores(cores: usize) -> Self {
        // Single core: fsync would stall every encode behind the disk.
        if cores <= 1 {
            warn!("CPU constraint detected (cores: {}); disabling fsync", cores);
            Self {
                logical_cores: cores,
                worker_threads: 2, // 1 Compute + 1 I/O
                strict_durability: false,
            }
        } else {
            Self {
                logical_cores: cores,
                worker_threads: cores,
                strict_durability: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_core_relaxes_durability() {
        let p = SystemProfile::for_cores(1);
        assert_eq!(p.worker_threads, 2);
        assert!(!p.strict_durability);
    }

    #[test]
    fn test_multi_core_uses_every_core() {
        let p = SystemProfile::for_cores(8);
        assert_eq!(p.worker_threads, 8);
        assert!(p.strict_durability);
    }
}
