/// Batch configuration.
///
/// The parallel fill kicks in only when BOTH thresholds are exceeded; below
/// them thread spawn cost outweighs the work.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Used for GPU buffer labels and log lines.
    pub label: String,

    /// Record count that must be exceeded to fill in parallel. Default: 50.
    pub parallel_min_geometries: usize,

    /// Merged vertex count that must be exceeded to fill in parallel.
    /// Default: 5000.
    pub parallel_min_vertices: usize,

    /// Worker threads for the parallel fill. `None` uses
    /// [`std::thread::available_parallelism`].
    pub worker_threads: Option<usize>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            label: "geometry batch".to_string(),
            parallel_min_geometries: 50,
            parallel_min_vertices: 5000,
            worker_threads: None,
        }
    }
}

impl BatchConfig {
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Never fills in parallel.
    pub fn sequential() -> Self {
        Self {
            parallel_min_geometries: usize::MAX,
            parallel_min_vertices: usize::MAX,
            ..Self::default()
        }
    }

    /// Fills in parallel whenever there is at least one vertex.
    pub fn always_parallel() -> Self {
        Self {
            parallel_min_geometries: 0,
            parallel_min_vertices: 0,
            ..Self::default()
        }
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    pub(crate) fn use_parallel(&self, geometries: usize, vertices: usize) -> bool {
        geometries > self.parallel_min_geometries && vertices > self.parallel_min_vertices
    }

    pub(crate) fn effective_workers(&self) -> usize {
        self.worker_threads
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds() {
        let config = BatchConfig::default();
        assert_eq!(config.parallel_min_geometries, 50);
        assert_eq!(config.parallel_min_vertices, 5000);
        assert!(config.worker_threads.is_none());
    }

    #[test]
    fn both_thresholds_must_be_exceeded() {
        let config = BatchConfig::default();
        assert!(!config.use_parallel(50, 10_000));
        assert!(!config.use_parallel(100, 5000));
        assert!(config.use_parallel(51, 5001));
    }

    #[test]
    fn presets() {
        assert!(!BatchConfig::sequential().use_parallel(1_000_000, 1_000_000));
        assert!(BatchConfig::always_parallel().use_parallel(1, 1));
        assert!(!BatchConfig::always_parallel().use_parallel(1, 0));
    }

    #[test]
    fn effective_workers_respects_override() {
        assert_eq!(BatchConfig::default().with_worker_threads(3).effective_workers(), 3);
        assert_eq!(BatchConfig::default().with_worker_threads(0).effective_workers(), 1);
        assert!(BatchConfig::default().effective_workers() >= 1);
    }
}
