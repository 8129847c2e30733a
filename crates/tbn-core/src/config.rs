use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

/// Locations of the external solver binaries plus the subprocess deadline.
/// Snapshotted from the environment once; CLI flags override field by field.
#[derive(Clone, Debug)]
pub struct SolverConfig {
    pub normaliz_path: PathBuf,
    pub fourtitwo_path: PathBuf,
    pub coffee_path: PathBuf,
    pub nupack_path: PathBuf,
    pub timeout: Option<Duration>,
}

impl SolverConfig {
    pub fn from_env() -> Self {
        let path = |var: &str, default: &str| -> PathBuf {
            std::env::var_os(var)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(default))
        };
        let timeout = std::env::var("TBN_SOLVER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        Self {
            normaliz_path: path("TBN_NORMALIZ_PATH", "normaliz"),
            fourtitwo_path: path("TBN_FOURTI2_PATH", "4ti2"),
            coffee_path: path("TBN_COFFEE_PATH", "coffee-cli"),
            nupack_path: path("TBN_NUPACK_PATH", "concentrations"),
            timeout,
        }
    }
}

static CONFIG: OnceLock<SolverConfig> = OnceLock::new();

/// The lazily initialised environment snapshot.
pub fn config() -> &'static SolverConfig {
    CONFIG.get_or_init(SolverConfig::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_environment() {
        let cfg = SolverConfig::from_env();
        assert!(!cfg.normaliz_path.as_os_str().is_empty());
        assert!(!cfg.fourtitwo_path.as_os_str().is_empty());
    }
}
