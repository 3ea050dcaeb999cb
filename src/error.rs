//! Error types.
//!
//! Library code returns one of the typed enums below. The binary collapses
//! everything into [`AppError`], which carries the process exit code.

/// Problems detected before any fitting starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("basis set is empty")]
    EmptyBasis,

    #[error("basis metabolite '{0}' appears more than once")]
    DuplicateMetabolite(String),

    #[error("basis signal '{name}' has {got} points, expected {expected}")]
    BasisLength {
        name: String,
        got: usize,
        expected: usize,
    },

    #[error("basis has {basis} points but the acquisition has {data}")]
    PointMismatch { basis: usize, data: usize },

    #[error("basis bandwidth {basis} Hz does not match acquisition bandwidth {data} Hz")]
    BandwidthMismatch { basis: f64, data: f64 },

    #[error("{groups} metabolite group ids given for {metabolites} basis signals")]
    GroupCount { groups: usize, metabolites: usize },

    #[error("metabolite group ids must be contiguous from 0 (missing id {0})")]
    NonContiguousGroups(usize),

    #[error("reference metabolite '{0}' is not in the basis set")]
    UnknownReference(String),

    #[error("none of the internal reference metabolites {0:?} are in the basis set")]
    NoInternalReference(Vec<String>),

    #[error("cannot combine unknown metabolite '{0}'")]
    UnknownCombineName(String),

    #[error("ppm window [{lo}, {hi}] contains no spectral points")]
    EmptyWindow { lo: f64, hi: f64 },

    #[error("shape mismatch: {what} has shape {got:?}, expected {expected:?}")]
    ShapeMismatch {
        what: &'static str,
        got: Vec<usize>,
        expected: Vec<usize>,
    },

    #[error("mask selects no voxels")]
    EmptyMask,

    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

/// Failures inside one spectral fit.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("spectrum contains non-finite values")]
    NonFiniteData,

    #[error("initial guess has {got} parameters, model expects {expected}")]
    InitialGuessLength { got: usize, expected: usize },

    #[error("could not compute an initial amplitude estimate")]
    InitialGuessFailed,

    #[error("normal equations could not be solved at iteration {0}")]
    Singular(usize),

    #[error("sampler failed: {0}")]
    Sampler(String),
}

/// Failures while scaling or combining a fit result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QuantifyError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Why a single voxel has no result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VoxelError {
    #[error("voxel {index}: fit failed: {source}")]
    Fit { index: usize, source: FitError },

    #[error("voxel {index}: quantification failed: {source}")]
    Quantify { index: usize, source: QuantifyError },

    #[error("voxel {index}: worker panicked: {message}")]
    Panicked { index: usize, message: String },
}

impl VoxelError {
    pub fn index(&self) -> usize {
        match self {
            VoxelError::Fit { index, .. }
            | VoxelError::Quantify { index, .. }
            | VoxelError::Panicked { index, .. } => *index,
        }
    }
}

/// Errors that abort a whole volumetric run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("worker pool could not be started: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::new(2, format!("Configuration error: {err}"))
    }
}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        AppError::new(3, format!("Fit failed: {err}"))
    }
}

impl From<RunError> for AppError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Config(e) => e.into(),
            RunError::Pool(e) => AppError::new(4, format!("Worker pool failure: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_messages() {
        let err = ConfigError::GroupCount {
            groups: 3,
            metabolites: 2,
        };
        assert_eq!(
            err.to_string(),
            "3 metabolite group ids given for 2 basis signals"
        );
        assert_eq!(
            ConfigError::UnknownReference("Cr".into()).to_string(),
            "reference metabolite 'Cr' is not in the basis set"
        );
    }

    #[test]
    fn voxel_error_keeps_index() {
        let err = VoxelError::Panicked {
            index: 17,
            message: "boom".into(),
        };
        assert_eq!(err.index(), 17);
        assert_eq!(err.to_string(), "voxel 17: worker panicked: boom");
    }

    #[test]
    fn app_error_exit_codes() {
        let app: AppError = ConfigError::EmptyMask.into();
        assert_eq!(app.exit_code(), 2);
        let app: AppError = FitError::NonFiniteData.into();
        assert_eq!(app.exit_code(), 3);
    }

    #[test]
    fn errors_are_send_and_sync() {
        fn assert_impl<T: Send + Sync + std::error::Error>() {}
        assert_impl::<ConfigError>();
        assert_impl::<FitError>();
        assert_impl::<VoxelError>();
        assert_impl::<RunError>();
    }
}
