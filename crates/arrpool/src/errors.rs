//! Error handling and exit codes.

use arrpool_core::PoolError;

/// Process exit codes.
pub mod exit_codes {
    /// Successful execution.
    pub const SUCCESS: u8 = 0;
    /// Generic error.
    pub const ERROR_GENERIC: u8 = 1;
    /// A value escaped its scope while aliasing pooled memory.
    pub const ERROR_ESCAPE: u8 = 3;
    /// Invalid configuration.
    pub const ERROR_CONFIG: u8 = 4;
    /// The requested backend is not registered.
    pub const ERROR_BACKEND: u8 = 5;
}

/// Map a pool error to the appropriate exit code.
pub fn handle_error(err: &PoolError) -> u8 {
    match err {
        PoolError::DimensionOverflow { .. }
        | PoolError::InactiveScope { .. }
        | PoolError::RegistryInUse => exit_codes::ERROR_GENERIC,
        PoolError::EscapeViolation { .. } => exit_codes::ERROR_ESCAPE,
        PoolError::InvalidCacheWays(_) => exit_codes::ERROR_CONFIG,
        PoolError::BackendUnavailable(_) => exit_codes::ERROR_BACKEND,
    }
}

/// Exit code for any error reaching `main`.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<PoolError>()
        .map_or(exit_codes::ERROR_GENERIC, handle_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(handle_error(&PoolError::InvalidCacheWays(32)), 4);
        assert_eq!(handle_error(&PoolError::BackendUnavailable("gpu".into())), 5);
        assert_eq!(
            handle_error(&PoolError::EscapeViolation {
                type_name: "f64",
                slot: 0,
                depth: 2,
            }),
            3
        );
        assert_eq!(handle_error(&PoolError::RegistryInUse), 1);
    }

    #[test]
    fn anyhow_errors_keep_their_code() {
        let err = anyhow::Error::new(PoolError::InvalidCacheWays(0));
        assert_eq!(exit_code(&err), exit_codes::ERROR_CONFIG);
        assert_eq!(exit_code(&anyhow::anyhow!("io failure")), exit_codes::ERROR_GENERIC);
    }
}
