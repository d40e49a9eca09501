/// Error code registry for Stagehand
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 3000-3999: Checkpoint store errors
/// - 4000-4999: External command errors
/// - 5000-5999: Stage errors
/// - 9000-9999: Other errors
#[allow(dead_code)]
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_INVALID_TOML: u16 = 1002;
    pub const CONFIG_INVALID_VALUE: u16 = 1005;

    // Checkpoint store errors (3000-3999)
    pub const STORAGE_GENERIC: u16 = 3000;
    pub const STORAGE_IO_ERROR: u16 = 3001;
    pub const STORAGE_PERMISSION_DENIED: u16 = 3002;
    pub const STORAGE_CORRUPTED: u16 = 3006;
    pub const STORAGE_LOCK_FAILED: u16 = 3007;
    pub const STORAGE_SERIALIZATION_ERROR: u16 = 3011;
    pub const STORAGE_INVALID_KEY: u16 = 3013;

    // External command errors (4000-4999)
    pub const EXEC_GENERIC: u16 = 4000;
    pub const EXEC_COMMAND_NOT_FOUND: u16 = 4001;
    pub const EXEC_TIMEOUT: u16 = 4002;
    pub const EXEC_SUBPROCESS_FAILED: u16 = 4003;
    pub const EXEC_TRANSIENT: u16 = 4011;
    pub const EXEC_STALE_CREDENTIAL: u16 = 4012;
    pub const EXEC_AUTH_FAILED: u16 = 4013;
    pub const EXEC_ALREADY_EXISTS: u16 = 4014;
    pub const EXEC_ACCESS_DENIED: u16 = 4015;
    pub const EXEC_UNPARSEABLE: u16 = 4016;

    // Stage errors (5000-5999)
    pub const STAGE_GENERIC: u16 = 5000;
    pub const STAGE_FAILED: u16 = 5003;
    pub const STAGE_RETRIES_EXHAUSTED: u16 = 5004;
    pub const STAGE_WAIT_EXHAUSTED: u16 = 5005;

    // Other errors (9000-9999)
    pub const OTHER_GENERIC: u16 = 9000;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        1000 => "Generic configuration error",
        1001 => "Configuration file not found",
        1002 => "Invalid TOML syntax in configuration",
        1005 => "Invalid value in configuration",

        3000 => "Generic checkpoint store error",
        3001 => "Checkpoint store I/O error",
        3002 => "Checkpoint store permission denied",
        3006 => "Status document is corrupted",
        3007 => "Failed to acquire status lock",
        3011 => "Status document serialization error",
        3013 => "Invalid status field key",

        4000 => "Generic external command error",
        4001 => "Command not found",
        4002 => "Infrastructure timeout",
        4003 => "Subprocess failed",
        4011 => "Transient external failure",
        4012 => "Stale credentials",
        4013 => "Re-authentication failed",
        4014 => "Resource already exists",
        4015 => "Access denied",
        4016 => "Unparseable command output",

        5000 => "Generic stage error",
        5003 => "Stage failed",
        5004 => "Stage retries exhausted",
        5005 => "Stage wait budget exhausted",

        9000 => "Generic error",

        _ => "Unknown error code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_known_codes() {
        assert_eq!(
            describe_error_code(ErrorCode::STORAGE_IO_ERROR),
            "Checkpoint store I/O error"
        );
        assert_eq!(
            describe_error_code(ErrorCode::STAGE_RETRIES_EXHAUSTED),
            "Stage retries exhausted"
        );
    }

    #[test]
    fn test_describe_unknown_code() {
        assert_eq!(describe_error_code(4242), "Unknown error code");
    }
}
