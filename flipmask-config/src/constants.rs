/// Default configuration file name, looked up in the sandbox (daemon) or the
/// current directory (CLI).
pub const CONFIG_FILE_NAME: &str = ".flipmask.toml";

/// Environment variable naming an explicit configuration file.
pub const CONFIG_PATH_ENV: &str = "FLIPMASK_CONFIG_PATH";

/// Environment variable overriding `approval.token`.
pub const ACK_TOKEN_ENV: &str = "FLIPMASK_ACK_TOKEN";

pub mod defaults {
    pub const CHUNK_SIZE: usize = 8 * 1024;
    pub const SYNC_OUTPUT: bool = true;
    pub const ACK_FILE: &str = "acknowledge.txt";
    pub const ACK_TOKEN: &str = "الصلطانالله";
    pub const MARKER_SUFFIX: &str = ".approve";
    pub const TRACE_TARGETS: &str = "flipmask,flipmask_core,flipmask_config,flipmask_commons";
}
