/// Default configuration constants.

/// Config file names searched in the working directory, in order.
pub const CONFIG_FILE_CANDIDATES: [&str; 4] = ["avp.yaml", "avp.yml", "avp.json", "avp.toml"];

/// Directory under `$HOME` holding the per-user config file.
pub const HOME_CONFIG_DIR: &str = ".avp";

/// Per-user config file name.
pub const HOME_CONFIG_FILE: &str = "config.yaml";
