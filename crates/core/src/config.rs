use std::path::{Path, PathBuf};

use ini::{Ini, Properties};

use crate::error::{ConfigurationError, Result};

pub const DEFAULT_PROGRAM_NAME: &str = "tor";
pub const DEFAULT_SOCKS_PORT: u16 = 34781;
pub const DEFAULT_CONTROL_PORT: &str = "auto";
pub const DEFAULT_LOG: &str = "err file /dev/null";
pub const CONTROL_PORT_FILE_NAME: &str = "tor-control.port";
pub const INI_SECTION: &str = "tor";

/// Options rendered into the daemon's command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorLaunchOptions {
    pub program_name: String,
    pub disable_signal_handlers: bool,
    pub socks_port: u16,
    pub no_exec: bool,
    pub control_port: String,
    pub control_port_file: PathBuf,
    pub cookie_authentication: bool,
    pub data_directory: PathBuf,
    pub log: String,
    /// Appended verbatim after the generated flags.
    pub extra_arguments: Vec<String>,
}

impl TorLaunchOptions {
    pub fn new(data_directory: PathBuf, control_port_file: PathBuf) -> Self {
        Self {
            program_name: DEFAULT_PROGRAM_NAME.to_string(),
            disable_signal_handlers: true,
            socks_port: DEFAULT_SOCKS_PORT,
            no_exec: true,
            control_port: DEFAULT_CONTROL_PORT.to_string(),
            control_port_file,
            cookie_authentication: true,
            data_directory,
            log: DEFAULT_LOG.to_string(),
            extra_arguments: Vec::new(),
        }
    }

    /// Defaults rooted in the user's cache and temporary directories.
    pub fn from_platform_directories() -> Result<Self> {
        let cache_dir = dirs::cache_dir().ok_or(ConfigurationError::CacheDirectoryNotAvailable)?;
        Ok(Self::new(
            cache_dir.join("torthread").join("tor_data"),
            std::env::temp_dir().join(CONTROL_PORT_FILE_NAME),
        ))
    }

    /// Platform defaults overridden by the `[tor]` section of an INI file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigurationError::FileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        let ini = Ini::load_from_file(path).map_err(|error| ConfigurationError::InvalidFile {
            reason: error.to_string(),
        })?;

        let mut options = Self::from_platform_directories()?;
        options.apply_ini(&ini)?;
        Ok(options)
    }

    pub fn apply_ini(&mut self, ini: &Ini) -> Result<()> {
        let Some(section) = ini.section(Some(INI_SECTION)) else {
            return Ok(());
        };

        if let Some(value) = section.get("program_name") {
            self.program_name = value.to_string();
        }
        if let Some(value) = parse_bool(section, "disable_signal_handlers")? {
            self.disable_signal_handlers = value;
        }
        if let Some(value) = section.get("socks_port") {
            self.socks_port = value
                .trim()
                .parse()
                .map_err(|error: std::num::ParseIntError| ConfigurationError::InvalidValue {
                    field: "socks_port".to_string(),
                    reason: error.to_string(),
                })?;
        }
        if let Some(value) = parse_bool(section, "no_exec")? {
            self.no_exec = value;
        }
        if let Some(value) = section.get("control_port") {
            self.control_port = value.to_string();
        }
        if let Some(value) = section.get("control_port_file") {
            self.control_port_file = PathBuf::from(value);
        }
        if let Some(value) = parse_bool(section, "cookie_authentication")? {
            self.cookie_authentication = value;
        }
        if let Some(value) = section.get("data_directory") {
            self.data_directory = PathBuf::from(value);
        }
        if let Some(value) = section.get("log") {
            self.log = value.to_string();
        }
        Ok(())
    }

    pub fn to_arguments(&self) -> Vec<String> {
        let mut arguments = vec![self.program_name.clone()];
        let mut push = |flag: &str, value: String| {
            arguments.push(flag.to_string());
            arguments.push(value);
        };

        if self.disable_signal_handlers {
            push("__DisableSignalHandlers", "1".to_string());
        }
        push("SocksPort", self.socks_port.to_string());
        if self.no_exec {
            push("NoExec", "1".to_string());
        }
        push("ControlPort", self.control_port.clone());
        push(
            "ControlPortWriteToFile",
            self.control_port_file.to_string_lossy().into_owned(),
        );
        if self.cookie_authentication {
            push("CookieAuthentication", "1".to_string());
        }
        push(
            "DataDirectory",
            self.data_directory.to_string_lossy().into_owned(),
        );
        push("Log", self.log.clone());

        arguments.extend(self.extra_arguments.iter().cloned());
        arguments
    }
}

fn parse_bool(section: &Properties, field: &str) -> Result<Option<bool>> {
    let Some(value) = section.get(field) else {
        return Ok(None);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        other => Err(ConfigurationError::InvalidValue {
            field: field.to_string(),
            reason: format!("expected a boolean, got {other:?}"),
        }
        .into()),
    }
}
