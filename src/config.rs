//! Tool configuration
//!
//! Both binaries read the same `config.toml`. A missing file is replaced by
//! the commented default shipped in `files/default_config.toml` and the run
//! is aborted so the operator can fill it in.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Default configuration file name, relative to the working directory
pub const CONFIG_FILE: &str = "config.toml";

/// Environment variable overriding [`CONFIG_FILE`]
pub const CONFIG_ENV: &str = "LABKIT_CONFIG";

const DEFAULT_CONFIG: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/files/default_config.toml"
));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} does not exist; a default one was created, edit it before running again")]
    CreatedDefault(PathBuf),
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write default config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// `[general]` section
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub class_code: String,
    /// Seconds a submission may run before it is killed
    pub execution_timeout: u64,
    /// Roster files older than this are regenerated (< 1 always regenerates)
    pub roster_invalidation_days: i64,
    pub use_header_files: bool,
    pub use_makefile: bool,
    pub compile_submissions: bool,
    pub execute_submissions: bool,
    pub generate_valgrind_output: bool,
    pub clear_existing_backups: bool,
    /// Written to the submission's stdin; empty means no input
    pub input_string: String,
    pub check_attendance: bool,
    pub check_lab_header: bool,
    pub compile_command: Vec<String>,
    pub build_command: Vec<String>,
    pub memcheck_command: Vec<String>,
    pub executable_name: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            class_code: String::new(),
            execution_timeout: 5,
            roster_invalidation_days: 14,
            use_header_files: true,
            use_makefile: true,
            compile_submissions: true,
            execute_submissions: true,
            generate_valgrind_output: true,
            clear_existing_backups: true,
            input_string: String::new(),
            check_attendance: false,
            check_lab_header: true,
            compile_command: vec!["gcc".into(), "-Wall".into(), "-Werror".into()],
            build_command: vec!["make".into()],
            memcheck_command: vec!["valgrind".into()],
            executable_name: "a.out".into(),
        }
    }
}

impl GeneralConfig {
    /// Input for the executed program, `None` when left blank
    pub fn stdin_input(&self) -> Option<&str> {
        if self.input_string.is_empty() {
            None
        } else {
            Some(&self.input_string)
        }
    }
}

/// `[paths]` section
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub base_path: String,
    pub submission_dir: String,
    pub test_files_dir: String,
    pub lab_files_suffix: String,
    pub roster_dir: String,
    pub lab_window_path: String,
    pub valid_dir: String,
    pub invalid_dir: String,
    pub unassigned_section: String,
    pub local_storage_dir: String,
    pub cache_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base_path: "/cluster/pixstor/class/".into(),
            submission_dir: "submissions".into(),
            test_files_dir: ".testfiles".into(),
            lab_files_suffix: "_temp".into(),
            roster_dir: "csv_rosters".into(),
            lab_window_path: "lab_windows.csv".into(),
            valid_dir: "valid".into(),
            invalid_dir: "invalid".into(),
            unassigned_section: "unassigned".into(),
            local_storage_dir: "_local_labs".into(),
            cache_dir: "cache".into(),
        }
    }
}

/// `[canvas]` section
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub api_prefix: String,
    pub api_token: String,
    pub course_id: i64,
    pub attendance_assignment_name_scheme: String,
    pub attendance_assignment_point_criterion: f64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            api_prefix: "https://umsystem.instructure.com/api/v1/".into(),
            api_token: String::new(),
            course_id: -1,
            attendance_assignment_name_scheme: String::new(),
            attendance_assignment_point_criterion: 1.0,
        }
    }
}

impl CanvasConfig {
    /// Whether enough is configured to talk to the API at all
    pub fn is_configured(&self) -> bool {
        !self.api_token.is_empty() && self.course_id > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub paths: PathsConfig,
    pub canvas: CanvasConfig,
}

impl Config {
    /// Config file location, honouring `LABKIT_CONFIG`
    pub fn default_path() -> PathBuf {
        std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(CONFIG_FILE))
    }

    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content, path)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write the commented default configuration to `path`
    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        fs::write(path, DEFAULT_CONFIG).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Created default config at {}", path.display());
        Ok(())
    }

    /// Load `path`, or create the default there and report it as an error
    pub fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            Self::write_default(path)?;
            return Err(ConfigError::CreatedDefault(path.to_path_buf()));
        }
        Self::load(path)
    }

    /// Resolve the directory roots for the configured class code
    pub fn class_paths(&self) -> ClassPaths {
        self.paths_for_class(&self.general.class_code)
    }

    /// Resolve the directory roots for an explicit class code
    pub fn paths_for_class(&self, class_code: &str) -> ClassPaths {
        let paths = &self.paths;
        let class_root = Path::new(&paths.base_path).join(class_code);
        let local_root = PathBuf::from(format!("{}{}", class_code, paths.local_storage_dir));
        ClassPaths {
            submission_root: class_root.join(&paths.submission_dir),
            test_files_root: class_root.join(&paths.test_files_dir),
            roster_root: class_root.join(&paths.roster_dir),
            window_table: class_root.join(&paths.lab_window_path),
            cache_root: local_root.join(&paths.cache_dir),
            lab_files_suffix: paths.lab_files_suffix.clone(),
            local_root,
            class_root,
        }
    }
}

/// Absolute directory roots for one class
#[derive(Debug, Clone, PartialEq)]
pub struct ClassPaths {
    pub class_root: PathBuf,
    pub submission_root: PathBuf,
    pub test_files_root: PathBuf,
    pub roster_root: PathBuf,
    pub window_table: PathBuf,
    pub local_root: PathBuf,
    pub cache_root: PathBuf,
    lab_files_suffix: String,
}

impl ClassPaths {
    /// Shared support files for `lab`
    pub fn lab_files_dir(&self, lab: &str) -> PathBuf {
        self.test_files_root
            .join(format!("{}{}", lab, self.lab_files_suffix))
    }

    /// `{submission_root}/{lab}/{section}`
    pub fn section_dir(&self, lab: &str, section: &str) -> PathBuf {
        self.submission_root.join(lab).join(section)
    }

    pub fn roster_file(&self, section: &str) -> PathBuf {
        self.roster_root.join(format!("{}.csv", section))
    }

    /// Anchor the local storage tree (and its cache) under `base`
    pub fn with_local_base(mut self, base: &Path) -> Self {
        self.local_root = base.join(&self.local_root);
        self.cache_root = base.join(&self.cache_root);
        self
    }

    /// Local grading tree for `lab`
    pub fn backup_dir(&self, lab: &str) -> PathBuf {
        self.local_root.join(format!("{}_backup", lab))
    }
}
