//! Tree entry modes
//!
//! Every blob placed into a tree carries one of three modes, written as the
//! octal strings the remote expects: `100644`, `100755` or `120000`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Eq, Ord, Default, PartialEq, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FileMode {
    #[default]
    Regular,
    Executable,
    Symlink,
}

impl FileMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileMode::Regular => "100644",
            FileMode::Executable => "100755",
            FileMode::Symlink => "120000",
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            FileMode::Regular => 0o100644,
            FileMode::Executable => 0o100755,
            FileMode::Symlink => 0o120000,
        }
    }

    /// Pick the mode for a walked file system entry
    pub fn detect(path: &std::path::Path, file_type: std::fs::FileType) -> Self {
        use is_executable::IsExecutable;

        if file_type.is_symlink() {
            FileMode::Symlink
        } else if path.is_executable() {
            FileMode::Executable
        } else {
            FileMode::Regular
        }
    }
}

impl TryFrom<&str> for FileMode {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> anyhow::Result<Self> {
        match value {
            "100644" => Ok(FileMode::Regular),
            "100755" => Ok(FileMode::Executable),
            "120000" => Ok(FileMode::Symlink),
            _ => Err(anyhow::anyhow!("Invalid entry mode: {value}")),
        }
    }
}

impl TryFrom<String> for FileMode {
    type Error = anyhow::Error;

    fn try_from(value: String) -> anyhow::Result<Self> {
        FileMode::try_from(value.as_str())
    }
}

impl From<FileMode> for String {
    fn from(mode: FileMode) -> Self {
        mode.as_str().to_string()
    }
}

impl std::fmt::Display for FileMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
