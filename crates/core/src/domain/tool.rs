// Backup Tool Command Lines
//
// backy2 is driven purely through its CLI; this builds the shell lines.

/// Default backy2 executable name (resolved through PATH)
pub const DEFAULT_BACKY2_BIN: &str = "backy2";

/// Command line builder for the wrapped backy2 binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupTool {
    binary: String,
}

impl Default for BackupTool {
    fn default() -> Self {
        Self::new(DEFAULT_BACKY2_BIN)
    }
}

impl BackupTool {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Human-readable listing, used to check the repository is reachable
    pub fn probe_command(&self) -> String {
        format!("{} ls", quote(&self.binary))
    }

    pub fn init_command(&self) -> String {
        format!("{} initdb", quote(&self.binary))
    }

    /// Machine-readable (`|`-delimited) listing
    pub fn list_command(&self) -> String {
        format!("{} -m ls", quote(&self.binary))
    }

    /// The source path doubles as the version name
    pub fn backup_command(&self, source_path: &str) -> String {
        let source = quote(source_path);
        format!("{} backup {} {}", quote(&self.binary), source, source)
    }

    pub fn remove_command(&self, tool_id: &str) -> String {
        format!("{} rm {}", quote(&self.binary), quote(tool_id))
    }
}

/// Single-quote a word for `sh -c`, leaving plain words untouched
fn quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:@=+,".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
