use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use common::{Account, Error, Result};

/// JSON-file persistence for the bot's `Account`.
///
/// Single-writer: running two bots against the same file is unsupported.
#[derive(Debug, Clone)]
pub struct AccountStore {
    path: PathBuf,
}

impl AccountStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted account, creating and saving the default one on
    /// first run.
    pub fn load(&self) -> Result<Account> {
        if !self.path.exists() {
            let account = Account::default();
            info!(path = %self.path.display(), "No account file, creating a fresh one");
            self.save(&account)?;
            return Ok(account);
        }

        let raw = fs::read_to_string(&self.path)?;
        serde_json::from_str(&raw).map_err(|e| {
            Error::Account(format!("'{}' is not a valid account: {e}", self.path.display()))
        })
    }

    /// Overwrite the persisted account. Writes a sibling temp file and renames
    /// it over the target so a crash never leaves a truncated record.
    pub fn save(&self, account: &Account) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string(account)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        debug!(is_buying = account.is_buying, "Account saved");
        Ok(())
    }
}
