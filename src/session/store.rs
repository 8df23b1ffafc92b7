use parking_lot::RwLock;
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

/// TokenStore
///
/// One persistence tier for the current access token.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, token: &str);
    fn erase(&self);
}

/// EphemeralStore
///
/// Holds the token for the lifetime of the process only.
#[derive(Default)]
pub struct EphemeralStore {
    token: RwLock<Option<String>>,
}

impl EphemeralStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for EphemeralStore {
    fn load(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn save(&self, token: &str) {
        *self.token.write() = Some(token.to_string());
    }

    fn erase(&self) {
        *self.token.write() = None;
    }
}

/// DurableStore
///
/// Persists the token to a file so that it survives a restart. The in-memory copy is
/// authoritative for the running process: a failed write is logged, never fatal.
pub struct DurableStore {
    path: PathBuf,
    cached: RwLock<Option<String>>,
}

impl DurableStore {
    /// Opens the store at `path`, picking up a token left there by an earlier process.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cached = match fs::read_to_string(&path) {
            Ok(contents) => Some(contents.trim().to_string()).filter(|t| !t.is_empty()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "unreadable token file ignored");
                None
            }
        };
        Self { path, cached: RwLock::new(cached) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_file(&self, token: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, token)
    }
}

impl TokenStore for DurableStore {
    fn load(&self) -> Option<String> {
        self.cached.read().clone()
    }

    fn save(&self, token: &str) {
        *self.cached.write() = Some(token.to_string());
        if let Err(err) = self.write_file(token) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to persist token");
        }
    }

    fn erase(&self) {
        *self.cached.write() = None;
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to remove token file")
            }
        }
    }
}

/// Tier
///
/// Which store holds the token, chosen by the "remember" flag at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Durable,
    Ephemeral,
}

impl Tier {
    pub fn from_remember(remember: bool) -> Self {
        if remember { Tier::Durable } else { Tier::Ephemeral }
    }
}

/// Session
///
/// The explicit holder of the current token, injected into the client instead of living
/// in ambient global state. At most one tier holds a token at any time; renewal writes
/// back into the tier that holds the token being replaced.
#[derive(Clone)]
pub struct Session {
    durable: Arc<dyn TokenStore>,
    ephemeral: Arc<dyn TokenStore>,
}

impl Session {
    pub fn new(durable: Arc<dyn TokenStore>, ephemeral: Arc<dyn TokenStore>) -> Self {
        Self { durable, ephemeral }
    }

    /// A session whose durable tier is the file at `path`.
    pub fn with_token_file(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(DurableStore::open(path)), Arc::new(EphemeralStore::new()))
    }

    fn store(&self, tier: Tier) -> &Arc<dyn TokenStore> {
        match tier {
            Tier::Durable => &self.durable,
            Tier::Ephemeral => &self.ephemeral,
        }
    }

    /// The held token, if any.
    pub fn current(&self) -> Option<String> {
        self.durable.load().or_else(|| self.ephemeral.load())
    }

    /// The tier holding the current token.
    pub fn tier(&self) -> Option<Tier> {
        if self.durable.load().is_some() {
            Some(Tier::Durable)
        } else if self.ephemeral.load().is_some() {
            Some(Tier::Ephemeral)
        } else {
            None
        }
    }

    /// Starts a session in `tier`, evicting whatever the other tier held.
    pub fn establish(&self, token: &str, tier: Tier) {
        let other = match tier {
            Tier::Durable => Tier::Ephemeral,
            Tier::Ephemeral => Tier::Durable,
        };
        self.store(other).erase();
        self.store(tier).save(token);
    }

    /// Swaps in a renewed token, in the tier that holds the current one. Returns `false`
    /// and writes nothing if the session was cleared in the meantime.
    pub fn replace(&self, token: &str) -> bool {
        match self.tier() {
            Some(tier) => {
                self.store(tier).save(token);
                true
            }
            None => false,
        }
    }

    /// Drops the token from both tiers.
    pub fn clear(&self) {
        self.durable.erase();
        self.ephemeral.erase();
    }
}

impl Default for Session {
    /// Two in-memory tiers; nothing survives the process.
    fn default() -> Self {
        Self::new(Arc::new(EphemeralStore::new()), Arc::new(EphemeralStore::new()))
    }
}
