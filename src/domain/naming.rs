use async_trait::async_trait;
use rand::Rng;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::error::AppError;

pub const MAX_MAJOR: u32 = 10;
pub const MAX_MINOR: u32 = 20;
pub const MAX_PATCH: u32 = 100;

pub const CAPABILITY_CATEGORIES: [&str; 2] = ["shampoo", "soap"];
pub const CAPABILITY_SUFFIX_MIN: u32 = 1000;
pub const CAPABILITY_SUFFIX_MAX: u32 = 9999;

/// `major.minor.patch` with no prerelease or build suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemanticVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SemanticVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl std::fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemanticVersion {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            AppError::ValidationError(format!(
                "Invalid version format '{}'. Must be in format: major.minor.patch",
                s
            ))
        };
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(invalid());
        }
        let mut numbers = [0u32; 3];
        for (slot, part) in numbers.iter_mut().zip(parts) {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            *slot = part.parse().map_err(|_| invalid())?;
        }
        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }
}

/// Source of collision-avoiding names for resources created by one run
pub trait NameGenerator: Send + Sync {
    fn semantic_version(&self) -> SemanticVersion;

    /// Category and numeric suffix for a freshly generated capability
    fn capability_parts(&self) -> (String, u32);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomNameGenerator;

impl NameGenerator for RandomNameGenerator {
    fn semantic_version(&self) -> SemanticVersion {
        let mut rng = rand::thread_rng();
        SemanticVersion::new(
            rng.gen_range(0..=MAX_MAJOR),
            rng.gen_range(0..=MAX_MINOR),
            rng.gen_range(0..=MAX_PATCH),
        )
    }

    fn capability_parts(&self) -> (String, u32) {
        let mut rng = rand::thread_rng();
        let category = CAPABILITY_CATEGORIES[rng.gen_range(0..CAPABILITY_CATEGORIES.len())];
        let suffix = rng.gen_range(CAPABILITY_SUFFIX_MIN..=CAPABILITY_SUFFIX_MAX);
        (category.to_string(), suffix)
    }
}

/// Scripted generator; cycles through the configured values
#[derive(Debug, Default)]
pub struct FixedNameGenerator {
    versions: Vec<SemanticVersion>,
    capabilities: Vec<(String, u32)>,
    version_cursor: Mutex<usize>,
    capability_cursor: Mutex<usize>,
}

impl FixedNameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_versions(mut self, versions: impl IntoIterator<Item = SemanticVersion>) -> Self {
        self.versions = versions.into_iter().collect();
        self
    }

    pub fn with_capabilities<S: Into<String>>(
        mut self,
        capabilities: impl IntoIterator<Item = (S, u32)>,
    ) -> Self {
        self.capabilities = capabilities
            .into_iter()
            .map(|(category, suffix)| (category.into(), suffix))
            .collect();
        self
    }

    fn next_index(cursor: &Mutex<usize>, len: usize) -> usize {
        let mut guard = cursor.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let index = *guard % len;
        *guard += 1;
        index
    }
}

impl NameGenerator for FixedNameGenerator {
    fn semantic_version(&self) -> SemanticVersion {
        if self.versions.is_empty() {
            return SemanticVersion::new(0, 0, 0);
        }
        self.versions[Self::next_index(&self.version_cursor, self.versions.len())]
    }

    fn capability_parts(&self) -> (String, u32) {
        if self.capabilities.is_empty() {
            return (CAPABILITY_CATEGORIES[1].to_string(), CAPABILITY_SUFFIX_MIN);
        }
        self.capabilities[Self::next_index(&self.capability_cursor, self.capabilities.len())]
            .clone()
    }
}

/// Counter used to make resource names distinguishable between runs.
///
/// Not authoritative: losing it only risks a name collision, which surfaces
/// as an ordinary create failure.
#[async_trait]
pub trait VersionSource: Send + Sync {
    async fn next_version(&self) -> u64;
}

/// Counter persisted in a small text file (`version.txt`)
#[derive(Debug)]
pub struct FileVersionSource {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl FileVersionSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl VersionSource for FileVersionSource {
    async fn next_version(&self) -> u64 {
        let _guard = self.lock.lock().await;

        let current = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents.trim().parse::<u64>().unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "Version file is corrupt, restarting at 0");
                0
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read version file");
                0
            }
        };

        let next = current.checked_add(1).unwrap_or_else(|| {
            warn!(path = %self.path.display(), version = current, "Version counter exhausted, restarting at 0");
            1
        });
        if let Err(e) = tokio::fs::write(&self.path, next.to_string()).await {
            warn!(path = %self.path.display(), error = %e, "Failed to write version file");
        }

        debug!(path = %self.path.display(), version = next, "Issued resource version");
        next
    }
}

/// In-memory counter for tests and dry runs
#[derive(Debug)]
pub struct SequenceVersionSource {
    next: AtomicU64,
}

impl SequenceVersionSource {
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SequenceVersionSource {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

#[async_trait]
impl VersionSource for SequenceVersionSource {
    async fn next_version(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}
