//! Configuration for flat projections.

/// Default maximum nesting depth below the root collection.
const DEFAULT_MAX_DEPTH: usize = 64;

/// Configuration for building a flat projection.
///
/// The limits turn runaway hierarchies into a recoverable
/// [`FlattenError`](crate::FlattenError) instead of unbounded recursion or
/// memory growth.
///
/// With the `serde` feature enabled the configuration can be loaded from
/// TOML; missing keys fall back to the defaults:
///
/// ```ignore
/// let config = FlattenConfig::from_toml_str("max_depth = 8\nmax_items = 10000")?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct FlattenConfig {
    /// Deepest sub-collection level that is expanded; the root is level 0.
    pub max_depth: usize,
    /// Largest number of leaves the flat projection may hold. `None` is
    /// unlimited.
    pub max_items: Option<usize>,
    /// Insert the descendants revealed by a discovery event where the
    /// replaced leaf used to be, instead of appending them.
    pub insert_in_place: bool,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_items: None,
            insert_in_place: true,
        }
    }
}

impl FlattenConfig {
    /// Returns a builder starting from the defaults.
    pub fn builder() -> FlattenConfigBuilder {
        FlattenConfigBuilder::default()
    }

    /// Parses a configuration from a TOML document.
    #[cfg(feature = "serde")]
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }
}

/// Builder for [`FlattenConfig`].
#[derive(Debug, Default)]
pub struct FlattenConfigBuilder {
    config: FlattenConfig,
}

impl FlattenConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum expansion depth.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    /// Cap the number of leaves in the flat projection.
    pub fn max_items(mut self, limit: usize) -> Self {
        self.config.max_items = Some(limit);
        self
    }

    /// Remove the leaf cap.
    pub fn unlimited_items(mut self) -> Self {
        self.config.max_items = None;
        self
    }

    /// Choose between in-place and appended discovery insertion.
    pub fn insert_in_place(mut self, in_place: bool) -> Self {
        self.config.insert_in_place = in_place;
        self
    }

    /// Finish building.
    pub fn build(self) -> FlattenConfig {
        self.config
    }
}
