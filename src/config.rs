//! Configuration for the block cache.
//!
//! Configuration happens in two steps:
//!
//! 1. [`CacheProperties`] collects raw parameter values from a key-value
//!    source (a string map, a JSON document, or builder setters). Missing
//!    keys take their defaults. Nothing is validated yet.
//! 2. [`CacheConfig::new`] validates the properties against a capacity and
//!    produces the immutable configuration the cache runs with. This is the
//!    only validation boundary: a cache cannot be built from anything else.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::Priority;
use crate::error::{Error, Result};

/// Backing table load factor.
pub const DEFAULT_LOAD_FACTOR: f32 = 0.75;
/// Backing table concurrency level (number of shards).
pub const DEFAULT_CONCURRENCY_LEVEL: u32 = 16;

/// Eviction stops once occupancy falls to this fraction of capacity.
pub const DEFAULT_MIN_FACTOR: f32 = 0.75;
/// Eviction starts once occupancy reaches this fraction of capacity.
pub const DEFAULT_ACCEPTABLE_FACTOR: f32 = 0.85;

/// Share of capacity targeted for blocks accessed once.
pub const DEFAULT_SINGLE_FACTOR: f32 = 0.25;
/// Share of capacity targeted for blocks accessed more than once.
pub const DEFAULT_MULTI_FACTOR: f32 = 0.50;
/// Share of capacity targeted for pinned blocks.
pub const DEFAULT_MEMORY_FACTOR: f32 = 0.25;

/// Estimated average block size, used to presize the backing table.
pub const DEFAULT_BLOCK_SIZE: u64 = 1024 * 1024;

/// Eviction runs on a dedicated thread by default.
pub const DEFAULT_USE_EVICTION_THREAD: bool = true;

/// Allowed absolute error when checking that the priority factors sum to 1.0.
pub const FACTOR_SUM_TOLERANCE: f32 = 1e-5;

/// Property name for the acceptable (eviction trigger) factor.
pub const ACCEPTABLE_FACTOR_PROPERTY: &str = "acceptable.factor";
/// Property name for the minimum (eviction target) factor.
pub const MIN_FACTOR_PROPERTY: &str = "min.factor";
/// Property name for the single-access priority factor.
pub const SINGLE_FACTOR_PROPERTY: &str = "single.factor";
/// Property name for the multi-access priority factor.
pub const MULTI_FACTOR_PROPERTY: &str = "multi.factor";
/// Property name for the in-memory priority factor.
pub const MEMORY_FACTOR_PROPERTY: &str = "memory.factor";
/// Property name for the backing table load factor.
pub const MAP_LOAD_PROPERTY: &str = "map.load";
/// Property name for the backing table concurrency level.
pub const MAP_CONCURRENCY_PROPERTY: &str = "map.concurrency";
/// Property name selecting background or inline eviction.
pub const EVICTION_THREAD_PROPERTY: &str = "eviction.thread";
/// Property name for the estimated block size.
pub const BLOCK_SIZE_PROPERTY: &str = "block.size";

const KNOWN_PROPERTIES: [&str; 9] = [
    ACCEPTABLE_FACTOR_PROPERTY,
    MIN_FACTOR_PROPERTY,
    SINGLE_FACTOR_PROPERTY,
    MULTI_FACTOR_PROPERTY,
    MEMORY_FACTOR_PROPERTY,
    MAP_LOAD_PROPERTY,
    MAP_CONCURRENCY_PROPERTY,
    EVICTION_THREAD_PROPERTY,
    BLOCK_SIZE_PROPERTY,
];

/// Raw, unvalidated cache parameters.
///
/// Serializes with the external property names (`acceptable.factor`,
/// `min.factor`, ...), so any serde source keyed by those names can fill it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheProperties {
    /// Fraction of capacity at which eviction is triggered.
    /// Default: 0.85
    #[serde(rename = "acceptable.factor")]
    pub acceptable_factor: f32,

    /// Fraction of capacity an eviction pass brings occupancy down to.
    /// Default: 0.75
    #[serde(rename = "min.factor")]
    pub min_factor: f32,

    /// Target share of capacity for single-access blocks.
    /// Default: 0.25
    #[serde(rename = "single.factor")]
    pub single_factor: f32,

    /// Target share of capacity for multi-access blocks.
    /// Default: 0.50
    #[serde(rename = "multi.factor")]
    pub multi_factor: f32,

    /// Target share of capacity for pinned blocks.
    /// Default: 0.25
    #[serde(rename = "memory.factor")]
    pub memory_factor: f32,

    /// Load factor of the backing table.
    /// Default: 0.75
    #[serde(rename = "map.load")]
    pub map_load_factor: f32,

    /// Number of independently locked shards in the backing table.
    /// Default: 16
    #[serde(rename = "map.concurrency")]
    pub map_concurrency_level: u32,

    /// Run eviction on a background thread instead of on the admitting thread.
    /// Default: true
    #[serde(rename = "eviction.thread")]
    pub use_eviction_thread: bool,

    /// Estimated average block size in bytes.
    /// Default: 1MB
    #[serde(rename = "block.size")]
    pub block_size: u64,
}

impl Default for CacheProperties {
    fn default() -> Self {
        Self {
            acceptable_factor: DEFAULT_ACCEPTABLE_FACTOR,
            min_factor: DEFAULT_MIN_FACTOR,
            single_factor: DEFAULT_SINGLE_FACTOR,
            multi_factor: DEFAULT_MULTI_FACTOR,
            memory_factor: DEFAULT_MEMORY_FACTOR,
            map_load_factor: DEFAULT_LOAD_FACTOR,
            map_concurrency_level: DEFAULT_CONCURRENCY_LEVEL,
            use_eviction_thread: DEFAULT_USE_EVICTION_THREAD,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl CacheProperties {
    /// Creates properties with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads properties from a string key-value source.
    ///
    /// Missing keys take their defaults and unknown keys are ignored. A value
    /// that does not parse is a configuration error.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let mut props = Self::default();

        for (key, raw) in map {
            let raw = raw.trim();
            match key.as_str() {
                ACCEPTABLE_FACTOR_PROPERTY => props.acceptable_factor = parse_value(key, raw)?,
                MIN_FACTOR_PROPERTY => props.min_factor = parse_value(key, raw)?,
                SINGLE_FACTOR_PROPERTY => props.single_factor = parse_value(key, raw)?,
                MULTI_FACTOR_PROPERTY => props.multi_factor = parse_value(key, raw)?,
                MEMORY_FACTOR_PROPERTY => props.memory_factor = parse_value(key, raw)?,
                MAP_LOAD_PROPERTY => props.map_load_factor = parse_value(key, raw)?,
                MAP_CONCURRENCY_PROPERTY => props.map_concurrency_level = parse_value(key, raw)?,
                EVICTION_THREAD_PROPERTY => props.use_eviction_thread = parse_bool(key, raw)?,
                BLOCK_SIZE_PROPERTY => props.block_size = parse_value(key, raw)?,
                _ => log::debug!("Ignoring unknown cache property: {}", key),
            }
        }

        Ok(props)
    }

    /// Reads properties from a JSON object keyed by property name.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the acceptable (eviction trigger) factor.
    pub fn acceptable_factor(mut self, value: f32) -> Self {
        self.acceptable_factor = value;
        self
    }

    /// Sets the minimum (eviction target) factor.
    pub fn min_factor(mut self, value: f32) -> Self {
        self.min_factor = value;
        self
    }

    /// Sets the single, multi and memory priority factors.
    pub fn priority_factors(mut self, single: f32, multi: f32, memory: f32) -> Self {
        self.single_factor = single;
        self.multi_factor = multi;
        self.memory_factor = memory;
        self
    }

    /// Sets the backing table load factor.
    pub fn map_load_factor(mut self, value: f32) -> Self {
        self.map_load_factor = value;
        self
    }

    /// Sets the backing table concurrency level.
    pub fn map_concurrency_level(mut self, value: u32) -> Self {
        self.map_concurrency_level = value;
        self
    }

    /// Enables or disables the background eviction thread.
    pub fn use_eviction_thread(mut self, value: bool) -> Self {
        self.use_eviction_thread = value;
        self
    }

    /// Sets the estimated block size.
    pub fn block_size(mut self, value: u64) -> Self {
        self.block_size = value;
        self
    }

    /// Returns the property names this type understands.
    pub fn known_properties() -> &'static [&'static str] {
        &KNOWN_PROPERTIES
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| Error::configuration(format!("invalid value for {}: '{}'", key, raw)))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    if raw.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(Error::configuration(format!("invalid value for {}: '{}'", key, raw)))
    }
}

/// Validated, immutable block cache configuration.
///
/// Construct with [`CacheConfig::new`]; there is no way to mutate a
/// configuration afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    capacity_bytes: u64,
    acceptable_factor: f32,
    min_factor: f32,
    single_factor: f32,
    multi_factor: f32,
    memory_factor: f32,
    map_load_factor: f32,
    map_concurrency_level: u32,
    use_eviction_thread: bool,
    block_size: u64,
    acceptable_bytes: u64,
    min_bytes: u64,
    target_bytes: [u64; 3],
}

impl CacheConfig {
    /// Validates `props` against `capacity_bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if:
    /// - `capacity_bytes` is zero
    /// - any factor is not finite, or not strictly between 0 and 1
    /// - `min.factor >= acceptable.factor`
    /// - single, multi and memory factors do not sum to 1.0
    /// - `map.load`, `map.concurrency` or `block.size` is not positive
    pub fn new(capacity_bytes: u64, props: CacheProperties) -> Result<Self> {
        if capacity_bytes == 0 {
            return Err(Error::configuration("capacity must be > 0"));
        }

        check_fraction(ACCEPTABLE_FACTOR_PROPERTY, props.acceptable_factor)?;
        check_fraction(MIN_FACTOR_PROPERTY, props.min_factor)?;
        check_fraction(SINGLE_FACTOR_PROPERTY, props.single_factor)?;
        check_fraction(MULTI_FACTOR_PROPERTY, props.multi_factor)?;
        check_fraction(MEMORY_FACTOR_PROPERTY, props.memory_factor)?;

        let sum = props.single_factor + props.multi_factor + props.memory_factor;
        if (sum - 1.0).abs() > FACTOR_SUM_TOLERANCE {
            return Err(Error::configuration(format!(
                "single, multi, and memory factors should total 1.0, got {}",
                sum
            )));
        }
        if props.min_factor >= props.acceptable_factor {
            return Err(Error::configuration("minFactor must be smaller than acceptableFactor"));
        }
        if !props.map_load_factor.is_finite() || props.map_load_factor <= 0.0 {
            return Err(Error::configuration(format!(
                "{} must be > 0, got {}",
                MAP_LOAD_PROPERTY, props.map_load_factor
            )));
        }
        if props.map_concurrency_level == 0 {
            return Err(Error::configuration(format!("{} must be > 0", MAP_CONCURRENCY_PROPERTY)));
        }
        if props.block_size == 0 {
            return Err(Error::configuration(format!("{} must be > 0", BLOCK_SIZE_PROPERTY)));
        }

        let scaled = |factor: f32| scale(capacity_bytes, factor);

        Ok(Self {
            capacity_bytes,
            acceptable_bytes: scaled(props.acceptable_factor).ceil() as u64,
            min_bytes: scaled(props.min_factor).floor() as u64,
            target_bytes: [
                scaled(props.single_factor).round() as u64,
                scaled(props.multi_factor).round() as u64,
                scaled(props.memory_factor).round() as u64,
            ],
            acceptable_factor: props.acceptable_factor,
            min_factor: props.min_factor,
            single_factor: props.single_factor,
            multi_factor: props.multi_factor,
            memory_factor: props.memory_factor,
            map_load_factor: props.map_load_factor,
            map_concurrency_level: props.map_concurrency_level,
            use_eviction_thread: props.use_eviction_thread,
            block_size: props.block_size,
        })
    }

    /// Creates a configuration with default properties.
    pub fn with_defaults(capacity_bytes: u64) -> Result<Self> {
        Self::new(capacity_bytes, CacheProperties::default())
    }

    /// Hard ceiling on the sum of cached block sizes.
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    /// Fraction of capacity at which eviction is triggered.
    pub fn acceptable_factor(&self) -> f32 {
        self.acceptable_factor
    }

    /// Fraction of capacity an eviction pass brings occupancy down to.
    pub fn min_factor(&self) -> f32 {
        self.min_factor
    }

    /// Target share of capacity for single-access blocks.
    pub fn single_factor(&self) -> f32 {
        self.single_factor
    }

    /// Target share of capacity for multi-access blocks.
    pub fn multi_factor(&self) -> f32 {
        self.multi_factor
    }

    /// Target share of capacity for pinned blocks.
    pub fn memory_factor(&self) -> f32 {
        self.memory_factor
    }

    /// Load factor of the backing table.
    pub fn map_load_factor(&self) -> f32 {
        self.map_load_factor
    }

    /// Number of shards in the backing table.
    pub fn map_concurrency_level(&self) -> u32 {
        self.map_concurrency_level
    }

    /// Whether eviction runs on a background thread.
    pub fn use_eviction_thread(&self) -> bool {
        self.use_eviction_thread
    }

    /// Estimated average block size in bytes.
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Target share of capacity for a priority class.
    pub fn factor(&self, priority: Priority) -> f32 {
        match priority {
            Priority::Single => self.single_factor,
            Priority::Multi => self.multi_factor,
            Priority::Memory => self.memory_factor,
        }
    }

    /// Bytes a priority class may occupy before it counts as overflowing.
    ///
    /// `factor * capacity`, rounded to the nearest byte.
    pub fn target_bytes(&self, priority: Priority) -> u64 {
        self.target_bytes[priority.index()]
    }

    /// Occupancy at or above which an eviction pass is triggered.
    ///
    /// `acceptable.factor * capacity`, rounded up.
    pub fn acceptable_bytes(&self) -> u64 {
        self.acceptable_bytes
    }

    /// Occupancy an eviction pass brings the cache down to.
    ///
    /// `min.factor * capacity`, rounded down, so a pass that reaches it is
    /// never above the exact watermark.
    pub fn min_bytes(&self) -> u64 {
        self.min_bytes
    }

    /// Number of entries the backing table is presized for.
    ///
    /// Saturates instead of overflowing; the table caps it further.
    pub fn initial_table_capacity(&self) -> usize {
        (1.2 * self.capacity_bytes as f64 / self.block_size as f64).ceil() as usize
    }
}

/// `capacity * factor`, with the factor taken at the decimal value it was
/// written as (0.85 of 1000 is 850, not 850.0000238).
fn scale(capacity_bytes: u64, factor: f32) -> f64 {
    let factor: f64 = factor.to_string().parse().unwrap_or_else(|_| f64::from(factor));
    let exact = capacity_bytes as f64 * factor;

    // absorb the last-bit error of the multiplication
    let nearest = exact.round();
    if (exact - nearest).abs() <= nearest * 4.0 * f64::EPSILON {
        nearest
    } else {
        exact
    }
}

fn check_fraction(name: &str, value: f32) -> Result<()> {
    if !value.is_finite() || value <= 0.0 || value >= 1.0 {
        return Err(Error::configuration(format!(
            "{} must be between 0 and 1 (exclusive), got {}",
            name, value
        )));
    }
    Ok(())
}

impl fmt::Display for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "capacity: {}, blockSize: {}, acceptableFactor: {}, minFactor: {}, singleFactor: {}, \
             multiFactor: {}, memoryFactor: {}, mapLoadFactor: {}, mapConcurrencyLevel: {}, \
             useEvictionThread: {}",
            self.capacity_bytes,
            self.block_size,
            self.acceptable_factor,
            self.min_factor,
            self.single_factor,
            self.multi_factor,
            self.memory_factor,
            self.map_load_factor,
            self.map_concurrency_level,
            self.use_eviction_thread
        )
    }
}
