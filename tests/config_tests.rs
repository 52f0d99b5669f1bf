// Configuration Tests for blockcache
// These tests verify the validation boundary and the property surface

use std::collections::HashMap;

use blockcache::config::{
    ACCEPTABLE_FACTOR_PROPERTY, EVICTION_THREAD_PROPERTY, MAP_CONCURRENCY_PROPERTY,
    MAP_LOAD_PROPERTY, MEMORY_FACTOR_PROPERTY, MIN_FACTOR_PROPERTY, MULTI_FACTOR_PROPERTY,
    SINGLE_FACTOR_PROPERTY,
};
use blockcache::{BlockCache, CacheConfig, CacheProperties, Error};

fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Property names are part of the external contract
#[test]
fn test_property_names() {
    assert_eq!(ACCEPTABLE_FACTOR_PROPERTY, "acceptable.factor");
    assert_eq!(MIN_FACTOR_PROPERTY, "min.factor");
    assert_eq!(SINGLE_FACTOR_PROPERTY, "single.factor");
    assert_eq!(MULTI_FACTOR_PROPERTY, "multi.factor");
    assert_eq!(MEMORY_FACTOR_PROPERTY, "memory.factor");
    assert_eq!(MAP_LOAD_PROPERTY, "map.load");
    assert_eq!(MAP_CONCURRENCY_PROPERTY, "map.concurrency");
    assert_eq!(EVICTION_THREAD_PROPERTY, "eviction.thread");
    assert!(CacheProperties::known_properties().contains(&"block.size"));
}

/// An empty source yields the documented defaults
#[test]
fn test_defaults_from_empty_source() {
    let config = CacheConfig::new(1 << 20, CacheProperties::from_map(&HashMap::new()).unwrap()).unwrap();

    assert_eq!(config.acceptable_factor(), 0.85);
    assert_eq!(config.min_factor(), 0.75);
    assert_eq!(config.single_factor(), 0.25);
    assert_eq!(config.multi_factor(), 0.50);
    assert_eq!(config.memory_factor(), 0.25);
    assert_eq!(config.map_load_factor(), 0.75);
    assert_eq!(config.map_concurrency_level(), 16);
    assert!(config.use_eviction_thread());
}

/// Factors summing to 0.9 fail
#[test]
fn test_factor_sum_below_one_fails() {
    let map = props(&[("single.factor", "0.2"), ("multi.factor", "0.5"), ("memory.factor", "0.2")]);
    let result = CacheConfig::new(1000, CacheProperties::from_map(&map).unwrap());
    assert!(matches!(result, Err(Error::Configuration(_))));
}

/// Factors summing above 1.0 fail
#[test]
fn test_factor_sum_above_one_fails() {
    let map = props(&[("single.factor", "0.4"), ("multi.factor", "0.5"), ("memory.factor", "0.25")]);
    assert!(CacheConfig::new(1000, CacheProperties::from_map(&map).unwrap()).is_err());
}

/// min.factor equal to acceptable.factor fails
#[test]
fn test_min_equal_to_acceptable_fails() {
    let map = props(&[("acceptable.factor", "0.8"), ("min.factor", "0.8")]);
    assert!(CacheConfig::new(1000, CacheProperties::from_map(&map).unwrap()).is_err());
}

/// Out-of-range factors fail
#[test]
fn test_out_of_range_factors_fail() {
    let cases: &[&[(&str, &str)]] = &[
        &[("acceptable.factor", "1.0")],
        &[("acceptable.factor", "1.5")],
        &[("min.factor", "0")],
        &[("min.factor", "-0.5")],
        &[("single.factor", "0"), ("multi.factor", "0.75")],
        &[("memory.factor", "1.0"), ("single.factor", "0.0"), ("multi.factor", "0.0")],
        &[("map.load", "0")],
        &[("map.load", "-1")],
        &[("map.concurrency", "0")],
    ];

    for pairs in cases {
        let props = CacheProperties::from_map(&props(pairs)).unwrap();
        assert!(CacheConfig::new(1000, props).is_err(), "{:?} should fail", pairs);
    }
}

/// Unparsable values fail before validation
#[test]
fn test_unparsable_values_fail() {
    assert!(CacheProperties::from_map(&props(&[("map.concurrency", "-3")])).is_err());
    assert!(CacheProperties::from_map(&props(&[("map.concurrency", "1.5")])).is_err());
    assert!(CacheProperties::from_map(&props(&[("acceptable.factor", "")])).is_err());
}

/// Valid non-default combinations construct
#[test]
fn test_valid_combinations() {
    let cases: &[&[(&str, &str)]] = &[
        &[("acceptable.factor", "0.99"), ("min.factor", "0.01")],
        &[("single.factor", "0.1"), ("multi.factor", "0.1"), ("memory.factor", "0.8")],
        &[("single.factor", "0.3"), ("multi.factor", "0.3"), ("memory.factor", "0.4")],
        &[("map.load", "2.5"), ("map.concurrency", "1"), ("eviction.thread", "false")],
    ];

    for pairs in cases {
        let props = CacheProperties::from_map(&props(pairs)).unwrap();
        assert!(CacheConfig::new(1000, props).is_ok(), "{:?} should succeed", pairs);
    }
}

/// JSON documents use the same property names
#[test]
fn test_json_source() {
    let props = CacheProperties::from_json(
        r#"{
            "acceptable.factor": 0.9,
            "min.factor": 0.6,
            "eviction.thread": false,
            "map.concurrency": 8
        }"#,
    )
    .unwrap();

    let config = CacheConfig::new(4096, props.clone()).unwrap();
    assert_eq!(config.acceptable_bytes(), 3687);
    assert_eq!(config.min_bytes(), 2457);
    assert!(!config.use_eviction_thread());

    let round_trip: CacheProperties =
        serde_json::from_str(&serde_json::to_string(&props).unwrap()).unwrap();
    assert_eq!(round_trip, props);
}

/// A cache built from a property source follows it
#[test]
fn test_cache_uses_configuration() {
    let map = props(&[("eviction.thread", "false"), ("map.concurrency", "2")]);
    let config = CacheConfig::new(2048, CacheProperties::from_map(&map).unwrap()).unwrap();
    let cache = BlockCache::new(config).unwrap();

    assert!(!cache.has_eviction_thread());
    assert_eq!(cache.capacity(), 2048);
    assert_eq!(cache.config().map_concurrency_level(), 2);
}

/// Extreme table tuning still builds a working cache
#[test]
fn test_extreme_table_tuning_builds() {
    let cases = [
        (1024 * 1024, CacheProperties::new().map_load_factor(1e-30)),
        (1 << 50, CacheProperties::new().block_size(1)),
        (u64::MAX, CacheProperties::new().block_size(1).map_load_factor(f32::MIN_POSITIVE)),
        (4096, CacheProperties::new().map_concurrency_level(u32::MAX)),
    ];

    for (capacity, props) in cases {
        let props = props.use_eviction_thread(false);
        let cache = BlockCache::new(CacheConfig::new(capacity, props).unwrap()).unwrap();

        let key = blockcache::BlockKey::new(1, 0);
        cache.admit(key, bytes::Bytes::from_static(b"block"), None, false);
        assert!(cache.contains(&key));
    }
}
