//! Loading arena configuration the way a session layer would

use forge_alloc::memory::{ArenaConfig, ArenaExtendStrategy, ArenaSettings};
use forge_alloc::AllocatorError;

#[test]
fn test_empty_json_is_default() -> anyhow::Result<()> {
    let config: ArenaConfig = serde_json::from_str("{}")?;
    assert_eq!(config, ArenaConfig::default());
    assert_eq!(config.resolve()?, ArenaSettings::default());
    Ok(())
}

#[test]
fn test_partial_json_fills_defaults() -> anyhow::Result<()> {
    let config: ArenaConfig = serde_json::from_str(
        r#"{ "max_mem": 1073741824, "arena_extend_strategy": 1, "initial_chunk_size_bytes": 1000 }"#,
    )?;
    let settings = config.resolve()?;

    assert_eq!(settings.max_memory, Some(1 << 30));
    assert_eq!(settings.extend_strategy, ArenaExtendStrategy::SameAsRequested);
    assert_eq!(settings.initial_chunk_size, 1024);
    assert_eq!(
        settings.initial_growth_chunk_size,
        ArenaSettings::default().initial_growth_chunk_size
    );
    Ok(())
}

#[test]
fn test_json_round_trip() -> anyhow::Result<()> {
    let config = ArenaConfig::new()
        .with_max_mem(8 << 20)
        .with_extend_strategy(ArenaExtendStrategy::NextPowerOfTwo)
        .with_max_dead_bytes_per_chunk(0);

    let json = serde_json::to_string(&config)?;
    let back: ArenaConfig = serde_json::from_str(&json)?;
    assert_eq!(back, config);
    Ok(())
}

#[test]
fn test_invalid_strategy_survives_loading() -> anyhow::Result<()> {
    let config: ArenaConfig = serde_json::from_str(r#"{ "arena_extend_strategy": 5 }"#)?;
    assert!(matches!(
        config.resolve(),
        Err(AllocatorError::InvalidExtendStrategy(5))
    ));
    Ok(())
}

#[test]
fn test_unalignable_size_fails_resolution() -> anyhow::Result<()> {
    let config: ArenaConfig =
        serde_json::from_str(r#"{ "initial_chunk_size_bytes": 18446744073709551615 }"#)?;
    assert!(matches!(
        config.resolve(),
        Err(AllocatorError::InvalidConfiguration(_))
    ));

    let config: ArenaConfig =
        serde_json::from_str(r#"{ "initial_growth_chunk_size_bytes": 18446744073709551600 }"#)?;
    assert!(matches!(
        config.resolve(),
        Err(AllocatorError::InvalidConfiguration(_))
    ));
    Ok(())
}

#[test]
fn test_negative_size_rejected_by_serde() {
    let result = serde_json::from_str::<ArenaConfig>(r#"{ "initial_chunk_size_bytes": -4 }"#);
    assert!(result.is_err());
}

#[test]
fn test_sentinel_surface_matches_builders() -> anyhow::Result<()> {
    let raw = ArenaConfig::from_raw(4096, 1, 256, -1, 512)?;
    let built = ArenaConfig::new()
        .with_max_mem(4096)
        .with_extend_strategy(ArenaExtendStrategy::SameAsRequested)
        .with_initial_chunk_size(256)
        .with_initial_growth_chunk_size(512);
    assert_eq!(raw, built);
    Ok(())
}

#[test]
fn test_strategy_serializes_by_name() -> anyhow::Result<()> {
    let json = serde_json::to_string(&ArenaExtendStrategy::SameAsRequested)?;
    assert_eq!(json, r#""SameAsRequested""#);
    Ok(())
}
