use mnemon::db::now_secs;
use mnemon::{Layer, Memory, MemoryConfig, MemoryInput, MemoryRecord, MemoryType, MnemonError};

fn mem_with(config: MemoryConfig) -> Memory {
    Memory::open_with(":memory:", config).expect("in-memory engine")
}

fn row(
    id: &str,
    importance: f64,
    working: f64,
    core: f64,
    layer: Layer,
    pinned: bool,
    age_days: f64,
) -> MemoryRecord {
    let t = now_secs() - age_days * 86_400.0;
    MemoryRecord {
        id: id.into(),
        content: format!("memory {id}"),
        memory_type: MemoryType::Factual,
        importance,
        working_strength: working,
        core_strength: core,
        stability: 3.0,
        created_at: t,
        last_accessed: t,
        access_count: 0,
        layer,
        pinned,
        source: None,
        tags: vec![],
        contradicts: None,
        contradicted_by: None,
        embedding: None,
    }
}

/// Config with replay disabled, so strength arithmetic is exactly the
/// decay/transfer/downscale chain.
fn no_replay() -> MemoryConfig {
    let mut c = MemoryConfig::default();
    c.consolidation.replay_sample = 0;
    c
}

#[test]
fn transfer_moves_mass_into_core() {
    let mem = mem_with(no_replay());
    mem.store()
        .import(&[row("m", 1.0, 10.0, 0.0, Layer::Working, false, 0.0)])
        .unwrap();

    let summary = mem.consolidate(1.0).unwrap();
    assert_eq!(summary.replayed, 0);

    let rec = mem.get("m").unwrap().unwrap();
    let c = &mem.config().consolidation;
    // decay then transfer then core decay then downscale, all per-day factors
    let decayed = 10.0 * (-c.working_decay).exp();
    let frac = c.transfer_rate * 1.0_f64.max(c.importance_floor);
    let expected_core = decayed * frac * (-c.core_decay).exp() * mem.config().downscale.factor;
    let expected_working = decayed * (1.0 - frac) * mem.config().downscale.factor;

    assert!((rec.core_strength - expected_core).abs() < 1e-9, "core {}", rec.core_strength);
    assert!((rec.working_strength - expected_working).abs() < 1e-9, "working {}", rec.working_strength);
}

// Invariant: a zero-day cycle changes no strengths.
#[test]
fn zero_day_cycle_is_identity_on_strengths() {
    let mem = mem_with(MemoryConfig::default());
    mem.store()
        .import(&[
            row("a", 0.9, 4.0, 0.3, Layer::Working, false, 3.0),
            row("b", 0.2, 0.5, 0.02, Layer::Working, false, 10.0),
        ])
        .unwrap();
    mem.consolidate(2.5).unwrap();

    let before: Vec<_> = ["a", "b"]
        .iter()
        .map(|id| mem.get(id).unwrap().unwrap())
        .collect();
    mem.consolidate(0.0).unwrap();
    let after: Vec<_> = ["a", "b"]
        .iter()
        .map(|id| mem.get(id).unwrap().unwrap())
        .collect();

    for (b, a) in before.iter().zip(after.iter()) {
        assert!((b.working_strength - a.working_strength).abs() < 1e-12);
        assert!((b.core_strength - a.core_strength).abs() < 1e-12);
        assert!((b.stability - a.stability).abs() < 1e-12);
    }
}

#[test]
fn negative_days_rejected() {
    let mem = mem_with(MemoryConfig::default());
    assert!(matches!(
        mem.consolidate(-1.0),
        Err(MnemonError::InvalidDays(_))
    ));
}

#[test]
fn layer_promotion_and_archival() {
    let mem = mem_with(no_replay());
    mem.store()
        .import(&[
            row("strong", 0.9, 2.0, 0.8, Layer::Working, false, 1.0),
            row("fading", 0.1, 0.05, 0.01, Layer::Working, false, 20.0),
            row("middling", 0.5, 1.0, 0.1, Layer::Working, false, 1.0),
        ])
        .unwrap();

    let summary = mem.consolidate(1.0).unwrap();
    assert!(summary.promoted >= 1);
    assert!(summary.archived >= 1);

    assert_eq!(mem.get("strong").unwrap().unwrap().layer, Layer::Core);
    assert_eq!(mem.get("fading").unwrap().unwrap().layer, Layer::Archive);
    assert_eq!(mem.get("middling").unwrap().unwrap().layer, Layer::Working);
}

#[test]
fn demotion_out_of_core() {
    let mem = mem_with(no_replay());
    // previously promoted, but its core trace has since worn down
    mem.store()
        .import(&[row("waning", 0.5, 1.0, 0.1, Layer::Core, false, 5.0)])
        .unwrap();

    let summary = mem.consolidate(1.0).unwrap();
    assert_eq!(summary.demoted, 1);
    assert_eq!(mem.get("waning").unwrap().unwrap().layer, Layer::Working);
}

#[test]
fn pinned_memories_never_decay_or_archive() {
    let mem = mem_with(no_replay());
    mem.store()
        .import(&[row("anchor", 0.2, 0.01, 0.0, Layer::Working, true, 50.0)])
        .unwrap();

    mem.consolidate(10.0).unwrap();
    let rec = mem.get("anchor").unwrap().unwrap();
    assert!((rec.working_strength - 0.01).abs() < 1e-12, "no decay, no downscale");
    assert_eq!(rec.core_strength, 0.0);
    // pinned rows always classify as core, never archive
    assert_eq!(rec.layer, Layer::Core);
}

#[test]
fn replay_boosts_core_and_logs_access() {
    let mem = mem_with(MemoryConfig::default());
    let id = mem.add(MemoryInput::new("replayed recent memory")).unwrap();

    let summary = mem.consolidate(1.0).unwrap();
    assert_eq!(summary.replayed, 1);

    let rec = mem.get(&id).unwrap().unwrap();
    assert!(rec.core_strength > 0.0, "replay seeded the core trace");
    assert_eq!(rec.access_count, 1);
    assert_eq!(mem.store().access_count_rows(&id).unwrap(), 1);
}

#[test]
fn replay_interleaves_recent_and_important_old() {
    let mut config = MemoryConfig::default();
    config.consolidation.replay_sample = 2;
    config.consolidation.interleave_ratio = 0.5;
    let mem = mem_with(config);

    mem.store()
        .import(&[
            row("old-important", 0.95, 2.0, 0.0, Layer::Working, false, 10.0),
            row("old-trivial", 0.05, 2.0, 0.0, Layer::Working, false, 10.0),
        ])
        .unwrap();
    let fresh = mem.add(MemoryInput::new("fresh entry")).unwrap();

    mem.consolidate(1.0).unwrap();

    // one slot goes to the fresh row, the other to the important old one
    assert_eq!(mem.store().access_count_rows(&fresh).unwrap(), 1);
    assert_eq!(mem.store().access_count_rows("old-important").unwrap(), 1);
    assert_eq!(mem.store().access_count_rows("old-trivial").unwrap(), 0);
}

// Invariant: downscale is exactly multiplicative on unpinned rows.
#[test]
fn downscale_is_exact() {
    let mem = mem_with(MemoryConfig::default());
    mem.store()
        .import(&[
            row("u1", 0.5, 3.0, 1.5, Layer::Working, false, 1.0),
            row("u2", 0.5, 0.4, 0.2, Layer::Working, false, 1.0),
            row("p", 0.5, 2.0, 1.0, Layer::Working, true, 1.0),
        ])
        .unwrap();

    let n = mem.downscale(0.9).unwrap();
    assert_eq!(n, 2);

    let u1 = mem.get("u1").unwrap().unwrap();
    assert!((u1.working_strength - 2.7).abs() < 1e-9);
    assert!((u1.core_strength - 1.35).abs() < 1e-9);
    let p = mem.get("p").unwrap().unwrap();
    assert!((p.working_strength - 2.0).abs() < 1e-12, "pinned untouched");

    assert!(matches!(mem.downscale(0.0), Err(MnemonError::InvalidFactor(_))));
    assert!(matches!(mem.downscale(1.5), Err(MnemonError::InvalidFactor(_))));
}

#[test]
fn consolidation_summary_counts() {
    let mem = mem_with(no_replay());
    mem.store()
        .import(&[
            row("a", 0.9, 2.0, 0.8, Layer::Working, false, 1.0),
            row("b", 0.5, 1.0, 0.1, Layer::Working, false, 1.0),
        ])
        .unwrap();
    let summary = mem.consolidate(1.0).unwrap();
    assert_eq!(summary.promoted, 1);
    assert_eq!(summary.downscaled, 2);
    assert!((summary.days - 1.0).abs() < f64::EPSILON);
}
