use mnemon::db::now_secs;
use mnemon::{Layer, Memory, MemoryInput, MemoryRecord, MemoryType, MnemonError};

fn test_mem() -> Memory {
    Memory::open(":memory:").expect("in-memory engine")
}

fn backdated(id: &str, content: &str, ty: MemoryType, importance: f64, age_days: f64) -> MemoryRecord {
    let t = now_secs() - age_days * 86_400.0;
    MemoryRecord {
        id: id.into(),
        content: content.into(),
        memory_type: ty,
        importance,
        working_strength: ty.initial_working_strength(),
        core_strength: 0.0,
        stability: ty.initial_stability(),
        created_at: t,
        last_accessed: t,
        access_count: 0,
        layer: Layer::Working,
        pinned: false,
        source: None,
        tags: vec![],
        contradicts: None,
        contradicted_by: None,
        embedding: None,
    }
}

#[test]
fn add_and_get() {
    let mem = test_mem();
    let id = mem
        .add(
            MemoryInput::new("user prefers dark mode")
                .memory_type(MemoryType::Relational)
                .importance(0.8)
                .tags(vec!["preference".into()]),
        )
        .unwrap();

    let rec = mem.get(&id).unwrap().unwrap();
    assert_eq!(rec.content, "user prefers dark mode");
    assert_eq!(rec.memory_type, MemoryType::Relational);
    assert_eq!(rec.layer, Layer::Working);
    assert!((rec.importance - 0.8).abs() < f64::EPSILON);
    assert_eq!(rec.tags, vec!["preference"]);
    assert_eq!(rec.access_count, 0);
    assert!(!rec.pinned);
}

#[test]
fn add_defaults_per_type() {
    let mem = test_mem();
    // type defaults to factual, importance to the type mean
    let id = mem.add(MemoryInput::new("water boils at 100C")).unwrap();
    let rec = mem.get(&id).unwrap().unwrap();
    assert_eq!(rec.memory_type, MemoryType::Factual);
    assert!((rec.importance - MemoryType::Factual.default_importance()).abs() < 1e-12);
    assert!((rec.working_strength - 2.0).abs() < 1e-12);
    assert!((rec.stability - 3.0).abs() < 1e-12);
    assert_eq!(rec.core_strength, 0.0);

    let id = mem
        .add(MemoryInput::new("how to deploy").memory_type(MemoryType::Procedural))
        .unwrap();
    let rec = mem.get(&id).unwrap().unwrap();
    assert!((rec.working_strength - 2.5).abs() < 1e-12);
    assert!((rec.stability - 10.0).abs() < 1e-12);
}

#[test]
fn high_importance_seeds_core() {
    let mem = test_mem();
    let id = mem
        .add(MemoryInput::new("critical allergy info").importance(0.9))
        .unwrap();
    let rec = mem.get(&id).unwrap().unwrap();
    assert!(rec.core_strength > 0.0);

    let id = mem
        .add(MemoryInput::new("mild trivia").importance(0.3))
        .unwrap();
    assert_eq!(mem.get(&id).unwrap().unwrap().core_strength, 0.0);
}

#[test]
fn add_rejects_bad_input() {
    let mem = test_mem();
    assert!(matches!(
        mem.add(MemoryInput::new("   ")),
        Err(MnemonError::EmptyContent)
    ));
    assert!(matches!(
        mem.add(MemoryInput::new("x").importance(1.5)),
        Err(MnemonError::ImportanceOutOfRange(_))
    ));
    assert!(matches!(
        mem.add(MemoryInput::new("x").importance(-0.1)),
        Err(MnemonError::ImportanceOutOfRange(_))
    ));
    let long = "x".repeat(20_000);
    assert!(matches!(
        mem.add(MemoryInput::new(long)),
        Err(MnemonError::Validation(_))
    ));
}

#[test]
fn delete_cascades_related_rows() {
    let mem = test_mem();
    let id = mem.add(MemoryInput::new("short lived")).unwrap();
    mem.recall("short lived", Default::default()).unwrap();
    assert_eq!(mem.store().access_count_rows(&id).unwrap(), 1);

    mem.forget_id(&id).unwrap();
    assert!(mem.get(&id).unwrap().is_none());
    assert_eq!(mem.store().access_count_rows(&id).unwrap(), 0);
    assert!(mem.store().search_fts(&["short".into()], 10).is_empty());
}

#[test]
fn forget_id_missing_is_not_found() {
    let mem = test_mem();
    assert!(matches!(mem.forget_id("nope"), Err(MnemonError::NotFound)));
}

#[test]
fn pin_unpin() {
    let mem = test_mem();
    let id = mem.add(MemoryInput::new("keep me")).unwrap();

    assert!(mem.pin(&id).unwrap());
    assert!(!mem.pin(&id).unwrap(), "second pin is a no-op");
    assert!(mem.get(&id).unwrap().unwrap().pinned);
    assert!(mem.unpin(&id).unwrap());
    assert!(!mem.get(&id).unwrap().unwrap().pinned);

    assert!(matches!(mem.pin("missing"), Err(MnemonError::NotFound)));
}

#[test]
fn access_count_matches_access_rows() {
    let mem = test_mem();
    let id = mem.add(MemoryInput::new("the nginx restart procedure")).unwrap();

    for _ in 0..3 {
        mem.recall("nginx", Default::default()).unwrap();
    }
    mem.consolidate(1.0).unwrap();

    let rec = mem.get(&id).unwrap().unwrap();
    let rows = mem.store().access_count_rows(&id).unwrap();
    assert_eq!(rec.access_count, rows, "counter must equal the log");
    assert!(rec.access_count >= 3);
}

#[test]
fn import_is_idempotent() {
    let mem = test_mem();
    let rec = backdated("fix-1", "imported memory", MemoryType::Factual, 0.5, 10.0);
    assert_eq!(mem.store().import(&[rec.clone()]).unwrap(), 1);
    assert_eq!(mem.store().import(&[rec]).unwrap(), 0);
    assert_eq!(mem.store().count().unwrap(), 1);

    let got = mem.get("fix-1").unwrap().unwrap();
    assert!(got.created_at < now_secs() - 9.0 * 86_400.0);
}

#[test]
fn stats_counts_layers_and_types() {
    let mem = test_mem();
    mem.add(MemoryInput::new("a").memory_type(MemoryType::Factual)).unwrap();
    mem.add(MemoryInput::new("b").memory_type(MemoryType::Episodic)).unwrap();
    let pinned = mem.add(MemoryInput::new("c").memory_type(MemoryType::Opinion)).unwrap();
    mem.pin(&pinned).unwrap();

    let stats = mem.stats().unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.working, 3);
    assert_eq!(stats.by_type.factual, 1);
    assert_eq!(stats.by_type.episodic, 1);
    assert_eq!(stats.by_type.opinion, 1);
    assert_eq!(stats.pinned, 1);
    assert!(stats.avg_importance > 0.0);
}

#[test]
fn update_memory_links_contradiction() {
    let mem = test_mem();
    let old = mem
        .add(MemoryInput::new("db is in us-east-1").importance(0.7))
        .unwrap();
    let new = mem.update_memory(&old, "db is in us-west-2").unwrap();

    let old_rec = mem.get(&old).unwrap().unwrap();
    let new_rec = mem.get(&new).unwrap().unwrap();
    assert_eq!(old_rec.contradicted_by.as_deref(), Some(new.as_str()));
    assert_eq!(new_rec.contradicts.as_deref(), Some(old.as_str()));
    // metadata carries over
    assert_eq!(new_rec.memory_type, old_rec.memory_type);
    assert!((new_rec.importance - old_rec.importance).abs() < 1e-12);
}

#[test]
fn update_memory_rejects_chaining() {
    let mem = test_mem();
    let old = mem.add(MemoryInput::new("deadline is friday")).unwrap();
    mem.update_memory(&old, "deadline is monday").unwrap();
    assert!(matches!(
        mem.update_memory(&old, "deadline is tuesday"),
        Err(MnemonError::Conflict(_))
    ));
    assert!(matches!(
        mem.update_memory("missing", "whatever"),
        Err(MnemonError::NotFound)
    ));
}

#[test]
fn schema_version_mismatch_refuses_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mem.db");
    let path = path.to_str().unwrap();

    drop(Memory::open(path).unwrap());

    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute(
        "UPDATE mnemon_meta SET value = '99' WHERE key = 'schema_version'",
        [],
    )
    .unwrap();
    drop(conn);

    match Memory::open(path) {
        Err(MnemonError::Corruption { found, .. }) => assert_eq!(found, 99),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("expected Corruption"),
    }
}

#[test]
fn single_process_lock_fails_loudly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locked.db");
    let path = path.to_str().unwrap();

    let first = Memory::open(path).unwrap();
    match Memory::open(path) {
        Err(MnemonError::StorageUnavailable(msg)) => {
            assert!(msg.contains("locked"), "message: {msg}");
        }
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("expected StorageUnavailable"),
    }
    drop(first);
    // released on drop
    Memory::open(path).unwrap();
}

#[test]
fn export_writes_backup() {
    let dir = tempfile::tempdir().unwrap();
    let mem = test_mem();
    mem.add(MemoryInput::new("exported fact")).unwrap();

    let out = dir.path().join("backup.db");
    let out = out.to_str().unwrap();
    let bytes = mem.export(out).unwrap();
    assert!(bytes > 0);

    let copy = mnemon::MemoryStore::open(out).unwrap();
    assert_eq!(copy.count().unwrap(), 1);
}
