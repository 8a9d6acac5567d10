use chrono::Utc;
use uuid::Uuid;
use wavekeep_core::persistence::{CheckpointStore, CodeChunkRepository, SqliteCheckpointStore};
use wavekeep_core::types::{Checkpoint, ChunkType, CodeChunk, CoordinatorState};

fn chunk(id: &str, project: &str, file: &str) -> CodeChunk {
    CodeChunk {
        id: id.to_string(),
        project_id: project.to_string(),
        file: file.to_string(),
        start_line: 1,
        end_line: 5,
        content: "struct Foo;".into(),
        embedding: Some(vec![0.1, 0.2, 0.3]),
        symbols: vec!["Foo".into()],
        chunk_type: ChunkType::Class,
        language: "rust".into(),
        hash: "h1".into(),
        complexity: None,
        dependencies: None,
        exports: None,
        documentation: None,
        indexed_at: Utc::now(),
    }
}

#[tokio::test]
async fn survives_reopening_the_same_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chunks.db");

    {
        let repo = CodeChunkRepository::new(&path).await.unwrap();
        repo.insert(&chunk("c1", "proj", "src/main.rs")).await.unwrap();
    }

    let repo = CodeChunkRepository::new(&path).await.unwrap();
    let found = repo.find_by_id("c1").await.unwrap();
    assert!(found.is_some());
}

#[tokio::test]
async fn get_files_and_file_hashes() {
    let repo = CodeChunkRepository::new_in_memory().await.unwrap();
    repo.insert_many(&[
        chunk("c1", "proj", "a.rs"),
        chunk("c2", "proj", "a.rs"),
        chunk("c3", "proj", "b.rs"),
    ])
    .await
    .unwrap();

    let mut files = repo.get_files("proj").await.unwrap();
    files.sort();
    assert_eq!(files, vec!["a.rs".to_string(), "b.rs".to_string()]);

    let hashes = repo.get_file_hashes("a.rs").await.unwrap();
    assert_eq!(hashes.len(), 2);
    assert_eq!(hashes.get("c1"), Some(&"h1".to_string()));
}

#[tokio::test]
async fn find_by_symbol_scopes_to_project() {
    let repo = CodeChunkRepository::new_in_memory().await.unwrap();
    let mut other = chunk("c2", "other-proj", "b.rs");
    other.symbols = vec!["Foo".into()];
    repo.insert_many(&[chunk("c1", "proj", "a.rs"), other]).await.unwrap();

    let scoped = repo.find_by_symbol("Foo", Some("proj")).await.unwrap();
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].id, "c1");

    let unscoped = repo.find_by_symbol("Foo", None).await.unwrap();
    assert_eq!(unscoped.len(), 2);
}

#[tokio::test]
async fn delete_by_ids_removes_only_named_rows() {
    let repo = CodeChunkRepository::new_in_memory().await.unwrap();
    repo.insert_many(&[
        chunk("c1", "proj", "a.rs"),
        chunk("c2", "proj", "a.rs"),
        chunk("c3", "proj", "a.rs"),
    ])
    .await
    .unwrap();

    let n = repo.delete_by_ids(&["c1".to_string(), "c3".to_string()]).await.unwrap();
    assert_eq!(n, 2);
    assert_eq!(repo.count(None).await.unwrap(), 1);
}

#[tokio::test]
async fn checkpoint_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoints.db");
    let id = Uuid::new_v4();

    {
        let store = SqliteCheckpointStore::new(&path).await.unwrap();
        store
            .save(&Checkpoint {
                id,
                name: Some("before-merge".into()),
                project_id: "proj".into(),
                wave_id: 3,
                completed_task_ids: vec!["t1".into(), "t2".into()],
                pending_task_ids: vec!["t3".into()],
                timestamp: Utc::now(),
                coordinator_state: CoordinatorState::Running,
                git_commit: Some("deadbeef".into()),
            })
            .await
            .unwrap();
    }

    let store = SqliteCheckpointStore::new(&path).await.unwrap();
    let restored = store.load(id).await.unwrap();
    assert_eq!(restored.wave_id, 3);
    assert_eq!(restored.git_commit.as_deref(), Some("deadbeef"));
    assert_eq!(restored.coordinator_state, CoordinatorState::Running);
}
