/*!
 * 结果归档测试模块
 */

use tempfile::TempDir;

use optstore::storage::{
    ArchiveError, ArchiveOptions, PersistenceOptions, ResultArchive, BACKUPS_DIR_NAME,
    RESULTS_DIR_NAME,
};

use crate::test_utils::*;

async fn archive_in(dir: &TempDir, backup_count: usize) -> ResultArchive {
    let options = ArchiveOptions {
        persistence: PersistenceOptions::compressed(6),
        backup_count,
        ..Default::default()
    };
    ResultArchive::new(dir.path(), options).await.unwrap()
}

fn backup_files(dir: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir.path().join(BACKUPS_DIR_NAME))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_save_and_load() {
    init_test_logging();
    let temp_dir = TempDir::new().unwrap();
    let archive = archive_in(&temp_dir, 3).await;
    let result = scenario_result();

    archive.save("forest", &result).await.unwrap();
    let restored = archive.load("forest").await.unwrap().unwrap();

    assert_eq!(restored, result);
    assert_eq!(restored.fun, SCENARIO_FUN);
}

#[tokio::test]
async fn test_saves_leave_only_artifacts() {
    let temp_dir = TempDir::new().unwrap();
    let archive = archive_in(&temp_dir, 1).await;
    let result = scenario_result();

    for _ in 0..3 {
        archive.save("forest", &result).await.unwrap();
        archive.save("gp_run", &result).await.unwrap();
    }

    let mut names: Vec<String> = std::fs::read_dir(temp_dir.path().join(RESULTS_DIR_NAME))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["forest.optr", "gp_run.optr"]);
}

#[tokio::test]
async fn test_load_missing_is_none() {
    let temp_dir = TempDir::new().unwrap();
    let archive = archive_in(&temp_dir, 3).await;

    assert!(archive.load("never_saved").await.unwrap().is_none());
}

#[tokio::test]
async fn test_backup_rotation() {
    let temp_dir = TempDir::new().unwrap();
    let archive = archive_in(&temp_dir, 2).await;
    let result = scenario_result();

    for _ in 0..5 {
        archive.save("forest", &result).await.unwrap();
    }
    archive.save("forest_b", &result).await.unwrap();
    archive.save("forest_b", &result).await.unwrap();

    let backups = backup_files(&temp_dir);
    let own = backups
        .iter()
        .filter(|name| name.starts_with("forest_b_"))
        .count();
    assert_eq!(own, 1);
    assert_eq!(backups.len() - own, 2);
}

#[tokio::test]
async fn test_corrupt_artifact_is_error_not_fallback() {
    let temp_dir = TempDir::new().unwrap();
    let archive = archive_in(&temp_dir, 3).await;
    let result = scenario_result();

    archive.save("forest", &result).await.unwrap();
    archive.save("forest", &result).await.unwrap();

    let path = archive.artifact_path("forest").unwrap();
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&path, &bytes).unwrap();

    let err = archive.load("forest").await.unwrap_err();
    match err {
        ArchiveError::Decode(decode) => assert!(decode.is_corrupt()),
        other => panic!("unexpected error: {:?}", other),
    }

    let restored = archive.restore_from_backup("forest").await.unwrap();
    assert_eq!(restored, result);
}

#[tokio::test]
async fn test_restore_without_backup() {
    let temp_dir = TempDir::new().unwrap();
    let archive = archive_in(&temp_dir, 3).await;

    archive.save("single", &scenario_result()).await.unwrap();

    assert!(matches!(
        archive.restore_from_backup("single").await,
        Err(ArchiveError::NoBackup { .. })
    ));
}

#[tokio::test]
async fn test_invalid_names_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let archive = archive_in(&temp_dir, 3).await;
    let result = scenario_result();

    for name in ["", "..", "../outside", "nested/run"] {
        assert!(
            matches!(
                archive.save(name, &result).await,
                Err(ArchiveError::InvalidName { .. })
            ),
            "name {:?}",
            name
        );
    }
    assert!(!temp_dir.path().join("outside.optr").exists());
}

#[tokio::test]
async fn test_unserializable_save_leaves_archive_unchanged() {
    let temp_dir = TempDir::new().unwrap();
    let archive = archive_in(&temp_dir, 3).await;
    let result = scenario_result();

    archive.save("forest", &result).await.unwrap();
    let err = archive
        .save("forest", &unserializable_result())
        .await
        .unwrap_err();

    assert!(matches!(err, ArchiveError::Encode(_)));
    assert!(backup_files(&temp_dir).is_empty());
    assert_eq!(archive.load("forest").await.unwrap().unwrap(), result);
}

#[tokio::test]
async fn test_list_remove_and_stats() {
    let temp_dir = TempDir::new().unwrap();
    let archive = archive_in(&temp_dir, 3).await;
    let result = scenario_result();

    archive.save("gp_run", &result).await.unwrap();
    archive.save("forest", &result).await.unwrap();
    archive.save("forest", &result).await.unwrap();

    assert_eq!(archive.list().await.unwrap(), vec!["forest", "gp_run"]);

    let stats = archive.stats().await.unwrap();
    println!(
        "results: {} ({}), backups: {} ({})",
        stats.result_count,
        stats.result_total_size_formatted(),
        stats.backup_count,
        stats.backup_total_size_formatted()
    );
    assert_eq!(stats.result_count, 2);
    assert_eq!(stats.backup_count, 1);
    assert_eq!(stats.compression_level, 6);
    assert!(stats.result_total_size > 0);

    assert!(archive.remove("gp_run").await.unwrap());
    assert!(!archive.remove("gp_run").await.unwrap());
    assert_eq!(archive.list().await.unwrap(), vec!["forest"]);
}
