use vault_service::config::{StorageBackend, VaultConfig};
use vault_service::startup::Application;

#[tokio::test]
async fn builds_with_file_backed_stores() {
    let dir = tempfile::tempdir().unwrap();

    let mut config = VaultConfig::for_tests();
    config.common.port = 0;
    config.storage.backend = StorageBackend::File;
    config.storage.data_dir = dir.path().join("state").to_string_lossy().into_owned();
    config.audit.path = Some(dir.path().join("audit.jsonl").to_string_lossy().into_owned());

    let app = Application::build(config).await.unwrap();
    assert_ne!(app.port(), 0);
    assert!(dir.path().join("state").is_dir());
}
