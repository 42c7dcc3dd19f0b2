use std::sync::Arc;

use collection_sync::bootstrap::build_registry_with;
use collection_sync::catalog::JsonFileCatalog;
use collection_sync::load_config::parse_config;
use collection_sync_core::contract::{
    CatalogSink, DirectoryEntry, MockScmClient, RepositoryInfo, ScmClient,
};
use collection_sync_core::error::ScmError;
use collection_sync_core::orchestrator::SyncStatus;
use tempfile::tempdir;

const CONFIG: &str = r#"
environments:
  prod:
    schedule:
      frequency: { hours: 1 }
      timeout: { minutes: 1 }
    providers:
      github:
        - host: github.com
          organizations:
            - name: acme
            - name: archive
              enabled: false
"#;

const GALAXY: &str = "namespace: acme\nname: network\nversion: 2.1.0\ndescription: Network automation\ntags: [networking]\ndependencies:\n  ansible.utils: \">=2.0.0\"\n";

fn single_repo_client() -> MockScmClient {
    let mut scm = MockScmClient::new();
    scm.expect_list_repositories().returning(|| {
        Ok(vec![RepositoryInfo {
            name: "network".into(),
            full_path: "acme/network".into(),
            default_branch: "main".into(),
            url: "https://github.com/acme/network".into(),
            description: None,
        }])
    });
    scm.expect_list_directory()
        .returning(|_, _, path| match path {
            "" => Ok(vec![DirectoryEntry::file("galaxy.yml")]),
            other => Err(ScmError::NotFound(other.to_string())),
        });
    scm.expect_read_file()
        .returning(|_, _, _| Ok(GALAXY.to_string()));
    scm
}

#[tokio::test]
async fn configured_sources_sync_into_the_json_catalog() {
    let config = parse_config(CONFIG).unwrap();
    let dir = tempdir().unwrap();
    let catalog = Arc::new(JsonFileCatalog::open(dir.path().join("entities.json")).unwrap());
    let sink: Arc<dyn CatalogSink> = catalog.clone();

    let registry = build_registry_with(&config.sources, sink, |_| {
        Ok(Arc::new(single_repo_client()) as Arc<dyn ScmClient>)
    })
    .unwrap();

    assert_eq!(registry.len(), 2);
    assert!(registry.iter().all(|o| o.is_connected()));
    let archive = registry.get("prod:github:github.com:archive").unwrap();
    assert!(!archive.source().enabled);

    let acme = registry.get("prod:github:github.com:acme").unwrap();
    let outcome = acme
        .run_with_timeout(acme.source().schedule.timeout)
        .await
        .unwrap();
    assert_eq!(outcome.status, SyncStatus::Success);
    assert_eq!(outcome.collections, 1);

    let entities = catalog.entities("scm-discovery:prod:github:github.com:acme");
    assert_eq!(entities.len(), 2);
    let collection = entities
        .iter()
        .find(|e| e.spec["type"] == "ansible-collection")
        .unwrap();
    assert_eq!(collection.spec["collectionVersion"], "2.1.0");
    assert_eq!(
        collection.spec["collectionDependencies"]["ansible.utils"],
        ">=2.0.0"
    );
    assert_eq!(collection.spec["lifecycle"], "development");
}

#[test]
fn client_construction_failure_names_the_source() {
    let config = parse_config(CONFIG).unwrap();
    let sink: Arc<dyn CatalogSink> =
        Arc::new(JsonFileCatalog::open(tempdir().unwrap().path().join("c.json")).unwrap());

    let err = build_registry_with(&config.sources, sink, |_| {
        Err(ScmError::Other("no TLS backend".into()))
    })
    .err()
    .unwrap();

    assert!(err.to_string().contains("prod:github:github.com:acme"));
}
