use std::collections::BTreeMap;
use std::fs;

use collection_sync::catalog::JsonFileCatalog;
use collection_sync_core::contract::CatalogSink;
use collection_sync_core::entity::{EntityDescriptor, EntityMetadata};
use serde_json::json;
use tempfile::tempdir;

fn entity(name: &str) -> EntityDescriptor {
    EntityDescriptor {
        api_version: "backstage.io/v1alpha1".into(),
        kind: "Component".into(),
        metadata: EntityMetadata {
            name: name.into(),
            title: None,
            description: None,
            tags: vec![],
            annotations: BTreeMap::new(),
            links: vec![],
        },
        spec: json!({ "type": "ansible-collection" }),
    }
}

#[tokio::test]
async fn mutation_replaces_only_its_own_location() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("entities.json");
    let catalog = JsonFileCatalog::open(&path).unwrap();

    catalog
        .apply_full_mutation("scm-discovery:a", vec![entity("one"), entity("two")])
        .await
        .unwrap();
    catalog
        .apply_full_mutation("scm-discovery:b", vec![entity("three")])
        .await
        .unwrap();
    catalog
        .apply_full_mutation("scm-discovery:a", vec![entity("two")])
        .await
        .unwrap();

    let names = |key: &str| -> Vec<String> {
        catalog
            .entities(key)
            .into_iter()
            .map(|e| e.metadata.name)
            .collect()
    };
    assert_eq!(names("scm-discovery:a"), vec!["two"]);
    assert_eq!(names("scm-discovery:b"), vec!["three"]);

    let on_disk: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk["scm-discovery:a"][0]["metadata"]["name"], "two");
    assert_eq!(on_disk["scm-discovery:a"][0]["apiVersion"], "backstage.io/v1alpha1");
}

#[tokio::test]
async fn reopening_loads_previous_state() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("entities.json");
    {
        let catalog = JsonFileCatalog::open(&path).unwrap();
        catalog
            .apply_full_mutation("scm-discovery:a", vec![entity("kept")])
            .await
            .unwrap();
    }

    let reopened = JsonFileCatalog::open(&path).unwrap();

    assert_eq!(reopened.location_keys(), vec!["scm-discovery:a"]);
    assert_eq!(reopened.entities("scm-discovery:a")[0].metadata.name, "kept");
}

#[tokio::test]
async fn empty_mutation_clears_a_location() {
    let dir = tempdir().unwrap();
    let catalog = JsonFileCatalog::open(dir.path().join("entities.json")).unwrap();
    catalog
        .apply_full_mutation("scm-discovery:a", vec![entity("gone")])
        .await
        .unwrap();

    catalog
        .apply_full_mutation("scm-discovery:a", vec![])
        .await
        .unwrap();

    assert!(catalog.entities("scm-discovery:a").is_empty());
}

#[test]
fn corrupt_catalog_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("entities.json");
    fs::write(&path, "not json").unwrap();

    assert!(JsonFileCatalog::open(&path).is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mutations_keep_every_location() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("entities.json");
    let catalog = std::sync::Arc::new(JsonFileCatalog::open(&path).unwrap());

    let writes = (0..8).map(|i| {
        let catalog = std::sync::Arc::clone(&catalog);
        tokio::spawn(async move {
            catalog
                .apply_full_mutation(&format!("scm-discovery:{}", i), vec![entity("one")])
                .await
        })
    });
    for write in futures::future::join_all(writes).await {
        write.unwrap().unwrap();
    }

    assert_eq!(catalog.location_keys().len(), 8);
    let reopened = JsonFileCatalog::open(&path).unwrap();
    assert_eq!(reopened.location_keys().len(), 8);
}

#[tokio::test]
async fn failed_write_leaves_memory_unchanged() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, "file in the way").unwrap();
    let catalog = JsonFileCatalog::open(blocker.join("entities.json")).unwrap();

    let result = catalog
        .apply_full_mutation("scm-discovery:a", vec![entity("lost")])
        .await;

    assert!(result.is_err());
    assert!(catalog.location_keys().is_empty());
}
