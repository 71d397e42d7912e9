//! Extension manager integration tests
//! Run with: cargo test --test extension_manager_test

mod common;

use carik_plugins::application::errors::{
    DependencyInstallError, ExtensionError, LoadError, ResolutionError, StateError,
};
use carik_plugins::application::services::InstallOutcome;
use carik_plugins::domain::entities::{PluginRef, RegistryStatus};
use carik_plugins::infrastructure::loader::LoaderCall;

use common::{harness, ready_harness, Options};

const REGISTRY: &str = r#"{
    "alpha": {"repository": "fourjr/plugins", "bot_version": "3.4", "description": "Say hello"},
    "future": {"repository": "fourjr/plugins", "bot_version": "9.0", "description": "Needs a newer bot"},
    "tagged": {"repository": "fourjr/plugins", "branch": "v4", "description": "Lives on v4"}
}"#;

fn alpha() -> PluginRef {
    PluginRef::new("fourjr", "plugins", "alpha", None)
}

fn with_registry() -> Options {
    Options {
        registry: REGISTRY,
        ..Options::default()
    }
}

#[tokio::test]
async fn test_install_loads_and_persists() {
    let h = ready_harness(Options::default()).await;
    h.serve_archive("fourjr", "plugins", "master", &["alpha", "beta"]);

    let outcome = h.manager.install("fourjr/plugins/alpha").await.unwrap();

    assert_eq!(outcome, InstallOutcome::Loaded(alpha()));
    assert_eq!(h.manager.configured().await, vec!["fourjr/plugins/alpha@master"]);
    assert_eq!(h.store.snapshot().await, vec!["fourjr/plugins/alpha@master"]);
    assert_eq!(h.manager.list_loaded().unwrap(), vec![alpha()]);
    assert!(h.loader.is_active(&alpha().extension_id()));
}

#[tokio::test]
async fn test_install_then_remove_restores_state() {
    let h = ready_harness(Options::default()).await;
    h.serve_archive("fourjr", "plugins", "master", &["alpha"]);

    h.manager.install("fourjr/plugins/alpha").await.unwrap();
    assert!(h.install_dir(&alpha()).join("alpha.so").exists());

    let removed = h.manager.remove("fourjr/plugins/alpha@master").await.unwrap();

    assert_eq!(removed, alpha());
    assert!(h.manager.configured().await.is_empty());
    assert!(h.store.snapshot().await.is_empty());
    assert!(h.manager.list_loaded().unwrap().is_empty());
    assert!(!h.install_dir(&alpha()).exists());
    assert!(!h.plugins_root().join("fourjr").exists());
    assert!(h.plugins_root().exists());
    assert_eq!(
        h.loader.calls(),
        vec![
            LoaderCall::Load(alpha().extension_id()),
            LoaderCall::Unload(alpha().extension_id()),
        ]
    );
}

#[tokio::test]
async fn test_remove_keeps_sibling_plugins() {
    let h = ready_harness(Options::default()).await;
    h.serve_archive("fourjr", "plugins", "master", &["alpha", "beta"]);
    let beta = PluginRef::new("fourjr", "plugins", "beta", None);

    h.manager.install("fourjr/plugins/alpha").await.unwrap();
    h.manager.install("fourjr/plugins/beta").await.unwrap();
    h.manager.remove("fourjr/plugins/alpha").await.unwrap();

    assert!(h.install_dir(&beta).join("beta.so").exists());
    assert_eq!(h.manager.list_loaded().unwrap(), vec![beta]);
}

#[tokio::test]
async fn test_duplicate_install_is_rejected() {
    let h = ready_harness(Options::default()).await;
    let url = h.serve_archive("fourjr", "plugins", "master", &["alpha"]);

    h.manager.install("fourjr/plugins/alpha").await.unwrap();
    let result = h.manager.install("fourjr/plugins/alpha@master").await;

    assert!(matches!(
        result,
        Err(ExtensionError::State(StateError::AlreadyInstalled(name))) if name == "fourjr/plugins/alpha@master"
    ));
    assert_eq!(h.http.calls(&url), 1);
    assert_eq!(h.manager.configured().await.len(), 1);
}

#[tokio::test]
async fn test_concurrent_installs_of_one_plugin() {
    let h = ready_harness(Options::default()).await;
    let url = h.serve_archive("fourjr", "plugins", "master", &["alpha"]);

    let (first, second) = tokio::join!(
        h.manager.install("fourjr/plugins/alpha"),
        h.manager.install("fourjr/plugins/alpha@master"),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(ExtensionError::State(StateError::AlreadyInstalled(_)))
    )));
    assert_eq!(h.http.calls(&url), 1);
}

#[tokio::test]
async fn test_concurrent_installs_of_different_plugins() {
    let h = ready_harness(Options::default()).await;
    h.serve_archive("fourjr", "plugins", "master", &["alpha", "beta"]);

    let (first, second) = tokio::join!(
        h.manager.install("fourjr/plugins/alpha"),
        h.manager.install("fourjr/plugins/beta"),
    );

    first.unwrap();
    second.unwrap();
    assert_eq!(h.manager.list_loaded().unwrap().len(), 2);
    assert_eq!(h.store.snapshot().await.len(), 2);
}

#[tokio::test]
async fn test_version_gate_blocks_before_download() {
    let h = ready_harness(with_registry()).await;
    h.serve_archive("fourjr", "plugins", "master", &["future"]);

    let result = h.manager.install("future").await;

    match result {
        Err(ExtensionError::Resolution(ResolutionError::VersionTooLow { required, host })) => {
            assert_eq!(required, "9.0");
            assert_eq!(host, "4.0.0");
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(h.http.archive_calls(), 0);
    assert!(h.manager.configured().await.is_empty());
}

#[tokio::test]
async fn test_install_by_registry_name_uses_entry_branch() {
    let h = ready_harness(with_registry()).await;
    let url = h.serve_archive("fourjr", "plugins", "v4", &["tagged"]);

    let outcome = h.manager.install("tagged").await.unwrap();

    assert_eq!(outcome.plugin().canonical(), "fourjr/plugins/tagged@v4");
    assert_eq!(h.http.calls(&url), 1);
}

#[tokio::test]
async fn test_builtin_name_is_refused_without_download() {
    let h = ready_harness(Options::default()).await;
    h.serve_archive("someone", "repo", "master", &["core"]);

    let result = h.manager.install("someone/repo/core").await;

    assert!(matches!(
        result,
        Err(ExtensionError::Load(LoadError::NameCollision(name))) if name == "core"
    ));
    assert_eq!(h.http.archive_calls(), 0);
}

#[tokio::test]
async fn test_install_rejects_paths_outside_plugins_root() {
    let h = ready_harness(Options::default()).await;
    h.serve_archive("evil", "repo", "master", &["escaped"]);

    let result = h.manager.install("evil/repo/../../../escaped").await;

    assert!(matches!(
        result,
        Err(ExtensionError::Resolution(ResolutionError::InvalidFormat(_)))
    ));
    assert_eq!(h.http.archive_calls(), 0);
    assert!(h.manager.configured().await.is_empty());
    assert!(!h.dir.path().join("escaped-master").exists());
    assert!(!h.plugins_root().join("evil").exists());
}

#[tokio::test]
async fn test_missing_subtree_is_not_configured() {
    let h = ready_harness(Options::default()).await;
    h.serve_archive("fourjr", "plugins", "master", &["beta"]);

    let result = h.manager.install("fourjr/plugins/alpha").await;

    assert!(matches!(result, Err(ExtensionError::Extraction(_))));
    assert!(h.manager.configured().await.is_empty());
}

#[tokio::test]
async fn test_remove_unknown_plugin() {
    let h = ready_harness(Options::default()).await;

    let result = h.manager.remove("fourjr/plugins/alpha").await;

    assert!(matches!(
        result,
        Err(ExtensionError::State(StateError::NotInstalled(_)))
    ));
}

#[tokio::test]
async fn test_fetch_is_idempotent() {
    let h = ready_harness(Options::default()).await;
    let url = h.serve_archive("fourjr", "plugins", "master", &["alpha"]);
    h.manager.install("fourjr/plugins/alpha").await.unwrap();

    let first = h.manager.fetcher().fetch(&alpha(), false).await.unwrap();
    let second = h.manager.fetcher().fetch(&alpha(), false).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first, h.install_dir(&alpha()));
    assert_eq!(h.http.calls(&url), 1);
}

#[tokio::test]
async fn test_cache_hit_after_install_dir_deleted() {
    let h = ready_harness(Options::default()).await;
    let url = h.serve_archive("fourjr", "plugins", "master", &["alpha"]);
    h.manager.install("fourjr/plugins/alpha").await.unwrap();
    assert!(h.cache_file(&alpha()).exists());

    std::fs::remove_dir_all(h.install_dir(&alpha())).unwrap();
    h.manager.fetcher().fetch(&alpha(), false).await.unwrap();

    assert_eq!(h.http.calls(&url), 1);
    assert!(h.install_dir(&alpha()).join("alpha.so").exists());
}

#[tokio::test]
async fn test_cache_miss_after_cache_file_deleted() {
    let h = ready_harness(Options::default()).await;
    let url = h.serve_archive("fourjr", "plugins", "master", &["alpha"]);
    h.manager.install("fourjr/plugins/alpha").await.unwrap();

    std::fs::remove_dir_all(h.install_dir(&alpha())).unwrap();
    std::fs::remove_file(h.cache_file(&alpha())).unwrap();
    h.manager.fetcher().fetch(&alpha(), false).await.unwrap();

    assert_eq!(h.http.calls(&url), 2);
    assert!(h.cache_file(&alpha()).exists());
}

#[tokio::test]
async fn test_extraction_is_scoped_to_one_plugin() {
    let h = ready_harness(Options::default()).await;
    h.serve_archive("fourjr", "plugins", "master", &["alpha", "beta"]);
    let beta = PluginRef::new("fourjr", "plugins", "beta", None);

    h.manager.install("fourjr/plugins/alpha").await.unwrap();
    let alpha_dir = h.install_dir(&alpha());
    assert!(alpha_dir.join("alpha.so").exists());
    assert!(!alpha_dir.join("beta.so").exists());
    assert!(!alpha_dir.join("README.md").exists());

    std::fs::write(alpha_dir.join("settings.json"), "{}").unwrap();
    h.manager.install("fourjr/plugins/beta").await.unwrap();

    assert!(h.install_dir(&beta).join("beta.so").exists());
    assert!(!h.install_dir(&beta).join("alpha.so").exists());
    assert!(alpha_dir.join("settings.json").exists());
}

#[tokio::test]
async fn test_dependencies_run_in_install_dir() {
    let h = ready_harness(Options::default()).await;
    h.serve_archive("fourjr", "plugins", "master", &["alpha", "depsbeta"]);
    let beta = PluginRef::new("fourjr", "plugins", "depsbeta", None);

    h.manager.install("fourjr/plugins/alpha").await.unwrap();
    h.manager.install("fourjr/plugins/depsbeta").await.unwrap();

    assert_eq!(h.runner.runs(), vec![h.install_dir(&beta)]);
}

#[tokio::test]
async fn test_failed_dependencies_leave_plugin_configured_but_unloaded() {
    let h = ready_harness(Options::default()).await;
    h.serve_archive("fourjr", "plugins", "master", &["depsbeta"]);
    h.runner.fail_for("depsbeta");
    let beta = PluginRef::new("fourjr", "plugins", "depsbeta", None);

    let result = h.manager.install("fourjr/plugins/depsbeta").await;

    match result {
        Err(ExtensionError::DependencyInstall(DependencyInstallError::NonZeroExit {
            code,
            stderr,
        })) => {
            assert_eq!(code, Some(1));
            assert!(stderr.contains("No matching distribution"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(h.manager.configured().await, vec![beta.canonical()]);
    assert!(h.manager.list_loaded().unwrap().is_empty());
}

#[tokio::test]
async fn test_update_all_isolates_failures() {
    let h = ready_harness(Options::default()).await;
    let url = h.serve_archive("fourjr", "plugins", "master", &["alpha", "depsbeta", "gamma"]);
    let beta = PluginRef::new("fourjr", "plugins", "depsbeta", None);
    let gamma = PluginRef::new("fourjr", "plugins", "gamma", None);

    for name in ["alpha", "depsbeta", "gamma"] {
        h.manager
            .install(&format!("fourjr/plugins/{}", name))
            .await
            .unwrap();
    }
    h.runner.fail_for("depsbeta");

    let reports = h.manager.update_all().await.unwrap();

    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].plugin, alpha().canonical());
    assert_eq!(reports[0].result.as_ref().unwrap(), &alpha());
    assert_eq!(reports[1].plugin, beta.canonical());
    assert!(matches!(
        reports[1].result,
        Err(ExtensionError::DependencyInstall(_))
    ));
    assert_eq!(reports[2].result.as_ref().unwrap(), &gamma);

    assert_eq!(h.manager.list_loaded().unwrap(), vec![alpha(), gamma]);
    assert!(!h.loader.is_active(&beta.extension_id()));
    assert_eq!(h.manager.configured().await.len(), 3);
    assert_eq!(h.http.calls(&url), 6);
}

#[tokio::test]
async fn test_update_reloads_plugin() {
    let h = ready_harness(Options::default()).await;
    let url = h.serve_archive("fourjr", "plugins", "master", &["alpha"]);
    h.manager.install("fourjr/plugins/alpha").await.unwrap();

    let updated = h.manager.update("fourjr/plugins/alpha").await.unwrap();

    assert_eq!(updated, alpha());
    assert_eq!(h.http.calls(&url), 2);
    assert_eq!(
        h.loader.calls(),
        vec![
            LoaderCall::Load(alpha().extension_id()),
            LoaderCall::Unload(alpha().extension_id()),
            LoaderCall::Load(alpha().extension_id()),
        ]
    );
    assert_eq!(h.manager.list_loaded().unwrap(), vec![alpha()]);
}

#[tokio::test]
async fn test_update_requires_install() {
    let h = ready_harness(Options::default()).await;

    let result = h.manager.update("fourjr/plugins/alpha").await;

    assert!(matches!(
        result,
        Err(ExtensionError::State(StateError::NotInstalled(_)))
    ));
    assert_eq!(h.http.archive_calls(), 0);
}

#[tokio::test]
async fn test_operations_wait_for_startup() {
    let h = harness(Options::default()).await;
    h.serve_archive("fourjr", "plugins", "master", &["alpha"]);

    assert!(!h.manager.is_ready());
    assert!(h.manager.list_loaded().unwrap_err().is_still_loading());
    assert!(h
        .manager
        .install("fourjr/plugins/alpha")
        .await
        .unwrap_err()
        .is_still_loading());
    assert!(h.manager.update_all().await.unwrap_err().is_still_loading());

    h.manager.startup().await.unwrap();

    assert!(h.manager.is_ready());
    assert!(h.manager.list_loaded().unwrap().is_empty());
}

#[tokio::test]
async fn test_startup_migrates_legacy_names() {
    let h = harness(Options {
        stored: vec![
            "fourjr/plugins/alpha".to_string(),
            "not a plugin".to_string(),
            "fourjr/plugins/alpha@master".to_string(),
        ],
        ..Options::default()
    })
    .await;
    h.serve_archive("fourjr", "plugins", "master", &["alpha"]);

    let report = h.manager.startup().await.unwrap();

    assert_eq!(
        report.migrated,
        vec![(
            "fourjr/plugins/alpha".to_string(),
            "fourjr/plugins/alpha@master".to_string()
        )]
    );
    assert_eq!(report.dropped, vec!["not a plugin".to_string()]);
    assert_eq!(report.loaded, vec![alpha()]);
    assert_eq!(h.manager.configured().await, vec!["fourjr/plugins/alpha@master"]);
    assert_eq!(h.store.snapshot().await, vec!["fourjr/plugins/alpha@master"]);
}

#[tokio::test]
async fn test_startup_continues_past_failures() {
    let h = harness(Options {
        stored: vec![
            "fourjr/plugins/alpha@master".to_string(),
            "gone/repo/lost@master".to_string(),
        ],
        ..Options::default()
    })
    .await;
    h.serve_archive("fourjr", "plugins", "master", &["alpha"]);

    let report = h.manager.startup().await.unwrap();

    assert_eq!(report.loaded, vec![alpha()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0.canonical(), "gone/repo/lost@master");
    assert!(h.manager.is_ready());
    assert_eq!(h.manager.configured().await.len(), 2);
}

#[tokio::test]
async fn test_startup_reuses_installed_files() {
    let h = harness(Options {
        stored: vec!["fourjr/plugins/alpha@master".to_string()],
        ..Options::default()
    })
    .await;
    let url = h.serve_archive("fourjr", "plugins", "master", &["alpha"]);
    let dir = h.install_dir(&alpha());
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("alpha.so"), "local build").unwrap();

    h.manager.startup().await.unwrap();

    assert_eq!(h.http.calls(&url), 0);
    assert_eq!(std::fs::read_to_string(dir.join("alpha.so")).unwrap(), "local build");
    assert_eq!(h.manager.list_loaded().unwrap(), vec![alpha()]);
}

#[tokio::test]
async fn test_loading_disabled() {
    let h = harness(Options {
        loading_enabled: false,
        stored: vec!["fourjr/plugins/beta@master".to_string()],
        ..Options::default()
    })
    .await;
    h.serve_archive("fourjr", "plugins", "master", &["alpha", "beta"]);

    let report = h.manager.startup().await.unwrap();
    assert!(report.loaded.is_empty());
    assert!(h.manager.is_ready());

    let outcome = h.manager.install("fourjr/plugins/alpha").await.unwrap();

    assert_eq!(outcome, InstallOutcome::InstalledNotLoaded(alpha()));
    assert!(h.install_dir(&alpha()).join("alpha.so").exists());
    assert_eq!(h.manager.configured().await.len(), 2);
    assert!(h.loader.calls().is_empty());
    assert!(matches!(
        h.manager.list_loaded(),
        Err(ExtensionError::State(StateError::LoadingDisabled))
    ));
}

#[tokio::test]
async fn test_registry_listing_statuses() {
    let h = ready_harness(with_registry()).await;
    h.serve_archive("fourjr", "plugins", "master", &["alpha"]);
    h.manager.install("alpha").await.unwrap();

    let listing = h.manager.registry_listing().await.unwrap();

    let names: Vec<&str> = listing.iter().map(|l| l.entry.short_name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "future", "tagged"]);
    assert_eq!(listing[0].status, RegistryStatus::Loaded);
    assert_eq!(listing[1].status, RegistryStatus::RequiresVersion("9.0".to_string()));
    assert_eq!(listing[2].status, RegistryStatus::Installable);
}

#[tokio::test]
async fn test_registry_entry_suggests_close_names() {
    let h = ready_harness(with_registry()).await;

    let result = h.manager.registry_entry("alpah").await;

    match result {
        Err(ExtensionError::Resolution(ResolutionError::NotFound { name, suggestions })) => {
            assert_eq!(name, "alpah");
            assert_eq!(suggestions.first().map(String::as_str), Some("alpha"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_registry_listing_survives_refresh_failure() {
    let h = ready_harness(with_registry()).await;
    h.http.take_down(common::REGISTRY_URL);

    let listing = h.manager.registry_listing().await.unwrap();

    assert_eq!(listing.len(), 3);
}
