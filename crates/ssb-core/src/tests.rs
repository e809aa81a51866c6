use super::*;
use std::cmp::Ordering;
use std::path::PathBuf;

use anyhow::anyhow;

fn sample_app() -> AppInstance {
    AppInstance {
        id: "com.example.mail".to_string(),
        name: "Mail".to_string(),
        bundle_path: PathBuf::from("/Applications/Mail.app"),
        data_dir: PathBuf::from("/Users/test/Library/Application Support/SSB/Apps/com.example.mail"),
        version: RuntimeVersion::new("2.1.0"),
        engine: EngineType::internal("com.brave.Browser"),
        build_stamp: Some("100".to_string()),
        update_ignore_versions: Vec::new(),
        engine_source: None,
    }
}

#[test]
fn compare_pads_missing_components_with_zero() {
    assert_eq!(compare_versions("1.2", "1.2.0"), Ordering::Equal);
    assert_eq!(compare_versions("1.2", "1.2.1"), Ordering::Less);
    assert_eq!(compare_versions("1.10.0", "1.9.9"), Ordering::Greater);
}

#[test]
fn compare_coerces_non_numeric_components_to_zero() {
    assert_eq!(compare_versions("2.3.0b9", "2.3.0"), Ordering::Equal);
    assert_eq!(compare_versions("2.3.1b2", "2.3.0"), Ordering::Equal);
    assert_eq!(compare_versions("abc", "0"), Ordering::Equal);
    assert_eq!(compare_versions("", "0.0.0"), Ordering::Equal);
}

#[test]
fn release_classification_rejects_suffixes() {
    assert!(RuntimeVersion::new("2.3.0").is_release());
    assert!(RuntimeVersion::new("10").is_release());
    assert!(!RuntimeVersion::new("2.3.0b1").is_release());
    assert!(!RuntimeVersion::new("2.3.").is_release());
    assert!(!RuntimeVersion::new("").is_release());
}

#[test]
fn sentinel_version_is_detected() {
    assert!(RuntimeVersion::sentinel().is_sentinel());
    assert!(RuntimeVersion::new("0").is_sentinel());
    assert!(!RuntimeVersion::new("0.0.1").is_sentinel());
    assert_eq!(RuntimeVersion::new("3.1.4").major(), 3);
}

#[test]
fn engine_type_parses_and_displays() {
    let engine = EngineType::parse("external|com.google.Chrome").expect("must parse");
    assert_eq!(engine.kind, EngineKind::External);
    assert_eq!(engine.bundle_id, "com.google.Chrome");
    assert_eq!(engine.to_string(), "external|com.google.Chrome");

    assert!(EngineType::parse("com.google.Chrome").is_err());
    assert!(EngineType::parse("bundled|com.google.Chrome").is_err());
    assert!(EngineType::parse("internal|").is_err());
}

#[test]
fn engine_family_rule_splits_google_from_other_engines() {
    let chrome = EngineType::external("com.google.Chrome");
    let canary = EngineType::external("com.google.Chrome.canary");
    let brave = EngineType::internal("com.brave.Browser");
    let edge = EngineType::external("com.microsoft.edgemac");

    assert!(chrome.is_google_family());
    assert!(chrome.is_compatible_with(&canary));
    assert!(brave.is_compatible_with(&edge));
    assert!(!chrome.is_compatible_with(&brave));
}

#[test]
fn engine_identity_fields_round_trip_with_icons() {
    let identity = EngineIdentity {
        bundle_id: "com.brave.Browser".to_string(),
        executable: "Brave Browser".to_string(),
        version: "1.60.0".to_string(),
        display_name: "Brave".to_string(),
        icon_files: vec!["app.icns".to_string(), "document.icns".to_string()],
    };
    let fields = identity.to_fields();
    assert_eq!(fields.len(), 6);
    assert_eq!(EngineIdentity::from_fields(&fields).expect("must parse"), identity);
    assert!(EngineIdentity::from_fields(&fields[..3]).is_err());
}

#[test]
fn prune_ignore_list_drops_versions_at_or_below_current() {
    let mut app = sample_app();
    app.update_ignore_versions = vec![
        "2.0.0".to_string(),
        "2.1".to_string(),
        "2.2.0".to_string(),
    ];
    let pruned = app.prune_ignore_list();
    assert_eq!(pruned, vec!["2.0.0", "2.1"]);
    assert_eq!(app.update_ignore_versions, vec!["2.2.0"]);

    app.ignore_update("2.2");
    assert_eq!(app.update_ignore_versions.len(), 1);
}

#[test]
fn conditions_for_first_launch_mark_app_new() {
    let conditions = LaunchConditions::derive(None, &sample_app());
    assert!(conditions.is_new);
    assert!(conditions.any());
}

#[test]
fn conditions_detect_update_edit_and_engine_change() {
    let app = sample_app();
    let history = LaunchHistory {
        last_version: Some("2.0.5".to_string()),
        last_engine: Some(EngineType::external("com.google.Chrome")),
        last_build_stamp: Some("99".to_string()),
    };
    let conditions = LaunchConditions::derive(Some(&history), &app);
    assert!(!conditions.is_new);
    assert_eq!(conditions.updated_from.as_deref(), Some("2.0.5"));
    assert!(conditions.edited);
    assert_eq!(
        conditions.engine_changed_from,
        Some(EngineType::external("com.google.Chrome"))
    );
}

#[test]
fn conditions_are_quiet_for_unchanged_app() {
    let app = sample_app();
    let history = LaunchHistory {
        last_version: Some("2.1".to_string()),
        last_engine: Some(app.engine.clone()),
        last_build_stamp: app.build_stamp.clone(),
    };
    assert!(!LaunchConditions::derive(Some(&history), &app).any());
}

#[test]
fn welcome_query_always_carries_version_and_engine() {
    let app = sample_app();
    let notice = WelcomeNotice::new(&app, &LaunchConditions::default());
    assert_eq!(notice.query_string(), "v=2.1.0&e=internal%7Ccom.brave.Browser");
}

#[test]
fn welcome_query_appends_fired_conditions_in_order() {
    let app = sample_app();
    let conditions = LaunchConditions {
        is_new: false,
        updated_from: Some("2.0.0".to_string()),
        edited: true,
        engine_changed_from: Some(EngineType::external("com.google.Chrome")),
        reset: true,
    };
    let mut notice = WelcomeNotice::new(&app, &conditions);
    notice.reset = Some(ResetReason::EngineFamilyChange);
    notice.extensions = vec![
        WelcomeExtension {
            icon: "abc".to_string(),
            name: "Ad Blocker".to_string(),
        },
        WelcomeExtension {
            icon: "def".to_string(),
            name: "Notes".to_string(),
        },
    ];
    notice.bookmarks = BookmarkStatus::Added;
    notice.extensions_lost = true;
    notice.abnormal_exit = true;

    assert_eq!(
        notice.query_string(),
        "v=2.1.0&e=internal%7Ccom.brave.Browser&ov=2.0.0&ed=1&oe=external%7Ccom.google.Chrome\
&r=1&rt=0&xi=1&x=abc%2CAd+Blocker&x=def%2CNotes&b=2&m=1&fa=1"
    );
}

#[test]
fn welcome_url_is_a_file_url_with_query() {
    let notice = WelcomeNotice::new(&sample_app(), &LaunchConditions::default());
    let url = notice
        .to_url(std::path::Path::new("/tmp/ssb/Welcome/welcome.html"))
        .expect("absolute path must convert");
    assert_eq!(url.scheme(), "file");
    assert_eq!(url.path(), "/tmp/ssb/Welcome/welcome.html");
    assert_eq!(url.query(), Some("v=2.1.0&e=internal%7Ccom.brave.Browser"));

    assert!(notice.to_url(std::path::Path::new("relative/page.html")).is_err());
}

#[test]
fn run_status_short_circuits_after_first_failure() {
    let mut status = RunStatus::new();
    let first = status.run("first", || Ok(1));
    assert_eq!(first, Some(1));

    let failed: Option<()> = status.run("second", || Err(anyhow!("disk full")));
    assert!(failed.is_none());

    let mut ran = false;
    let skipped = status.run("third", || {
        ran = true;
        Ok(())
    });
    assert!(skipped.is_none());
    assert!(!ran, "run must not execute after a failure");
    assert_eq!(status.message().as_deref(), Some("disk full"));
}

#[test]
fn run_status_always_merges_cleanup_failures() {
    let mut status = RunStatus::new();
    let _: Option<()> = status.run("activate", || Err(anyhow!("rename failed")));
    let _: Option<()> = status.always("cleanup", || Err(anyhow!("remove failed")));
    let _ = status.always("ok cleanup", || Ok(()));

    assert_eq!(status.failure_count(), 2);
    assert_eq!(status.contexts(), vec!["activate", "cleanup"]);
    assert_eq!(
        status.message().as_deref(),
        Some("rename failed; remove failed")
    );
    assert!(!status.has_fatal());
    let err = status.into_result().expect_err("must fail");
    assert!(!is_fatal(&err));
}

#[test]
fn run_status_escalates_when_any_failure_is_fatal() {
    let mut status = RunStatus::new();
    let _: Option<()> = status.always("bookmarks", || Err(anyhow!("bookmarks unreadable")));
    let _: Option<()> = status.always("payload", || {
        Err(LifecycleError::PayloadCorrupt {
            reason: "stray file".to_string(),
        }
        .into())
    });
    assert!(status.has_fatal());
    let err = status.into_result().expect_err("must fail");
    assert!(is_fatal(&err));
    assert!(err.to_string().contains("bookmarks unreadable"));
}

#[test]
fn timeouts_are_not_fatal_on_their_own() {
    let err: anyhow::Error = LifecycleError::Timeout {
        what: "payload removal".to_string(),
        waited_ms: 10,
    }
    .into();
    assert!(!is_fatal(&err));

    let wrapped = anyhow::Error::from(LifecycleError::unsafe_path("/", "outside data root"))
        .context("profile migration aborted");
    assert!(is_fatal(&wrapped));

    let as_context = anyhow!("rename failed").context(LifecycleError::fatal("slot lost"));
    assert!(is_fatal(&as_context));
}

#[test]
fn dialog_response_maps_to_button_label() {
    let dialog = Dialog::new("Update", "A new version is available", &["Update", "Later"]);
    assert_eq!(DialogResponse::Button(1).label(&dialog), Some("Later"));
    assert_eq!(DialogResponse::Button(7).label(&dialog), None);
    assert_eq!(DialogResponse::Cancelled.label(&dialog), None);
}
