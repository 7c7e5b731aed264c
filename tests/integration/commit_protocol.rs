//! Commit barrier, dry-run and failure semantics.

use super::test_utils::*;
use lamina::error::PublishError;
use lamina::params::{SyncParameters, VirtualCatalogAction};
use std::fs;

#[test]
fn test_dry_run_commit_no_mutations_no_manifest() {
    let params = SyncParameters {
        dry_run: true,
        ..Default::default()
    };
    let mut fixture = Fixture::new(params, false);

    fs::write(fixture.scratch.join("new.txt"), b"data").unwrap();
    fs::write(fixture.rdonly.join("old.txt"), b"stale").unwrap();

    let added = fixture.item("", "new.txt");
    let removed = fixture.item("", "old.txt");
    fixture.mediator.add(added).unwrap();
    fixture.mediator.remove(removed).unwrap();

    let counters = fixture.mediator.counters();
    let manifest = fixture.mediator.commit().unwrap();

    assert!(manifest.is_none());
    assert!(fixture.catalog.ops().is_empty());
    assert!(fixture.spooler.processed().is_empty());

    // Changes are still counted and reported in a dry run.
    let snap = counters.snapshot();
    assert_eq!(snap.n_files_added, 1);
    assert_eq!(snap.n_files_removed, 1);
}

#[test]
fn test_commit_fails_on_accumulated_upload_errors() {
    let mut fixture = Fixture::new(SyncParameters::default(), false);

    fs::write(fixture.scratch.join("f.txt"), b"data").unwrap();
    let item = fixture.item("", "f.txt");
    fixture.mediator.add(item).unwrap();

    fixture.spooler.set_errors(2);
    let result = fixture.mediator.commit();

    assert!(matches!(
        result,
        Err(PublishError::UploadErrors { count: 2 })
    ));
    // The catalog is not finalized after a failed commit.
    assert!(!fixture
        .catalog
        .ops()
        .iter()
        .any(|op| matches!(op, CatalogOp::PrecalculateListings | CatalogOp::Commit)));
}

#[test]
fn test_commit_finalizes_catalog_in_order() {
    let fixture = Fixture::new(SyncParameters::default(), false);

    let manifest = fixture.mediator.commit().unwrap().unwrap();
    assert_eq!(manifest.revision, 42);

    assert_eq!(
        fixture.catalog.ops(),
        vec![CatalogOp::PrecalculateListings, CatalogOp::Commit]
    );
}

#[test]
fn test_balanceable_catalog_rebalances_and_uploads_marker() {
    let fixture = Fixture::new(SyncParameters::default(), false);
    fixture.catalog.set_balanceable(true);

    fixture.mediator.commit().unwrap().unwrap();

    let ops = fixture.catalog.ops();
    assert_eq!(
        ops,
        vec![
            CatalogOp::Balance,
            CatalogOp::PrecalculateListings,
            CatalogOp::Commit
        ]
    );

    // A zero-byte object is uploaded so the auto catalog markers' content
    // exists in the store.
    let processed = fixture.spooler.processed();
    assert_eq!(processed.len(), 1);
    let name = processed[0].file_name().unwrap().to_string_lossy();
    assert!(name.starts_with("empty"), "unexpected marker name {name}");
}

#[test]
fn test_virtual_catalog_request_uploads_marker_without_balance() {
    let params = SyncParameters {
        virtual_catalog_action: VirtualCatalogAction::Generate,
        ..Default::default()
    };
    let fixture = Fixture::new(params, false);

    fixture.mediator.commit().unwrap().unwrap();

    assert!(!fixture
        .catalog
        .ops()
        .contains(&CatalogOp::Balance));
    assert_eq!(fixture.spooler.processed().len(), 1);
}

#[test]
fn test_marker_upload_failure_fails_commit() {
    let fixture = Fixture::new(SyncParameters::default(), false);
    fixture.catalog.set_balanceable(true);
    // No errors until the marker itself is spooled.
    fixture.spooler.fail_future_uploads();

    let result = fixture.mediator.commit();
    assert!(matches!(result, Err(PublishError::UploadErrors { .. })));
    assert_eq!(fixture.spooler.processed().len(), 1);
    assert!(!fixture.catalog.ops().contains(&CatalogOp::Commit));
}

#[test]
#[should_panic(expected = "spool failure")]
fn test_failed_upload_item_aborts_immediately() {
    let mut fixture = Fixture::new(SyncParameters::default(), false);
    fixture.spooler.fail_items();

    fs::write(fixture.scratch.join("doomed.txt"), b"data").unwrap();
    let item = fixture.item("", "doomed.txt");
    // The synchronous completion carries a nonzero return code and the
    // listener aborts on the spot.
    let _ = fixture.mediator.add(item);
}
