//! Whole-generation tests driven through the library API.
//!
//! Repositories are plain directories; the version-control collaborator
//! copies them instead of cloning, so these run without git.

mod common;

use std::fs;

use common::prelude::*;
use kit_merge::config::GenerationConfig;
use kit_merge::error::Error;
use kit_merge::filesystem::LocalFileSync;
use kit_merge::generation::{Generation, GenerationOptions, GenerationSummary};
use kit_merge::phases::Collaborators;
use kit_merge::phases::KitState;
use kit_merge::settings::Settings;

fn settings(fixture: &TestFixture) -> Settings {
    Settings {
        source_dir: fixture.path().join("work/src"),
        destination_dir: fixture.path().join("work/dest"),
        cache_dir: fixture.path().join("work/edb"),
        ..Settings::default()
    }
}

fn generate(fixture: &TestFixture, vcs: &LocalVcs) -> kit_merge::error::Result<GenerationSummary> {
    let config = GenerationConfig::load(&fixture.config_path())?;
    let settings = settings(fixture);
    let collab = Collaborators {
        vcs,
        files: &LocalFileSync,
        cache: &NoCache,
    };
    Generation::new(&config, &settings, collab, GenerationOptions::default()).run()
}

fn read(fixture: &TestFixture, kit: &str, rel: &str) -> String {
    fs::read_to_string(fixture.kit_tree(kit).join(rel)).unwrap_or_default()
}

fn scoped_fixture() -> TestFixture {
    let fixture = TestFixture::new().with_definitions(configs::SCOPED);
    fixture.ebuild("upstream", "a/x", &["m1"], "GPL-2");
    fixture.eclass("upstream", "m1", &[], "upstream m1");
    fixture.license("upstream", "GPL-2");
    fixture.ebuild("overlay", "a/x", &[], "");
    fixture.eclass("overlay", "m1", &[], "overlay m1");
    fixture.ebuild("overlay", "a/y", &[], "");
    fixture.ebuild("overlay", "b/z", &[], "");
    fixture
}

#[test]
fn test_earlier_repository_shadows_later() {
    let fixture = scoped_fixture();
    let vcs = LocalVcs::default();
    let summary = generate(&fixture, &vcs).unwrap();

    let kit1 = &summary.kits[0];
    assert_eq!(kit1.kit, "kit1");
    assert_eq!(kit1.state, KitState::Committed);
    let ebuild = read(&fixture, "kit1", "a/x/x-1.0.ebuild");
    assert!(ebuild.contains("remote/upstream"), "got {}", ebuild);
    assert!(read(&fixture, "kit1", "eclass/m1.eclass").contains("upstream m1"));
    assert!(fixture.kit_tree("kit1").join("licenses/GPL-2").is_file());
}

#[test]
fn test_claimed_package_is_skipped_within_scope() {
    let fixture = scoped_fixture();
    let vcs = LocalVcs::default();
    let summary = generate(&fixture, &vcs).unwrap();

    let kit2 = &summary.kits[1];
    assert_eq!(kit2.kit, "kit2");
    let packages: Vec<String> = kit2
        .selection
        .packages()
        .iter()
        .map(|p| p.to_string())
        .collect();
    assert_eq!(packages, vec!["a/y"]);
    assert!(!fixture.kit_tree("kit2").join("a/x").exists());
}

#[test]
fn test_reset_lets_catch_all_reclaim() {
    let fixture = scoped_fixture();
    let vcs = LocalVcs::default();
    let summary = generate(&fixture, &vcs).unwrap();

    let catchall = summary
        .kits
        .iter()
        .find(|k| k.kit == "kit-catchall")
        .unwrap();
    let packages: Vec<String> = catchall
        .selection
        .packages()
        .iter()
        .map(|p| p.to_string())
        .collect();
    assert_eq!(packages, vec!["a/x", "a/y"]);

    assert_eq!(summary.report.scopes.len(), 2);
    assert_eq!(summary.report.scopes[0].kits["kit1"], vec!["a/x"]);
    assert_eq!(summary.report.scopes[1].kits["b-kit"], vec!["b/z"]);
}

#[test]
fn test_commit_message_lists_contributors() {
    let fixture = scoped_fixture();
    let vcs = LocalVcs::default();
    generate(&fixture, &vcs).unwrap();

    let commits = vcs.commits.borrow();
    let (dir, message) = &commits[0];
    assert!(dir.ends_with("kit1"));
    assert!(message.starts_with("updates\n\nmerged:\n\n"));
    assert!(message.contains("  upstream: upstream-master-head\n"));
    assert!(!message.contains("overlay"));
    assert!(message.contains("  kit-fixups: kit-fixups-master-head\n"));
    assert!(vcs.pushes.borrow().is_empty());
}

#[test]
fn test_branch_fixup_overrides_global() {
    let fixture = scoped_fixture();
    let fixups = fixture.remote("kit-fixups");
    fixture.ebuild_at(&fixups.join("b-kit/global"), "b/z", &[], "");
    fixture.ebuild_at(&fixups.join("b-kit/1.0"), "b/z", &[], "");
    fixture.ebuild_at(&fixups.join("b-kit/2.0"), "b/w", &[], "");
    let vcs = LocalVcs::default();
    let summary = generate(&fixture, &vcs).unwrap();

    let ebuild = read(&fixture, "b-kit", "b/z/z-1.0.ebuild");
    assert!(ebuild.contains("b-kit/1.0"), "got {}", ebuild);
    assert!(!fixture.kit_tree("b-kit").join("b/w").exists());

    let b_kit = summary.kits.iter().find(|k| k.kit == "b-kit").unwrap();
    assert_eq!(b_kit.fixups.packages.len(), 1);
    assert_eq!(b_kit.fixups.packages.values().next().unwrap(), "1.0");
    assert_eq!(summary.report.fixups["b/z"], vec!["b-kit"]);
}

#[test]
fn test_fixup_eclass_wins_over_upstream() {
    let fixture = scoped_fixture();
    let shared = fixture.remote("kit-fixups").join("eclass");
    fs::create_dir_all(&shared).unwrap();
    fs::write(shared.join("m1.eclass"), "# fixup m1\n").unwrap();
    let vcs = LocalVcs::default();
    generate(&fixture, &vcs).unwrap();

    let eclass = read(&fixture, "kit1", "eclass/m1.eclass");
    assert!(eclass.contains("fixup m1"), "got {}", eclass);
}

#[test]
fn test_missing_eclass_fails_convergence() {
    let fixture = TestFixture::new().with_definitions(configs::MINIMAL);
    fixture.ebuild("upstream", "a/x", &["ghost"], "");
    let vcs = LocalVcs::default();

    let err = generate(&fixture, &vcs).unwrap_err();
    match err {
        Error::Convergence { kit, missing, .. } => {
            assert_eq!(kit, "a-kit");
            assert_eq!(missing, vec!["ghost"]);
        }
        other => panic!("expected convergence error, got {}", other),
    }
    assert!(vcs.commits.borrow().is_empty());
}

#[test]
fn test_missing_license_is_reported() {
    let fixture = TestFixture::new().with_definitions(configs::MINIMAL);
    fixture.ebuild("upstream", "a/x", &[], "Nope GPL-2");
    fixture.license("upstream", "GPL-2");
    let vcs = LocalVcs::default();

    let err = generate(&fixture, &vcs).unwrap_err();
    match &err {
        Error::UnresolvedLicense { licenses } => {
            let names: Vec<&str> = licenses.iter().map(|l| l.name.as_str()).collect();
            assert_eq!(names, vec!["Nope"]);
            assert_eq!(licenses[0].kit, "a-kit");
        }
        other => panic!("expected unresolved license, got {}", other),
    }
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn test_post_step_honours_earlier_claims() {
    let fixture = TestFixture::new().with_definitions(configs::POST_INSERT);
    fixture.ebuild("upstream", "a/x", &[], "");
    fixture.ebuild("upstream", "b/y", &[], "");
    fixture.ebuild("upstream", "c/z", &[], "");
    let vcs = LocalVcs::default();
    let summary = generate(&fixture, &vcs).unwrap();

    assert!(fixture.kit_tree("kit1").join("a/x").is_dir());
    assert!(!fixture.kit_tree("kit2").join("a/x").exists());
    assert!(fixture.kit_tree("kit2").join("c/z").is_dir());
    assert_eq!(summary.report.scopes[0].kits["kit2"], vec!["b/y", "c/z"]);
}

#[test]
fn test_post_step_package_with_missing_eclass_is_not_committed() {
    let fixture = TestFixture::new().with_definitions(configs::POST_INSERT);
    fixture.ebuild("upstream", "a/x", &[], "");
    fixture.ebuild("upstream", "b/y", &[], "");
    fixture.ebuild("upstream", "c/z", &["ghost"], "NoSuchLicense");
    let vcs = LocalVcs::default();

    let err = generate(&fixture, &vcs).unwrap_err();
    match err {
        Error::Convergence { kit, missing, .. } => {
            assert_eq!(kit, "kit2");
            assert_eq!(missing, vec!["ghost"]);
        }
        other => panic!("expected convergence error, got {}", other),
    }
    let commits = vcs.commits.borrow();
    assert_eq!(commits.len(), 1);
    assert!(commits[0].0.ends_with("kit1"));
}
