use std::fs;
use std::path::Path;

use anyhow::Result;
use flipmask_core::{
    AckError, ApprovalGate, GateOptions, GateOutcome, IgnoreReason, Rejection,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const TOKEN: &str = "operator-ok";

fn sandbox_with_ack(contents: &str) -> Result<TempDir> {
    let temp = TempDir::new()?;
    fs::write(temp.path().join("acknowledge.txt"), contents)?;
    Ok(temp)
}

fn gate(root: &Path) -> Result<ApprovalGate> {
    Ok(ApprovalGate::new(root, TOKEN, GateOptions::default())?)
}

#[test]
fn wrong_token_blocks_until_fixed_and_marker_retouched() -> Result<()> {
    let temp = sandbox_with_ack("not-the-token\n")?;
    let root = temp.path();
    fs::write(root.join("data.bin"), [0x00, 0xFF, 0x0F])?;
    fs::write(root.join("data.bin.approve"), "mask 0x0F\n")?;
    let gate = gate(root)?;

    let outcome = gate.process(&root.join("data.bin.approve"));
    assert!(matches!(
        outcome,
        GateOutcome::Rejected {
            reason: Rejection::Unacknowledged(AckError::Mismatch { .. }),
            ..
        }
    ));
    assert_eq!(fs::read(root.join("data.bin"))?, vec![0x00, 0xFF, 0x0F]);
    assert!(root.join("data.bin.approve").exists());
    assert!(!root.join("data.bin.bak").exists());

    fs::write(root.join("acknowledge.txt"), format!("  {TOKEN}\n"))?;
    fs::write(root.join("data.bin.approve"), "mask 0x0F\n")?;
    let outcome = gate.process(&root.join("data.bin.approve"));

    assert!(outcome.is_completed());
    assert_eq!(fs::read(root.join("data.bin"))?, vec![0x0F, 0xF0, 0x00]);
    assert_eq!(fs::read(root.join("data.bin.bak"))?, vec![0x00, 0xFF, 0x0F]);
    assert!(!root.join("data.bin.approve").exists());
    Ok(())
}

#[test]
fn revoked_acknowledgement_blocks_later_approvals() -> Result<()> {
    let temp = sandbox_with_ack(TOKEN)?;
    let root = temp.path();
    let gate = gate(root)?;
    fs::write(root.join("a.bin"), [1u8])?;
    fs::write(root.join("b.bin"), [2u8])?;

    fs::write(root.join("a.bin.approve"), "mask 0xFF\n")?;
    assert!(gate.process(&root.join("a.bin.approve")).is_completed());

    fs::remove_file(root.join("acknowledge.txt"))?;
    fs::write(root.join("b.bin.approve"), "mask 0xFF\n")?;
    let outcome = gate.process(&root.join("b.bin.approve"));
    assert!(matches!(
        outcome,
        GateOutcome::Rejected {
            reason: Rejection::Unacknowledged(AckError::Missing { .. }),
            ..
        }
    ));
    assert_eq!(fs::read(root.join("b.bin"))?, vec![2]);
    Ok(())
}

#[test]
fn parent_directory_target_is_rejected_without_mutation() -> Result<()> {
    let outer = TempDir::new()?;
    let root = outer.path().join("sandbox");
    fs::create_dir(&root)?;
    fs::write(root.join("acknowledge.txt"), TOKEN)?;
    fs::write(outer.path().join("outside.bin"), [7u8])?;
    fs::write(root.join("...approve"), "mask 0xFF\n")?;
    let gate = gate(&root)?;

    let outcome = gate.process(&root.join("...approve"));
    assert!(matches!(
        outcome,
        GateOutcome::Rejected {
            reason: Rejection::Sandbox(_),
            ..
        }
    ));
    assert!(root.join("...approve").exists());
    assert_eq!(fs::read(outer.path().join("outside.bin"))?, vec![7]);
    assert!(!outer.path().join("sandbox.bak").exists());
    Ok(())
}

#[cfg(unix)]
#[test]
fn symlink_escape_is_rejected_without_mutation() -> Result<()> {
    let outer = TempDir::new()?;
    let root = outer.path().join("sandbox");
    fs::create_dir(&root)?;
    fs::write(root.join("acknowledge.txt"), TOKEN)?;
    let secret = outer.path().join("secret.bin");
    fs::write(&secret, [1u8, 2, 3])?;
    std::os::unix::fs::symlink(&secret, root.join("link.bin"))?;
    fs::write(root.join("link.bin.approve"), "mask 0xFF\n")?;
    let gate = gate(&root)?;

    let outcome = gate.process(&root.join("link.bin.approve"));
    assert!(matches!(
        outcome,
        GateOutcome::Rejected {
            reason: Rejection::Sandbox(_),
            ..
        }
    ));
    assert_eq!(fs::read(&secret)?, vec![1, 2, 3]);
    assert!(fs::symlink_metadata(root.join("link.bin"))?.file_type().is_symlink());
    assert!(!root.join("link.bin.bak").exists());
    Ok(())
}

#[test]
fn per_marker_and_global_dry_runs_leave_target_alone() -> Result<()> {
    let temp = sandbox_with_ack(TOKEN)?;
    let root = temp.path();
    fs::write(root.join("t.bin"), [5u8, 6])?;

    fs::write(root.join("t.bin.approve"), "bits 0\ndry\n")?;
    let outcome = gate(root)?.process(&root.join("t.bin.approve"));
    let GateOutcome::Completed { report, marker_removed, .. } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert!(report.dry_run);
    assert_eq!(report.changed, 2);
    assert!(marker_removed);
    assert_eq!(fs::read(root.join("t.bin"))?, vec![5, 6]);

    let global = ApprovalGate::new(
        root,
        TOKEN,
        GateOptions {
            global_dry_run: true,
            ..GateOptions::default()
        },
    )?;
    fs::write(root.join("t.bin.approve"), "mask 0xFF\n")?;
    let outcome = global.process(&root.join("t.bin.approve"));
    assert!(outcome.is_completed());
    assert_eq!(fs::read(root.join("t.bin"))?, vec![5, 6]);
    assert!(!root.join("t.bin.bak").exists());
    Ok(())
}

#[test]
fn unparsable_marker_is_left_for_the_operator() -> Result<()> {
    let temp = sandbox_with_ack(TOKEN)?;
    let root = temp.path();
    fs::write(root.join("t.bin"), [5u8])?;
    fs::write(root.join("t.bin.approve"), "bits 0,9\n")?;

    let outcome = gate(root)?.process(&root.join("t.bin.approve"));
    assert!(matches!(
        outcome,
        GateOutcome::Rejected {
            reason: Rejection::InvalidApproval(_),
            ..
        }
    ));
    assert!(root.join("t.bin.approve").exists());
    assert_eq!(fs::read(root.join("t.bin"))?, vec![5]);
    Ok(())
}

#[test]
fn engine_failure_keeps_marker() -> Result<()> {
    let temp = sandbox_with_ack(TOKEN)?;
    let root = temp.path();
    fs::create_dir(root.join("folder"))?;
    fs::write(root.join("folder.approve"), "mask 1\n")?;

    let outcome = gate(root)?.process(&root.join("folder.approve"));
    let GateOutcome::Failed { error, .. } = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert_eq!(error.exit_code(), 3);
    assert!(root.join("folder.approve").exists());
    assert!(root.join("folder").is_dir());
    Ok(())
}

#[test]
fn missing_target_is_rejected() -> Result<()> {
    let temp = sandbox_with_ack(TOKEN)?;
    let root = temp.path();
    fs::write(root.join("ghost.bin.approve"), "mask 1\n")?;

    let outcome = gate(root)?.process(&root.join("ghost.bin.approve"));
    assert!(matches!(
        outcome,
        GateOutcome::Rejected {
            reason: Rejection::Sandbox(_),
            ..
        }
    ));
    assert!(root.join("ghost.bin.approve").exists());
    Ok(())
}

#[test]
fn non_marker_files_are_ignored() -> Result<()> {
    let temp = sandbox_with_ack(TOKEN)?;
    let root = temp.path();
    fs::write(root.join("notes.txt"), "mask 1\n")?;
    let outcome = gate(root)?.process(&root.join("notes.txt"));
    assert!(matches!(
        outcome,
        GateOutcome::Ignored {
            reason: IgnoreReason::NotAMarker,
            ..
        }
    ));
    Ok(())
}

#[test]
fn custom_suffix_and_ack_file_are_honoured() -> Result<()> {
    let temp = TempDir::new()?;
    let root = temp.path();
    fs::write(root.join("ok.txt"), "tok")?;
    fs::write(root.join("t.bin"), [0u8])?;
    fs::write(root.join("t.bin.go"), "mask 0x80\n")?;

    let gate = ApprovalGate::new(
        root,
        "tok",
        GateOptions {
            ack_file: "ok.txt".to_string(),
            marker_suffix: ".go".to_string(),
            ..GateOptions::default()
        },
    )?;
    assert!(gate.process(&root.join("t.bin.go")).is_completed());
    assert_eq!(fs::read(root.join("t.bin"))?, vec![0x80]);
    Ok(())
}
