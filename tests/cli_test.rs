use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*; // Assertions on command output
use std::process::Command; // Run programs
use tempfile;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

const PHRASE: &str = "The quality of mercy is not strained.
It droppeth as the gentle rain from heaven upon the place beneath.
It is twice blest: it blesseth him that gives and him that takes.
The quality of mercy is not strained.
It droppeth as the gentle rain from heaven upon the place beneath.
";

#[test]
fn huffman_round_trip() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = temp_dir.path().join("asset.txt");
    let huf_path = temp_dir.path().join("asset.huf");
    let out_path = temp_dir.path().join("asset.out");
    std::fs::write(&in_path,PHRASE)?;
    let mut cmd = Command::cargo_bin("lz4pack")?;
    cmd.arg("compress")
        .arg("-m").arg("huffman")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&huf_path)
        .assert()
        .success();
    let mut cmd = Command::cargo_bin("lz4pack")?;
    cmd.arg("expand")
        .arg("-m").arg("huffman")
        .arg("-i").arg(&huf_path)
        .arg("-o").arg(&out_path)
        .assert()
        .success();
    assert_eq!(std::fs::read(&in_path)?,std::fs::read(&out_path)?);
    assert!(std::fs::metadata(&huf_path)?.len() < std::fs::metadata(&in_path)?.len());
    Ok(())
}

#[test]
fn lz4_emits_a_conformant_frame() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = temp_dir.path().join("asset.txt");
    let lz4_path = temp_dir.path().join("asset.lz4");
    std::fs::write(&in_path,PHRASE)?;
    let mut cmd = Command::cargo_bin("lz4pack")?;
    cmd.arg("compress")
        .arg("-m").arg("lz4")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&lz4_path)
        .assert()
        .success();
    let compressed = std::fs::read(&lz4_path)?;
    assert_eq!(compressed[0..7],hex::decode("04224D184070DF").unwrap()[..]);
    assert_eq!(compressed[compressed.len() - 4..],[0,0,0,0]);
    assert!(compressed.len() < PHRASE.len());
    Ok(())
}

#[test]
fn lz4_legacy_frame() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = temp_dir.path().join("asset.txt");
    let lz4_path = temp_dir.path().join("asset.lz4");
    std::fs::write(&in_path,PHRASE)?;
    let mut cmd = Command::cargo_bin("lz4pack")?;
    cmd.arg("compress")
        .arg("-m").arg("lz4")
        .arg("-l").arg("6")
        .arg("--legacy")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&lz4_path)
        .assert()
        .success();
    let compressed = std::fs::read(&lz4_path)?;
    assert_eq!(compressed[0..4],hex::decode("02214C18").unwrap()[..]);
    Ok(())
}

#[test]
fn lz4_expansion_is_not_supported() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = temp_dir.path().join("asset.lz4");
    let out_path = temp_dir.path().join("asset.out");
    std::fs::write(&in_path,[0x04,0x22,0x4d,0x18])?;
    let mut cmd = Command::cargo_bin("lz4pack")?;
    cmd.arg("expand")
        .arg("-m").arg("lz4")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not supported"));
    Ok(())
}
