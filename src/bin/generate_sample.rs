use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Bruker-style state file with subject and session tags.
fn state_file(subject: &str, session: &str) -> String {
    format!(
        "##TITLE=Parameter List, ParaVision 6.0.1\n\
         ##$SUBJECT_id=( 60 )\n\
         <{subject}>\n\
         ##$SUBJECT_study_name=( 64 )\n\
         <{session}>\n\
         ##END=\n"
    )
}

fn scan_program(scans: &[(u32, &str)]) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<scanProgram>\n");
    for (number, name) in scans {
        out.push_str(&format!("  <displayName>{name} (E{number})</displayName>\n"));
    }
    out.push_str("</scanProgram>\n");
    out
}

fn acqp(name: &str, number: u32) -> String {
    format!("##TITLE=Parameter List\n##$ACQ_scan_name=( 64 )\n<{name} (E{number})>\n##END=\n")
}

/// Measurement with a scan index.
fn indexed(root: &Path, dir: &str, subject: &str, session: &str, scans: &[(u32, &str)]) -> io::Result<()> {
    let path = root.join(dir);
    fs::create_dir_all(&path)?;
    fs::write(path.join("subject"), state_file(subject, session))?;
    fs::write(path.join("ScanProgram.scanProgram"), scan_program(scans))?;
    for (number, _) in scans {
        fs::create_dir_all(path.join(number.to_string()))?;
    }
    Ok(())
}

/// Measurement without an index, one metadata file per scan directory.
fn walked(root: &Path, dir: &str, subject: &str, session: &str, scans: &[(u32, &str)]) -> io::Result<()> {
    let path = root.join(dir);
    fs::create_dir_all(&path)?;
    fs::write(path.join("subject"), state_file(subject, session))?;
    for (number, name) in scans {
        let scan_dir = path.join(number.to_string());
        fs::create_dir_all(&scan_dir)?;
        fs::write(scan_dir.join("acqp"), acqp(name, *number))?;
    }
    Ok(())
}

fn main() -> io::Result<()> {
    let root = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_raw"));

    let functional: &[(u32, &str)] = &[
        (1, "1_Localizer"),
        (3, "T2_TurboRARE_acq-TurboRARElowcov"),
        (5, "EPI_CBV_task-CogB_acq-EPI"),
        (6, "EPI_CBV_task-CogB2m_acq-EPI"),
        (7, "EPI_CBV_task-JogB_acq-EPI"),
    ];

    indexed(&root, "20170425_141220_4011_1_1", "4011", "ofMaF", functional)?;
    indexed(&root, "20170511_105127_5706_1_2", "5706", "ofMpF", functional)?;
    walked(
        &root,
        "20170603_093012_5704_1_1",
        "5704",
        "ofM",
        &[(2, "FLASH_anatomical"), (4, "EPI_BOLD_stim-CogB_run-1"), (8, "EPI_BOLD_stim-CogB_run-2")],
    )?;
    indexed(&root, "20170610_120000_5705_1_1_failed", "5705", "ofM", functional)?;
    fs::create_dir_all(root.join("notes"))?;

    println!("Wrote sample raw dataset to {}", root.display());
    Ok(())
}
