//! Synthetic target behaviours for building labelled datasets.
//!
//! Each mode works inside `root` and reports registry and DNS activity as
//! advisory lines on stdout, since neither is observable from outside.

use rand::Rng;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use crate::agents::advisory::{DNS_TAG, REG_SET_TAG};
use crate::features::Label;

const REG_KEY: &str = r"HKCU\Software\TestApp";
const BEACON_DOMAINS: [&str; 3] = ["cdn-updates.example", "telemetry.service", "analytics.host"];

pub fn run(mode: Label, root: &Path) -> io::Result<()> {
    fs::create_dir_all(root)?;
    match mode {
        Label::Benign => benign_installer(root),
        Label::Wiper => wiper(root),
        Label::Ransom => ransomware(root),
        Label::Beacon => beacon(root),
        Label::Persist => persistence(root),
    }
}

/// Recursive watchers pick up a new directory asynchronously; give them a
/// moment before writing into it.
fn make_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)?;
    sleep(Duration::from_millis(100));
    Ok(())
}

fn advise(tag: &str, text: &str) -> io::Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out, "{tag} {text}")?;
    // The collector reads line by line; don't let a block buffer hide it.
    out.flush()
}

fn reg_set(name: &str, value: &str) -> io::Result<()> {
    advise(REG_SET_TAG, &format!("{REG_KEY}\\{name}={value}"))
}

fn benign_installer(root: &Path) -> io::Result<()> {
    let dir = root.join("benign_installer");
    make_dir(&dir)?;
    for i in 0..5 {
        fs::write(dir.join(format!("file_{i}.txt")), "installer data")?;
        sleep(Duration::from_millis(200));
    }
    reg_set("InstallPath", &dir.to_string_lossy())?;
    sleep(Duration::from_millis(500));
    for i in 0..2 {
        fs::write(dir.join(format!("file_{i}.txt")), "updated")?;
        sleep(Duration::from_millis(200));
    }
    Ok(())
}

fn wiper(root: &Path) -> io::Result<()> {
    let dir = root.join("wiper");
    make_dir(&dir)?;
    let mut files = Vec::with_capacity(10);
    for i in 0..10 {
        let path = dir.join(format!("a_{i}.log"));
        fs::write(&path, "temp")?;
        files.push(path);
    }
    sleep(Duration::from_secs(1));
    for path in &files {
        let _ = fs::remove_file(path);
    }
    let _ = fs::remove_dir_all(&dir);
    Ok(())
}

fn ransomware(root: &Path) -> io::Result<()> {
    let dir = root.join("ransom");
    make_dir(&dir)?;
    for i in 0..20 {
        fs::write(dir.join(format!("doc_{i}.txt")), "important data")?;
    }
    sleep(Duration::from_millis(500));

    let mut rng = rand::thread_rng();
    let mut docs: Vec<_> = fs::read_dir(&dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    docs.sort();

    for doc in docs {
        let junk: String = (0..200)
            .map(|_| {
                let idx = rng.gen_range(0..52u8);
                if idx < 26 { (b'a' + idx) as char } else { (b'A' + idx - 26) as char }
            })
            .collect();
        let mut encrypted = doc.clone().into_os_string();
        encrypted.push(".enc");
        fs::write(&encrypted, junk)?;
        fs::remove_file(&doc)?;
        sleep(Duration::from_millis(50));
    }
    Ok(())
}

fn beacon(root: &Path) -> io::Result<()> {
    for domain in BEACON_DOMAINS {
        advise(DNS_TAG, domain)?;
        sleep(Duration::from_millis(400));
    }
    let dir = root.join("beacon");
    make_dir(&dir)?;
    fs::write(dir.join("stage.bin"), "stub")
}

fn persistence(root: &Path) -> io::Result<()> {
    let dir = root.join("persist");
    make_dir(&dir)?;
    reg_set("Run", &dir.join("agent.exe").to_string_lossy())
}
