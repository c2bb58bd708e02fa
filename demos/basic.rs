//! Basic usage example for zip-append

use std::fs::{File, OpenOptions};
use zip_append::{ZipAppender, ZipScanner};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== zip-append Basic Example ===\n");

    // Create a new archive by appending to an empty file
    println!("Creating log.zip...");
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open("log.zip")?;
    let mut appender = ZipAppender::new(file)?;
    appender.append("start.json", br#"{"version": 1}"#)?;
    appender.append("samples/1.json", br#"{"id": 1, "score": 0.75}"#)?;
    appender.close()?;
    println!("✓ Created log.zip\n");

    // Re-open and grow it without rewriting what is already there
    println!("Appending samples/2.json...");
    let file = OpenOptions::new().read(true).write(true).open("log.zip")?;
    let mut appender = ZipAppender::new(file)?;
    println!("  {} entries already present", appender.entry_count());
    appender.append("samples/2.json", br#"{"id": 2, "score": 0.5}"#)?;
    appender.close()?;
    println!("✓ Appended\n");

    // Read everything back
    println!("Reading log.zip...");
    let mut scanner = ZipScanner::new(File::open("log.zip")?)?;
    for name in scanner.list() {
        println!("  - {}", name);
    }
    let data = scanner.read("samples/2.json")?;
    println!("  samples/2.json: {}", String::from_utf8_lossy(&data));

    println!("✓ All done!");
    Ok(())
}
