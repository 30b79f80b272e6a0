use aemet_harvester::resume::{ErrorJournal, JournalEntry};
use tempfile::TempDir;

#[test]
fn journal_survives_reopening() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("error_journal").join("errors.json");

    ErrorJournal::new(&path)
        .append(JournalEntry::new("3195", Some("https://x/datos/1".to_string()), "HTTP 500"))
        .unwrap();
    ErrorJournal::new(&path)
        .append(JournalEntry::new("28079", Some("https://x/datos/2".to_string()), "timeout"))
        .unwrap();

    let entries = ErrorJournal::new(&path).entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].unit_id, "3195");
    assert!(!entries[1].recorded_at.is_empty());
}

#[test]
fn duplicate_urls_are_replayed_once() {
    let dir = TempDir::new().unwrap();
    let journal = ErrorJournal::new(dir.path().join("errors.json"));
    for _ in 0..3 {
        journal
            .append(JournalEntry::new("3195", Some("https://x/datos/1".to_string()), "HTTP 500"))
            .unwrap();
    }
    journal
        .append(JournalEntry::new("3196", None, "no url anywhere"))
        .unwrap();

    assert_eq!(journal.len().unwrap(), 4);
    assert_eq!(journal.list_failed_urls().unwrap(), vec!["https://x/datos/1".to_string()]);
}
