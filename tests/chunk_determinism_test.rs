use proptest::prelude::*;
use tabscan::{scan_source, FileFormat, ScanSummary, SourceFile};

fn scan(source: &SourceFile, chunk_size: usize) -> ScanSummary {
    let mut updates = Vec::new();
    scan_source(source, chunk_size, &mut updates).unwrap()
}

fn cell() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("null".to_string()),
        Just(" NaN ".to_string()),
        "[a-c]{1,2}",
        "[0-9]",
    ]
}

fn csv_text(rows: &[Vec<String>]) -> String {
    let mut text = String::from("x,y,z\n");
    for row in rows {
        text.push_str(&row.join(","));
        text.push('\n');
    }
    text
}

fn json_text(rows: &[Vec<String>]) -> String {
    let records: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| serde_json::json!({ "x": row[0], "y": row[1], "z": row[2] }))
        .collect();
    serde_json::to_string(&records).unwrap()
}

proptest! {
    #[test]
    fn chunk_size_never_changes_delimited_results(
        rows in prop::collection::vec(prop::collection::vec(cell(), 3), 1..60),
        a in 1usize..20,
        b in 1usize..20,
    ) {
        let source = SourceFile::new(csv_text(&rows).into_bytes(), FileFormat::Delimited);
        let first = scan(&source, a);
        let second = scan(&source, b);

        prop_assert_eq!(first.null_count, second.null_count);
        prop_assert_eq!(first.total_rows, second.total_rows);
        prop_assert_eq!(first.total_columns, second.total_columns);
        prop_assert_eq!(&first.duplicate_records, &second.duplicate_records);

        prop_assert_eq!(first.total_rows, rows.len() as u64);
        prop_assert!(first.null_count <= first.total_rows);
        for count in first.duplicate_records.values() {
            prop_assert!(*count > 0 && *count <= first.total_rows);
        }
    }

    #[test]
    fn delimited_and_records_agree(
        rows in prop::collection::vec(prop::collection::vec(cell(), 3), 1..40),
        chunk_size in 1usize..10,
    ) {
        let csv = SourceFile::new(csv_text(&rows).into_bytes(), FileFormat::Delimited);
        let json = SourceFile::new(json_text(&rows).into_bytes(), FileFormat::Records);
        let from_csv = scan(&csv, chunk_size);
        let from_json = scan(&json, chunk_size);

        prop_assert_eq!(from_csv.null_count, from_json.null_count);
        prop_assert_eq!(from_csv.total_rows, from_json.total_rows);
        prop_assert_eq!(&from_csv.duplicate_records, &from_json.duplicate_records);
    }
}
