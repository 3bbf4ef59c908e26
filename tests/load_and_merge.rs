use std::fs;
use std::path::{Path, PathBuf};
use student_admissions::config::BehaviorConfig;
use student_admissions::data::datatable::{DataType, DataValue};
use student_admissions::data::datatable_loaders::{
    load_table, LoadError, LoadOptions, LoadOutcome, DATE_ADDED_COLUMN,
};
use student_admissions::filter::parse_rule;
use student_admissions::workspace::{LoadAction, LoadReport, Workspace};
use tempfile::TempDir;

fn settings() -> BehaviorConfig {
    BehaviorConfig {
        archive_on_load: false,
        archive_on_exit: false,
        ..BehaviorConfig::default()
    }
}

fn write(dir: &Path, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn column_type(ws: &Workspace, column: &str) -> DataType {
    ws.base_model()
        .table()
        .get_column(column)
        .map(|c| c.data_type)
        .unwrap()
}

#[test]
fn test_tsv_columns_are_typed() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "intake.tsv",
        "ID\tGPA\tEnrolled\tApplied\tNotes\n\
         1\t3.5\ttrue\t2024-01-15\tlate\n\
         2\t2.9\tfalse\t2024-02-20\t\n\
         3\t\ttrue\t2024-03-01\tSTU-001\n",
    );

    let mut ws = Workspace::new(settings());
    ws.load_file(&path, None, None).unwrap();

    assert_eq!(column_type(&ws, "ID"), DataType::Integer);
    assert_eq!(column_type(&ws, "GPA"), DataType::Float);
    assert_eq!(column_type(&ws, "Enrolled"), DataType::Boolean);
    assert_eq!(column_type(&ws, "Applied"), DataType::DateTime);
    assert_eq!(column_type(&ws, "Notes"), DataType::String);
    assert_eq!(column_type(&ws, DATE_ADDED_COLUMN), DataType::DateTime);

    let table = ws.base_model().table();
    assert_eq!(table.get_value_by_name(2, "GPA"), Some(&DataValue::Null));
    assert_eq!(
        table.get_value_by_name(0, "Applied"),
        Some(&DataValue::DateTime("2024-01-15".to_string()))
    );
}

#[test]
fn test_json_records_and_columns() {
    let dir = TempDir::new().unwrap();
    let records = write(
        dir.path(),
        "records.json",
        r#"[{"Name": "Ada", "Score": 91}, {"Name": "Ben", "Score": 78, "Track": "Arts"}]"#,
    );
    let columns = write(
        dir.path(),
        "columns.json",
        r#"{"Name": {"1": "Ben", "0": "Ada"}, "Score": {"0": 91, "1": 78}}"#,
    );

    let LoadOutcome::Loaded(by_record) = load_table(&records, &LoadOptions::default()).unwrap()
    else {
        panic!("JSON never asks for a sheet");
    };
    assert_eq!(by_record.column_names(), vec!["Name", "Score", "Track"]);
    assert_eq!(by_record.get_value_by_name(0, "Track"), Some(&DataValue::Null));

    let LoadOutcome::Loaded(by_column) = load_table(&columns, &LoadOptions::default()).unwrap()
    else {
        panic!("JSON never asks for a sheet");
    };
    assert_eq!(by_column.row_count(), 2);
    assert_eq!(
        by_column.get_value_by_name(0, "Name"),
        Some(&DataValue::String("Ada".to_string()))
    );
    assert_eq!(by_column.get_value_by_name(1, "Score"), Some(&DataValue::Integer(78)));
}

#[test]
fn test_latin1_file_is_decoded() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "legacy.csv", b"Name,GPA\nJos\xe9,3.2\n");

    let mut ws = Workspace::new(settings());
    ws.load_file(&path, None, None).unwrap();
    assert_eq!(
        ws.base_model().table().get_value_by_name(0, "Name"),
        Some(&DataValue::String("José".to_string()))
    );
}

#[test]
fn test_unsupported_extension() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "notes.txt", "hello");

    let mut ws = Workspace::new(settings());
    let err = ws.load_file(&path, None, None).unwrap_err();
    assert_eq!(
        err.downcast_ref::<LoadError>(),
        Some(&LoadError::UnsupportedFormat {
            extension: "txt".to_string()
        })
    );
    assert!(!ws.has_data());
}

#[test]
fn test_merge_drops_duplicates_and_refreshes_rule_tabs() {
    let dir = TempDir::new().unwrap();
    let first = write(
        dir.path(),
        "january.csv",
        "Name,GPA,Status\nAda,3.6,Active\nBen,2.0,Probation\n",
    );
    let second = write(
        dir.path(),
        "february.csv",
        "Status,Name,GPA\nProbation,Ben,2.0\nActive,Cy,3.9\n",
    );

    let mut ws = Workspace::new(settings());
    ws.load_file(&first, None, None).unwrap();
    ws.add_filter(0, parse_rule("GPA >= 3.5").unwrap(), None)
        .unwrap();
    assert_eq!(ws.tab_model(2).unwrap().row_count(), 1);

    let report = ws.load_file(&second, None, Some(LoadAction::Merge)).unwrap();
    assert!(matches!(
        report,
        LoadReport::Loaded {
            action: Some(LoadAction::Merge),
            rows: 2,
            total: 3,
            ..
        }
    ));

    let table = ws.base_model().table();
    assert_eq!(
        table.column_names(),
        vec!["Name", "GPA", "Status", DATE_ADDED_COLUMN]
    );
    let order: Vec<String> = (0..table.row_count())
        .map(|row| table.get_value_by_name(row, "Name").unwrap().to_string())
        .collect();
    assert_eq!(order, vec!["Ada", "Ben", "Cy"]);

    assert_eq!(ws.tab_model(2).unwrap().row_count(), 2);
    assert_eq!(ws.union_mask(), &[true, false, true]);
    assert_eq!(ws.current_file(), Some(second.as_path()));
}

#[test]
fn test_merge_mismatch_names_columns() {
    let dir = TempDir::new().unwrap();
    let first = write(dir.path(), "a.csv", "Name,GPA,Status\nAda,3.6,Active\n");
    let second = write(dir.path(), "b.csv", "Name,GPA,Advisor\nBen,2.0,Kim\n");

    let mut ws = Workspace::new(settings());
    ws.load_file(&first, None, None).unwrap();
    let err = ws
        .load_file(&second, None, Some(LoadAction::Merge))
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Column mismatch: Missing: Status; Extra: Advisor"
    );
    assert_eq!(ws.base_model().row_count(), 1);
    assert_eq!(ws.current_file(), Some(first.as_path()));
}

#[test]
fn test_saved_workbook_loads_by_sheet() {
    let dir = TempDir::new().unwrap();
    let roster = write(
        dir.path(),
        "roster.csv",
        "Name,GPA\nAda,3.6\nBen,2.0\nCy,3.9\n",
    );

    let mut ws = Workspace::new(settings());
    ws.load_file(&roster, None, None).unwrap();
    ws.add_filter(0, parse_rule("GPA >= 3.5").unwrap(), None)
        .unwrap();
    let workbook = dir.path().join("review.xlsx");
    ws.save_view(0, &workbook).unwrap();

    let mut reader = Workspace::new(settings());
    let report = reader.load_file(&workbook, None, None).unwrap();
    assert_eq!(
        report,
        LoadReport::NeedsSheet(vec![
            "ALL".to_string(),
            "HIGHLIGHTED".to_string(),
            "UNHIGHLIGHTED".to_string()
        ])
    );
    assert!(!reader.has_data());

    reader
        .load_file(&workbook, Some("HIGHLIGHTED"), None)
        .unwrap();
    let table = reader.base_model().table();
    assert_eq!(table.row_count(), 2);
    assert_eq!(table.get_value_by_name(1, "GPA"), Some(&DataValue::Float(3.9)));
}
