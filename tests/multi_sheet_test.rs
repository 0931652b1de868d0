// ==========================================
// 多工作表编排集成测试
// ==========================================

use research_data_loader::engine::{FaultKind, MultiLoadError};
use research_data_loader::loaders::{animals, compounds};
use research_data_loader::{
    AnimalsLoader, CompoundsLoader, Fault, LoadOptions, LoadOutcome, MultiSheetLoad,
    SqliteRecordStore, Workbook,
};

mod test_helpers;
use test_helpers::{count_rows, create_test_db, dataset, open_test_connection};

fn workbook(animal_rows: &[&[&str]]) -> Workbook {
    Workbook {
        file: Some("study_2026.xlsx".to_string()),
        sheets: vec![
            dataset(
                "Compounds",
                &["Name", "Formula", "HMDB ID"],
                &[
                    &["glucose", "C6H12O6", "HMDB0000122"],
                    &["lactate", "C3H6O3", "HMDB0000190"],
                ],
            ),
            dataset(
                "Animals",
                &["Animal Name", "Study Name", "Sex", "Body Weight", "Diet"],
                animal_rows,
            ),
            dataset(
                "Defaults",
                &["Sheet Name", "Column Header", "Default Value"],
                &[&["Animals", "Diet", "chow"]],
            ),
        ],
    }
}

#[test]
fn test_all_sheets_commit_together() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let mut conn = open_test_connection(&db_path);
    let store = SqliteRecordStore::new();
    let book = workbook(&[&["mouse1", "obesity", "F", "20.1", ""]]);

    let result = MultiSheetLoad::new(&store)
        .step(&CompoundsLoader, LoadOptions::new())
        .step(&AnimalsLoader, LoadOptions::new())
        .run(&mut conn, &book)
        .unwrap();

    assert_eq!(result.outcome, LoadOutcome::Committed);
    assert_eq!(result.attempts.len(), 2);
    assert!(result
        .attempts
        .iter()
        .all(|a| a.outcome == LoadOutcome::Committed));
    assert_eq!(result.statistics.get(compounds::COMPOUND_MODEL).created, 2);
    assert_eq!(result.statistics.get(animals::ANIMAL_MODEL).created, 1);
    assert_eq!(result.attempts[1].file.as_deref(), Some("study_2026.xlsx"));

    assert_eq!(count_rows(&conn, "compound"), 2);
    let diet: String = conn
        .query_row("SELECT diet FROM animal WHERE name = 'mouse1'", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(diet, "chow");
}

#[test]
fn test_fault_in_one_sheet_rolls_back_every_sheet() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let mut conn = open_test_connection(&db_path);
    let store = SqliteRecordStore::new();
    let book = workbook(&[&["mouse1", "", "F", "", ""]]);

    let err = MultiSheetLoad::new(&store)
        .step(&CompoundsLoader, LoadOptions::new())
        .step(&AnimalsLoader, LoadOptions::new())
        .run(&mut conn, &book)
        .unwrap_err();

    match err {
        MultiLoadError::Failed(result) => {
            assert_eq!(result.outcome, LoadOutcome::RolledBack);
            assert_eq!(result.attempts[0].outcome, LoadOutcome::Committed);
            assert!(!result.attempts[0].is_fatal);
            assert!(result.attempts[1].is_fatal);
            assert!(result.attempts[1]
                .diagnostics
                .iter()
                .any(|d| matches!(
                    &d.fault,
                    Fault::Summary { summarized, .. } if *summarized == FaultKind::RequiredColumnValue
                )));
            assert_eq!(result.error_count(), 1);
        }
        other => panic!("期望 MultiLoadError::Failed，实际: {:?}", other),
    }
    assert_eq!(count_rows(&conn, "compound"), 0);
    assert_eq!(count_rows(&conn, "animal"), 0);
}

#[test]
fn test_missing_sheet_is_reported_not_crashed() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let mut conn = open_test_connection(&db_path);
    let store = SqliteRecordStore::new();
    let book = workbook(&[&["mouse1", "obesity", "F", "", ""]]);

    let err = MultiSheetLoad::new(&store)
        .step(&CompoundsLoader, LoadOptions::new())
        .step(&AnimalsLoader, LoadOptions::new().with_sheet("Mice"))
        .run(&mut conn, &book)
        .unwrap_err();

    match err {
        MultiLoadError::Failed(result) => {
            let attempt = &result.attempts[1];
            assert_eq!(attempt.sheet.as_deref(), Some("Mice"));
            assert!(matches!(
                attempt.diagnostics[0].fault,
                Fault::MissingHeaders { .. }
            ));
        }
        other => panic!("期望 MultiLoadError::Failed，实际: {:?}", other),
    }
    assert_eq!(count_rows(&conn, "compound"), 0);
}

#[test]
fn test_dry_run_discards_all_sheets() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let mut conn = open_test_connection(&db_path);
    let store = SqliteRecordStore::new();
    let book = workbook(&[&["mouse1", "obesity", "M", "", ""]]);

    let result = MultiSheetLoad::new(&store)
        .dry_run(true)
        .step(&CompoundsLoader, LoadOptions::new())
        .step(&AnimalsLoader, LoadOptions::new())
        .run(&mut conn, &book)
        .unwrap();

    assert_eq!(result.outcome, LoadOutcome::DryRun);
    assert_eq!(result.attempts.len(), 2);
    assert!(result
        .attempts
        .iter()
        .all(|a| a.outcome == LoadOutcome::DryRun));
    assert_eq!(result.statistics.get(animals::STUDY_MODEL).created, 1);
    assert_eq!(count_rows(&conn, "compound"), 0);
    assert_eq!(count_rows(&conn, "study"), 0);
    assert!(result.render().contains("Animals"));
}
