use std::fs;
use std::path::{Path, PathBuf};
use student_admissions::config::BehaviorConfig;
use student_admissions::data::data_view::HighlightFilter;
use student_admissions::data::datatable::DataValue;
use student_admissions::filter::{parse_rule, CombinationMode, FilterRule};
use student_admissions::presets::{FilterPreset, PresetManager};
use student_admissions::workspace::{
    ExportScope, FilterChange, LoadAction, LoadReport, StateStore, TabKind, Workspace, WorkspaceError,
};
use tempfile::TempDir;

const APPLICANTS: &str = "\
Name,GPA,Status,Applied
Ada,3.6,Active,2024-01-15
Ben,2.0,Probation,2024-02-01
Cy,3.9,Active,2024-03-10
Di,2.8,Active,2024-04-20
Eve,3.1,Probation,2024-05-05
";

fn settings() -> BehaviorConfig {
    BehaviorConfig {
        archive_on_load: false,
        archive_on_exit: false,
        ..BehaviorConfig::default()
    }
}

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn rule(expression: &str) -> FilterRule {
    parse_rule(expression).unwrap()
}

fn names(ws: &Workspace, index: usize) -> Vec<String> {
    let tab = ws.tab(index).unwrap();
    let model = tab.model(ws.base_model());
    tab.view()
        .visible_rows()
        .iter()
        .map(|&row| {
            model
                .table()
                .get_value_by_name(row, "Name")
                .map(|v| v.to_string())
                .unwrap_or_default()
        })
        .collect()
}

fn loaded(dir: &Path) -> Workspace {
    let mut ws = Workspace::new(settings());
    ws.load_file(&write(dir, "applicants.csv", APPLICANTS), None, None)
        .unwrap();
    ws
}

#[test]
fn test_rule_tabs_feed_the_filtered_tab() {
    let dir = TempDir::new().unwrap();
    let mut ws = loaded(dir.path());

    assert_eq!(
        ws.add_filter(0, rule("GPA >= 3.5"), None).unwrap(),
        FilterChange::CreatedTab(2)
    );
    assert_eq!(
        ws.add_filter(0, rule("Status contains probation"), None)
            .unwrap(),
        FilterChange::CreatedTab(3)
    );

    assert_eq!(names(&ws, 2), vec!["Ada", "Cy"]);
    assert_eq!(names(&ws, 3), vec!["Ben", "Eve"]);
    assert_eq!(ws.union_mask(), &[true, true, true, false, true]);

    assert_eq!(ws.filtered_index(), Some(1));
    assert_eq!(names(&ws, 1), vec!["Ada", "Ben", "Cy", "Eve"]);

    ws.set_filtered_show_matches(false);
    assert_eq!(names(&ws, 1), vec!["Di"]);

    // The base tab lists every rule of every rule tab
    assert_eq!(ws.display_filters(0).unwrap().len(), 2);
    assert_eq!(ws.tab(2).unwrap().name, "GPA >= 3.5");
    assert_eq!(ws.tab(3).unwrap().name, "Status: probation");
}

#[test]
fn test_removing_last_rule_closes_rule_tab() {
    let dir = TempDir::new().unwrap();
    let mut ws = loaded(dir.path());
    let honors = rule("GPA >= 3.5");
    ws.add_filter(0, honors.clone(), None).unwrap();
    assert_eq!(ws.tab_count(), 3);

    ws.remove_filter(0, &honors).unwrap();
    assert_eq!(ws.tab_count(), 2);
    assert!(ws.union_mask().iter().all(|&hit| !hit));
    assert_eq!(
        ws.remove_filter(0, &honors),
        Err(WorkspaceError::NoSuchFilter)
    );
}

#[test]
fn test_rule_tab_mode_any_and_all() {
    let dir = TempDir::new().unwrap();
    let mut ws = loaded(dir.path());
    let index = match ws.add_filter(0, rule("GPA >= 3.0"), None).unwrap() {
        FilterChange::CreatedTab(index) => index,
        other => panic!("expected a new rule tab, got {:?}", other),
    };

    ws.add_filter(index, rule("Status contains probation"), None)
        .unwrap();
    assert_eq!(names(&ws, index), vec!["Eve"]);

    ws.set_filter_mode(index, CombinationMode::Any).unwrap();
    assert_eq!(names(&ws, index), vec!["Ada", "Ben", "Cy", "Eve"]);
}

#[test]
fn test_date_rule_and_search() {
    let dir = TempDir::new().unwrap();
    let mut ws = loaded(dir.path());
    ws.add_filter(0, rule("Applied between 2024-03-01 and 2024-04-30"), None)
        .unwrap();
    assert_eq!(names(&ws, 2), vec!["Cy", "Di"]);

    ws.set_search("cy", Some("Name"));
    assert_eq!(names(&ws, 0), vec!["Cy"]);
    assert_eq!(names(&ws, 2), vec!["Cy"]);

    ws.clear_search();
    ws.set_view_mode(0, HighlightFilter::Unhighlighted).unwrap();
    assert_eq!(names(&ws, 0), vec!["Ada", "Ben", "Eve"]);
}

#[test]
fn test_custom_tab_is_independent_of_base() {
    let dir = TempDir::new().unwrap();
    let mut ws = loaded(dir.path());
    ws.set_search("active", None);
    let custom = ws.create_custom_tab("Active Only", 0).unwrap();
    ws.clear_search();

    assert_eq!(names(&ws, custom), vec!["Ada", "Cy", "Di"]);

    // Rules on a custom tab narrow its own rows
    ws.add_filter(custom, rule("GPA < 3.0"), None).unwrap();
    assert_eq!(names(&ws, custom), vec!["Di"]);
    assert_eq!(ws.tab_highlight_mask(custom).unwrap(), vec![false, false, true]);

    assert_eq!(
        ws.edit_cell(custom, 0, "GPA", "1.5").unwrap(),
        DataValue::Float(1.5)
    );
    assert_eq!(names(&ws, custom), vec!["Di"]);
    assert_eq!(
        ws.base_model().table().get_value_by_name(3, "GPA"),
        Some(&DataValue::Float(2.8))
    );
}

#[test]
fn test_move_highlighted_rows_to_a_tab() {
    let dir = TempDir::new().unwrap();
    let mut ws = loaded(dir.path());
    ws.add_filter(0, rule("Status contains probation"), None)
        .unwrap();

    let moved = ws.move_highlighted(0).unwrap();
    assert_eq!(moved.row_count(), 2);
    assert_eq!(ws.base_model().row_count(), 3);
    assert!(names(&ws, 2).is_empty());

    let index = ws.add_table_tab("Filtered Rows (Moved)", moved).unwrap();
    assert_eq!(ws.tab(index).unwrap().kind, TabKind::Custom);
    assert_eq!(names(&ws, index), vec!["Ben", "Eve"]);

    assert_eq!(
        ws.move_highlighted(0).unwrap_err(),
        WorkspaceError::NoHighlightedRows
    );
}

#[test]
fn test_export_filtered_rows_to_json() {
    let dir = TempDir::new().unwrap();
    let mut ws = loaded(dir.path());
    ws.add_filter(0, rule("GPA >= 3.5"), None).unwrap();

    let out = dir.path().join("honors.json");
    ws.export(0, ExportScope::Filtered, &out).unwrap();

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    let records = json.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["Name"], "Ada");
    assert_eq!(records[1]["Name"], "Cy");
}

#[test]
fn test_preset_saved_and_applied_elsewhere() {
    let dir = TempDir::new().unwrap();
    let presets = PresetManager::new(dir.path().join("presets"));

    let mut ws = loaded(dir.path());
    ws.add_filter(0, rule("GPA >= 3.5"), None).unwrap();
    ws.add_filter(0, rule("Status contains probation"), None)
        .unwrap();
    let preset = FilterPreset::new("Watch List", "honors and probation")
        .with_filters(ws.preset_filters(0).unwrap());
    presets.save(&preset).unwrap();

    let listed = presets.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].filter_count, 2);

    let mut fresh = loaded(dir.path());
    let loaded_preset = presets.load("Watch List").unwrap();
    let index = fresh.apply_preset(0, &loaded_preset).unwrap();
    assert_eq!(fresh.tab(index).unwrap().name, "Watch List");
    // Preset rule tabs combine with All, so nobody is both
    assert!(names(&fresh, index).is_empty());

    fresh.set_filter_mode(index, CombinationMode::Any).unwrap();
    assert_eq!(names(&fresh, index), vec!["Ada", "Ben", "Cy", "Eve"]);
}

#[test]
fn test_session_survives_restart() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path().join("app_state.json"));
    let waitlist = write(dir.path(), "waitlist.csv", "Name,Rank\nFay,1\nGus,2\n");

    {
        let mut ws = loaded(dir.path()).with_state_store(store.clone());
        ws.add_filter(0, rule("GPA >= 3.5"), None).unwrap();
        let report = ws
            .load_file(&waitlist, None, Some(LoadAction::NewTab))
            .unwrap();
        assert_eq!(report, LoadReport::NewTab { index: 3, rows: 2 });
        ws.add_filter(3, rule("Rank <= 1"), None).unwrap();
        ws.on_exit();
    }

    let mut ws = Workspace::new(settings()).with_state_store(store);
    let report = ws.restore_from_store().unwrap().unwrap();
    assert_eq!(report.tabs_restored, 2);

    assert_eq!(ws.tab_count(), 4);
    assert_eq!(ws.tab(2).unwrap().kind, TabKind::Rule);
    assert_eq!(names(&ws, 2), vec!["Ada", "Cy"]);
    assert_eq!(ws.tab(3).unwrap().kind, TabKind::File);
    assert_eq!(ws.tab(3).unwrap().filters(), &[rule("Rank <= 1")]);
    assert_eq!(ws.tab_highlight_mask(3).unwrap(), vec![true, false]);
}

fn assert_views_current(ws: &Workspace) {
    for tab in ws.tabs() {
        assert!(
            !tab.view().is_stale(tab.model(ws.base_model())),
            "view of '{}' is out of date",
            tab.name
        );
    }
}

#[test]
fn test_views_follow_every_change() {
    let dir = TempDir::new().unwrap();
    let mut ws = loaded(dir.path());
    assert_views_current(&ws);

    ws.add_filter(0, rule("GPA >= 3.5"), None).unwrap();
    assert_views_current(&ws);

    let custom = ws.create_custom_tab("Everyone", 0).unwrap();
    ws.add_filter(custom, rule("Status contains active"), None)
        .unwrap();
    assert_views_current(&ws);
    assert_eq!(names(&ws, custom), vec!["Ada", "Cy", "Di"]);
    assert_eq!(ws.tab(custom).unwrap().mode(), CombinationMode::All);

    ws.set_filter_mode(2, CombinationMode::Any).unwrap();
    ws.remove_filter(custom, &rule("Status contains active"))
        .unwrap();
    assert_views_current(&ws);
    assert_eq!(names(&ws, custom).len(), 5);

    ws.set_filtered_show_matches(false);
    ws.close_all_rule_tabs();
    assert_views_current(&ws);
    assert_eq!(ws.base_model().filters().filter_count(), 0);
}
