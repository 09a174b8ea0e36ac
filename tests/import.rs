//! End-to-end import runs against the in-memory store and a fixed program
//! source.

use async_trait::async_trait;
use degsync::import::DegreeImporter;
use degsync::search::{Career, Level, OrgUnit, ParentRef, ProgramSource, RemoteProgram};
use degsync::store::{meta, taxonomy, DegreeStore, MemoryStore, NewRecord, RecordStatus};
use degsync::{ImportConfig, ImportError};

/// A program source serving a fixed in-process result set.
struct FixedSource {
    programs: Vec<RemoteProgram>,
}

impl FixedSource {
    fn new(programs: Vec<RemoteProgram>) -> Self {
        Self { programs }
    }
}

#[async_trait]
impl ProgramSource for FixedSource {
    async fn fetch_all(&self) -> Result<(Vec<RemoteProgram>, u64), ImportError> {
        if self.programs.is_empty() {
            return Err(ImportError::ApiEmptyResults);
        }
        Ok((self.programs.clone(), self.programs.len() as u64))
    }

    async fn parent_program_id(&self, program: &RemoteProgram) -> Option<u64> {
        program.parent_program.as_ref().and_then(|parent| parent.id)
    }
}

fn plan(id: u64, name: &str, plan_code: &str) -> RemoteProgram {
    RemoteProgram {
        id,
        name: name.to_string(),
        plan_code: plan_code.to_string(),
        subplan_code: None,
        career: Career::Undergraduate,
        level: Level::Bachelors,
        online: false,
        catalog_url: None,
        colleges: vec![OrgUnit {
            full_name: "College of Sciences".to_string(),
        }],
        departments: Vec::new(),
        parent_program: None,
        descriptions: Vec::new(),
        profiles: Vec::new(),
    }
}

fn subplan(
    id: u64,
    name: &str,
    plan_code: &str,
    subplan_code: &str,
    parent_id: Option<u64>,
) -> RemoteProgram {
    let mut program = plan(id, name, plan_code);
    program.subplan_code = Some(subplan_code.to_string());
    program.parent_program = Some(ParentRef {
        id: parent_id,
        url: format!(
            "https://search.example.edu/programs/{}/",
            parent_id.unwrap_or(0)
        ),
    });
    program
}

fn config() -> ImportConfig {
    ImportConfig::new("https://search.example.edu/", "test-key")
}

fn only_record_id(store: &MemoryStore, degree_id: &str) -> u64 {
    let ids = store.find_by_meta(meta::DEGREE_ID, degree_id).unwrap();
    assert_eq!(ids.len(), 1, "expected exactly one record for {degree_id}");
    ids[0]
}

#[tokio::test]
async fn test_first_import_creates_and_publishes() {
    let store = MemoryStore::new();
    let source = FixedSource::new(vec![plan(7, "Computer Science", "CS")]);
    let config = config();

    let mut importer = DegreeImporter::new(&config, &store, &source);
    importer.import().await.unwrap();

    let state = importer.state();
    assert_eq!(state.new_count, 1);
    assert_eq!(state.updated_count, 0);
    assert_eq!(state.removed_count, 0);
    assert_eq!(state.duplicate_count, 0);
    assert_eq!(state.result_count, 1);

    let id = only_record_id(&store, "CS ");
    let record = store.get(id).unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Published);
    assert_eq!(record.title, "Computer Science");
    assert_eq!(record.parent_id, 0);
    assert_eq!(
        store.get_terms(id, taxonomy::PROGRAM_TYPES).unwrap(),
        vec!["Undergraduate Program", "Bachelor"]
    );
    assert_eq!(
        store.get_terms(id, taxonomy::COLLEGES).unwrap(),
        vec!["College of Sciences"]
    );
    assert_eq!(store.get_meta(id, meta::PLAN_CODE).unwrap().unwrap(), "CS");
    assert_eq!(store.count_degrees().unwrap(), 1);

    // Seed terms exist even though this program only touched two of them.
    assert!(store
        .find_term(taxonomy::PROGRAM_TYPES, "Graduate Certificate")
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let store = MemoryStore::new();
    let source = FixedSource::new(vec![plan(7, "Computer Science", "CS")]);
    let mut config = config();
    config.verbose = true;

    let mut first = DegreeImporter::new(&config, &store, &source);
    first.import().await.unwrap();
    let id = only_record_id(&store, "CS ");

    let mut second = DegreeImporter::new(&config, &store, &source);
    second.import().await.unwrap();

    let state = second.state();
    assert_eq!(state.new_count, 0);
    assert_eq!(state.removed_count, 0);
    assert_eq!(state.duplicate_count, 0);
    // The match is counted as an update, but nothing actually moved.
    assert_eq!(state.updated_count, 1);
    let changeset = state.updated_plans.get(&id).unwrap().as_ref().unwrap();
    assert!(!changeset.has_changes());

    assert_eq!(store.count_degrees().unwrap(), 1);
    let record = store.get(id).unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Published);
    assert_eq!(record.slug, "computer-science");
}

#[tokio::test]
async fn test_duplicate_degree_ids_collapse_to_one_record() {
    let store = MemoryStore::new();
    let source = FixedSource::new(vec![
        plan(7, "Computer Science", "CS"),
        plan(8, "Computer Science (dupe)", "CS"),
    ]);
    let config = config();

    let mut importer = DegreeImporter::new(&config, &store, &source);
    importer.import().await.unwrap();

    let state = importer.state();
    assert_eq!(state.new_count, 1);
    assert_eq!(state.duplicate_count, 1);
    assert_eq!(state.updated_count, 0);
    assert_eq!(store.count_degrees().unwrap(), 1);
    only_record_id(&store, "CS ");
}

#[tokio::test]
async fn test_subplan_parented_under_plan() {
    let store = MemoryStore::new();
    let source = FixedSource::new(vec![
        plan(1, "Biology", "BIO"),
        subplan(2, "Biology - Marine Ecology", "BIO", "ECO", Some(1)),
    ]);
    let config = config();

    let mut importer = DegreeImporter::new(&config, &store, &source);
    importer.import().await.unwrap();

    let plan_id = only_record_id(&store, "BIO ");
    let subplan_id = only_record_id(&store, "BIO ECO");
    let record = store.get(subplan_id).unwrap().unwrap();
    assert_eq!(record.parent_id, plan_id);
    assert_eq!(record.status, RecordStatus::Published);
    assert_eq!(
        store.get_meta(subplan_id, meta::NAME_SHORT).unwrap().unwrap(),
        "Marine Ecology"
    );
    assert_eq!(record.slug, "marine-ecology");
}

#[tokio::test]
async fn test_unresolvable_parent_falls_back_to_top_level() {
    let store = MemoryStore::new();
    let source = FixedSource::new(vec![subplan(
        2,
        "Biology - Marine Ecology",
        "BIO",
        "ECO",
        None,
    )]);
    let config = config();

    let mut importer = DegreeImporter::new(&config, &store, &source);
    importer.import().await.unwrap();

    let id = only_record_id(&store, "BIO ECO");
    let record = store.get(id).unwrap().unwrap();
    assert_eq!(record.parent_id, 0);
    assert_eq!(record.status, RecordStatus::Published);
    // With no parent record, the full name survives as the short name.
    assert_eq!(
        store.get_meta(id, meta::NAME_SHORT).unwrap().unwrap(),
        "Biology - Marine Ecology"
    );
}

#[tokio::test]
async fn test_flat_hierarchy_imports_subplans_top_level() {
    let store = MemoryStore::new();
    let source = FixedSource::new(vec![
        plan(1, "Biology", "BIO"),
        subplan(2, "Biology - Marine Ecology", "BIO", "ECO", Some(1)),
    ]);
    let mut config = config();
    config.preserve_hierarchy = false;

    let mut importer = DegreeImporter::new(&config, &store, &source);
    importer.import().await.unwrap();

    let id = only_record_id(&store, "BIO ECO");
    assert_eq!(store.get(id).unwrap().unwrap().parent_id, 0);
}

#[tokio::test]
async fn test_stale_records_are_removed() {
    let store = MemoryStore::new();
    let config = config();

    let source = FixedSource::new(vec![plan(1, "Biology", "BIO"), plan(2, "Chemistry", "CHM")]);
    let mut first = DegreeImporter::new(&config, &store, &source);
    first.import().await.unwrap();
    let stale_id = only_record_id(&store, "CHM ");

    let source = FixedSource::new(vec![plan(1, "Biology", "BIO")]);
    let mut second = DegreeImporter::new(&config, &store, &source);
    second.import().await.unwrap();

    assert_eq!(second.state().removed_count, 1);
    assert!(store.get(stale_id).unwrap().is_none());
    assert_eq!(store.count_degrees().unwrap(), 1);
}

#[tokio::test]
async fn test_trash_stale_keeps_the_record() {
    let store = MemoryStore::new();
    let mut config = config();
    config.force_delete_stale = false;

    let source = FixedSource::new(vec![plan(1, "Biology", "BIO"), plan(2, "Chemistry", "CHM")]);
    let mut first = DegreeImporter::new(&config, &store, &source);
    first.import().await.unwrap();
    let stale_id = only_record_id(&store, "CHM ");

    let source = FixedSource::new(vec![plan(1, "Biology", "BIO")]);
    let mut second = DegreeImporter::new(&config, &store, &source);
    second.import().await.unwrap();

    assert_eq!(second.state().removed_count, 1);
    let record = store.get(stale_id).unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Trashed);
}

#[tokio::test]
async fn test_ignored_records_survive_removal() {
    let store = MemoryStore::new();
    let config = config();

    let source = FixedSource::new(vec![plan(1, "Biology", "BIO"), plan(2, "Chemistry", "CHM")]);
    let mut first = DegreeImporter::new(&config, &store, &source);
    first.import().await.unwrap();
    let shielded_id = only_record_id(&store, "CHM ");
    store
        .set_meta(shielded_id, meta::IMPORT_IGNORE, "on")
        .unwrap();

    let source = FixedSource::new(vec![plan(1, "Biology", "BIO")]);
    let mut second = DegreeImporter::new(&config, &store, &source);
    second.import().await.unwrap();

    assert_eq!(second.state().removed_count, 0);
    let record = store.get(shielded_id).unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Published);
}

#[tokio::test]
async fn test_empty_remote_set_aborts_without_mutation() {
    let store = MemoryStore::new();
    let config = config();

    let source = FixedSource::new(vec![plan(1, "Biology", "BIO")]);
    let mut first = DegreeImporter::new(&config, &store, &source);
    first.import().await.unwrap();
    let id = only_record_id(&store, "BIO ");

    let source = FixedSource::new(Vec::new());
    let mut second = DegreeImporter::new(&config, &store, &source);
    let err = second.import().await.unwrap_err();
    assert!(matches!(err, ImportError::ApiEmptyResults));
    assert_eq!(err.exit_code(), 3);

    // Nothing was touched: the record is still published, nothing removed.
    assert_eq!(second.state().removed_count, 0);
    let record = store.get(id).unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Published);
    assert_eq!(store.count_degrees().unwrap(), 1);
}

#[tokio::test]
async fn test_ambiguous_degree_id_warns_in_summary() {
    let store = MemoryStore::new();
    let config = config();

    // Two hand-seeded published records sharing one degree id.
    let mut seeded = Vec::new();
    for n in 0..2 {
        let id = store
            .create(NewRecord {
                title: format!("Biology {}", n),
                slug: format!("biology-{}", n),
                status: RecordStatus::Draft,
                parent_id: 0,
                created: chrono::Utc::now().naive_utc(),
            })
            .unwrap();
        store.set_meta(id, meta::DEGREE_ID, "BIO ").unwrap();
        store.set_meta(id, meta::PLAN_CODE, "BIO").unwrap();
        store.publish(id).unwrap();
        seeded.push(id);
    }

    let source = FixedSource::new(vec![plan(1, "Biology", "BIO")]);
    let mut importer = DegreeImporter::new(&config, &store, &source);
    importer.import().await.unwrap();

    // The first match was updated; the second was never matched, so it went
    // out with the stale records.
    let state = importer.state();
    assert_eq!(state.updated_count, 1);
    assert_eq!(state.removed_count, 1);
    assert_eq!(store.get(seeded[0]).unwrap().unwrap().title, "Biology");
    assert!(store.get(seeded[1]).unwrap().is_none());

    let summary = importer.stats().unwrap();
    assert!(summary.contains("Warnings:"));
    assert!(summary.contains("share degree id \"BIO \""));
}

#[tokio::test]
async fn test_verbose_summary_reports_title_change() {
    let store = MemoryStore::new();
    let mut config = config();
    config.verbose = true;

    let source = FixedSource::new(vec![plan(1, "Biology", "BIO")]);
    let mut first = DegreeImporter::new(&config, &store, &source);
    first.import().await.unwrap();
    let id = only_record_id(&store, "BIO ");

    let source = FixedSource::new(vec![plan(1, "Biology (B.S.)", "BIO")]);
    let mut second = DegreeImporter::new(&config, &store, &source);
    second.import().await.unwrap();

    let state = second.state();
    assert_eq!(state.updated_count, 1);
    let changeset = state.updated_plans.get(&id).unwrap().as_ref().unwrap();
    assert!(changeset.has_changes());

    let summary = second.stats().unwrap();
    assert!(summary.contains("1 existing plan records were updated"));
    assert!(summary.contains("Biology (B.S.)"));
    assert!(summary.contains("-- Updated title"));
    assert!(summary.contains("That's it!"));
}
