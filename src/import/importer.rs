//! The reconciliation orchestrator.
//!
//! Drives one import run end to end:
//! 1. Fetch every remote program (the only stage whose failure aborts)
//! 2. Seed the default program type terms
//! 3. Process plans, remove stale plans, publish new plans
//! 4. Process subplans the same way, strictly after every plan is settled
//!    so parent lookups succeed
//! 5. Summarize
//!
//! New records are published only after stale removal so freshly generated
//! slugs are not incremented around records that are about to disappear.
//!
//! Per-record failures after the fetch degrade to warnings; a malformed
//! program never aborts the batch. Store failures while assembling the run's
//! working sets do abort, since nothing meaningful can continue without them.

use super::changeset::Changeset;
use super::record::{Hooks, ProgramImport};
use super::stats;
use crate::classify;
use crate::config::ImportConfig;
use crate::error::ImportError;
use crate::search::{ProgramSource, RemoteProgram, WritebackClient};
use crate::store::{meta, DegreeStore, RecordId, RecordQuery};
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Stages of one import run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    Init,
    Fetching,
    Seeding,
    ProcessingPlans,
    PublishingPlans,
    ProcessingSubplans,
    PublishingSubplans,
    Summarizing,
    Done,
    /// Terminal state, reachable only from `Fetching`.
    Failed,
}

impl std::fmt::Display for ImportStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ImportStage::Init => "init",
            ImportStage::Fetching => "fetching",
            ImportStage::Seeding => "seeding",
            ImportStage::ProcessingPlans => "processing-plans",
            ImportStage::PublishingPlans => "publishing-plans",
            ImportStage::ProcessingSubplans => "processing-subplans",
            ImportStage::PublishingSubplans => "publishing-subplans",
            ImportStage::Summarizing => "summarizing",
            ImportStage::Done => "done",
            ImportStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// All state owned by one `import()` invocation. Created at the start of the
/// run, discarded with the importer; nothing survives between runs except
/// what the store itself holds.
pub struct ImportRunState {
    pub stage: ImportStage,
    /// Every program fetched this run.
    pub programs: Vec<RemoteProgram>,
    /// Server-reported result total.
    pub result_count: u64,
    /// Published plan records not yet matched; whatever remains after the
    /// plan pass is stale. Holds pre-captured old snapshots in verbose mode.
    pub existing_plans: BTreeMap<RecordId, Option<Changeset>>,
    pub existing_subplans: BTreeMap<RecordId, Option<Changeset>>,
    /// Records created this run, published at the end of their pass.
    pub new_plans: BTreeSet<RecordId>,
    pub new_subplans: BTreeSet<RecordId>,
    /// Records updated this run, with completed changesets in verbose mode.
    pub updated_plans: BTreeMap<RecordId, Option<Changeset>>,
    pub updated_subplans: BTreeMap<RecordId, Option<Changeset>>,
    pub new_count: u64,
    pub updated_count: u64,
    pub removed_count: u64,
    pub duplicate_count: u64,
    /// Data-integrity warnings surfaced in the run summary.
    pub warnings: Vec<String>,
}

impl ImportRunState {
    pub fn new() -> Self {
        Self {
            stage: ImportStage::Init,
            programs: Vec::new(),
            result_count: 0,
            existing_plans: BTreeMap::new(),
            existing_subplans: BTreeMap::new(),
            new_plans: BTreeSet::new(),
            new_subplans: BTreeSet::new(),
            updated_plans: BTreeMap::new(),
            updated_subplans: BTreeMap::new(),
            new_count: 0,
            updated_count: 0,
            removed_count: 0,
            duplicate_count: 0,
            warnings: Vec::new(),
        }
    }
}

impl Default for ImportRunState {
    fn default() -> Self {
        Self::new()
    }
}

/// Imports degree programs from a program source into the local store.
pub struct DegreeImporter<'a, S, P> {
    config: &'a ImportConfig,
    store: &'a S,
    source: &'a P,
    hooks: Hooks,
    state: ImportRunState,
    run_id: String,
}

impl<'a, S: DegreeStore, P: ProgramSource> DegreeImporter<'a, S, P> {
    pub fn new(config: &'a ImportConfig, store: &'a S, source: &'a P) -> Self {
        Self {
            config,
            store,
            source,
            hooks: Hooks::default(),
            state: ImportRunState::new(),
            run_id: generate_run_id(),
        }
    }

    /// Installs strategy overrides for classification and record shaping.
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn state(&self) -> &ImportRunState {
        &self.state
    }

    /// Runs the full import.
    pub async fn import(&mut self) -> Result<(), ImportError> {
        let start = Instant::now();
        info!(run_id = %self.run_id, "Starting degree import");

        self.set_stage(ImportStage::Fetching);
        let writeback = match self.build_writeback() {
            Ok(writeback) => writeback,
            Err(e) => {
                self.set_stage(ImportStage::Failed);
                return Err(e);
            }
        };
        let (programs, count) = match self.source.fetch_all().await {
            Ok(fetched) => fetched,
            Err(e) => {
                self.set_stage(ImportStage::Failed);
                return Err(e);
            }
        };
        self.state.programs = programs.clone();
        self.state.result_count = count;

        self.set_stage(ImportStage::Seeding);
        if let Err(e) = classify::ensure_seed_terms(self.store, classify::DEFAULT_PROGRAM_TYPES) {
            warn!(run_id = %self.run_id, error = %e, "Program type seeding failed");
        }

        self.state.existing_plans = self.load_existing(&RecordQuery::published_plans())?;
        self.state.existing_subplans = self.load_existing(&RecordQuery::published_subplans())?;
        info!(
            run_id = %self.run_id,
            plans = self.state.existing_plans.len(),
            subplans = self.state.existing_subplans.len(),
            "Existing degree records loaded"
        );

        self.set_stage(ImportStage::ProcessingPlans);
        for program in programs.iter().filter(|p| !p.is_subplan()) {
            self.process_program(program, writeback.as_ref()).await;
        }
        self.remove_stale(false);
        self.set_stage(ImportStage::PublishingPlans);
        self.publish_new(false);

        self.set_stage(ImportStage::ProcessingSubplans);
        for program in programs.iter().filter(|p| p.is_subplan()) {
            self.process_program(program, writeback.as_ref()).await;
        }
        self.remove_stale(true);
        self.set_stage(ImportStage::PublishingSubplans);
        self.publish_new(true);

        self.set_stage(ImportStage::Summarizing);
        info!(
            run_id = %self.run_id,
            duration_ms = start.elapsed().as_millis() as u64,
            new = self.state.new_count,
            updated = self.state.updated_count,
            removed = self.state.removed_count,
            duplicates = self.state.duplicate_count,
            "Import completed"
        );
        self.set_stage(ImportStage::Done);

        Ok(())
    }

    /// Renders the run summary, basic or verbose per configuration.
    pub fn stats(&self) -> Result<String, ImportError> {
        Ok(stats::render(&self.state, self.store, self.config.verbose)?)
    }

    fn set_stage(&mut self, stage: ImportStage) {
        self.state.stage = stage;
        debug!(run_id = %self.run_id, stage = %stage, "Stage transition");
    }

    fn build_writeback(&self) -> Result<Option<WritebackClient>, ImportError> {
        if self.config.do_writebacks {
            Ok(Some(WritebackClient::new(self.config)?))
        } else {
            Ok(None)
        }
    }

    /// Loads one working set of published record ids, pre-capturing old
    /// snapshots when verbose reporting is on.
    fn load_existing(
        &self,
        query: &RecordQuery,
    ) -> Result<BTreeMap<RecordId, Option<Changeset>>, ImportError> {
        let mut existing = BTreeMap::new();
        for id in self.store.degree_ids(query)? {
            let changeset = if self.config.verbose {
                match Changeset::with_old(self.store, id) {
                    Ok(changeset) => Some(changeset),
                    Err(e) => {
                        warn!(record_id = id, error = %e, "Failed to snapshot existing record");
                        None
                    }
                }
            } else {
                None
            };
            existing.insert(id, changeset);
        }
        Ok(existing)
    }

    /// Imports one program as a new draft or an update to its match, then
    /// folds the outcome into the run's counters and working sets.
    async fn process_program(
        &mut self,
        program: &RemoteProgram,
        writeback: Option<&WritebackClient>,
    ) {
        let mut import = match ProgramImport::prepare(
            program,
            self.source,
            self.store,
            self.config,
            &self.hooks,
        )
        .await
        {
            Ok(import) => import,
            Err(e) => {
                warn!(
                    degree_id = %program.degree_id(),
                    error = %e,
                    "Skipping program; preparation failed"
                );
                return;
            }
        };

        if import.match_candidates() > 1 {
            self.state.warnings.push(format!(
                "{} local records share degree id \"{}\"; the first match was updated",
                import.match_candidates(),
                import.degree_id()
            ));
        }

        let record_id = match import.save(self.store) {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    degree_id = %program.degree_id(),
                    error = %e,
                    "Skipping program; save failed"
                );
                return;
            }
        };
        debug!(
            degree_id = %import.degree_id(),
            record_id = record_id,
            new = import.is_new(),
            "Program processed"
        );

        self.update_counters(&import);

        if let Some(writeback) = writeback {
            let description = self
                .store
                .get_meta(record_id, meta::DESCRIPTION)
                .unwrap_or_default();
            let profile_url = self.config.site_base_url.as_ref().map(|base| {
                format!("{}/{}", base.trim_end_matches('/'), import.slug())
            });
            writeback
                .sync_record(
                    &program.plan_code,
                    program.subplan_code(),
                    description.as_deref(),
                    profile_url.as_deref(),
                )
                .await;
        }
    }

    /// Applies the counting rule: a program is new when nothing matched,
    /// updated the first time its match is touched this run, and a duplicate
    /// on any later touch (or when the match is a record this run created).
    fn update_counters(&mut self, import: &ProgramImport<'_>) {
        let id = import.record_id();
        let state = &mut self.state;
        let (new_set, existing, updated) = if import.is_subplan() {
            (
                &mut state.new_subplans,
                &mut state.existing_subplans,
                &mut state.updated_subplans,
            )
        } else {
            (
                &mut state.new_plans,
                &mut state.existing_plans,
                &mut state.updated_plans,
            )
        };

        if import.is_new() {
            new_set.insert(id);
            state.new_count += 1;
            return;
        }

        // Matched records leave the existing set; anything still there after
        // the pass is stale.
        let prior = existing.remove(&id);

        if updated.contains_key(&id) {
            state.duplicate_count += 1;
            return;
        }

        let mut changeset = prior.flatten();
        if let Some(changeset) = changeset.as_mut() {
            if let Err(e) = changeset.capture_new(self.store) {
                warn!(record_id = id, error = %e, "Failed to snapshot updated record");
            }
        }
        updated.insert(id, changeset);

        if new_set.contains(&id) {
            state.duplicate_count += 1;
        } else {
            state.updated_count += 1;
        }
    }

    /// Deletes every record left in one existing set, hard or soft per
    /// configuration.
    fn remove_stale(&mut self, subplans: bool) {
        let stale = if subplans {
            std::mem::take(&mut self.state.existing_subplans)
        } else {
            std::mem::take(&mut self.state.existing_plans)
        };
        if stale.is_empty() {
            return;
        }

        info!(
            run_id = %self.run_id,
            count = stale.len(),
            kind = if subplans { "subplan" } else { "plan" },
            "Removing stale degree records"
        );
        for (id, _changeset) in stale {
            match self.store.delete(id, self.config.force_delete_stale) {
                Ok(()) => self.state.removed_count += 1,
                Err(e) => warn!(record_id = id, error = %e, "Failed to remove stale record"),
            }
        }
    }

    /// Publishes every record created in one pass.
    fn publish_new(&mut self, subplans: bool) {
        let new_ids: Vec<RecordId> = if subplans {
            self.state.new_subplans.iter().copied().collect()
        } else {
            self.state.new_plans.iter().copied().collect()
        };
        for id in new_ids {
            if let Err(e) = self.store.publish(id) {
                warn!(record_id = id, error = %e, "Failed to publish new record");
            }
        }
    }
}

/// Generates a unique id for correlating one run's log output.
fn generate_run_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros();
    let random: u32 = rand::thread_rng().gen();
    format!("{:x}-{:08x}", timestamp & 0xFFFF_FFFF, random)
}
