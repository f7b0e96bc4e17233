//! TA backup pipeline
//!
//! Stages every student of one grader's section into a local grading tree:
//!
//! ```text
//! {local_root}/cache/                       support files, attendance cache
//! {local_root}/{lab}_backup/{student name}/ submission + support files,
//!                                           output.log, valgrind.log
//! ```
//!
//! Per-student problems are reported and the run moves on to the next
//! student; only setup failures abort the whole backup.

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::canvas::{AttendanceSheet, CanvasClient, ATTENDANCE_CACHE_FILE};
use crate::compiler::BuildMode;
use crate::config::{ClassPaths, Config};
use crate::console;
use crate::core::{copy_files, sanitize_identifier, Verdict};
use crate::executor::{AttemptReport, Executor, ExecutorOptions};
use crate::roster::{is_stale, read_roster, write_roster, RosterRecord};
use crate::runner::Runner;

pub const OUTPUT_LOG: &str = "output.log";
pub const VALGRIND_LOG: &str = "valgrind.log";

/// Command-line switches layered over the loaded config
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackupOverrides {
    pub no_execute: bool,
    pub no_compile: bool,
    pub no_clear: bool,
    pub make: bool,
    pub no_make: bool,
    pub input: Option<String>,
    pub attendance: bool,
    pub course_id: Option<i64>,
    pub token: Option<String>,
}

impl BackupOverrides {
    pub fn apply(&self, mut config: Config) -> Config {
        let general = &mut config.general;
        if self.no_execute {
            general.execute_submissions = false;
        }
        if self.no_compile {
            general.compile_submissions = false;
        }
        if self.no_clear {
            general.clear_existing_backups = false;
        }
        if self.make {
            general.use_makefile = true;
        }
        if self.no_make {
            general.use_makefile = false;
        }
        if let Some(input) = &self.input {
            general.input_string = input.clone();
        }
        if self.attendance {
            general.check_attendance = true;
        }
        if let Some(course_id) = self.course_id {
            config.canvas.course_id = course_id;
        }
        if let Some(token) = &self.token {
            config.canvas.api_token = token.clone();
        }
        config
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StudentOutcome {
    /// Attendance criterion not met
    Absent,
    NoSubmission,
    /// Left over from an earlier run with `clear_existing_backups` off
    AlreadyBackedUp,
    /// Files staged, nothing to build
    Copied,
    Processed(AttemptReport),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentBackup {
    pub pawprint: String,
    pub name: String,
    /// Staging folder; `None` when the roster row cannot be staged safely
    pub dir: Option<PathBuf>,
    pub outcome: StudentOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackupSummary {
    pub lab_dir: PathBuf,
    pub students: Vec<StudentBackup>,
}

impl BackupSummary {
    pub fn count(&self, pred: impl Fn(&StudentOutcome) -> bool) -> usize {
        self.students.iter().filter(|s| pred(&s.outcome)).count()
    }
}

pub struct BackupJob<'a> {
    config: &'a Config,
    paths: ClassPaths,
    lab: String,
    grader: String,
    runner: &'a dyn Runner,
    canvas: &'a CanvasClient,
}

impl<'a> BackupJob<'a> {
    /// `work_root` anchors the local storage tree (normally the cwd)
    pub fn new(
        config: &'a Config,
        lab: &str,
        grader: &str,
        work_root: &Path,
        runner: &'a dyn Runner,
        canvas: &'a CanvasClient,
    ) -> Result<Self> {
        let clean_lab = sanitize_identifier(lab);
        if clean_lab.is_empty() || clean_lab != lab {
            bail!("Invalid lab name {:?}", lab);
        }
        let clean_grader = sanitize_identifier(grader);
        if clean_grader.is_empty() || clean_grader != grader {
            bail!("Invalid grader name {:?}", grader);
        }
        if config.general.class_code.is_empty() {
            bail!("class_code is not set in the [general] config section");
        }

        Ok(Self {
            config,
            paths: config.class_paths().with_local_base(work_root),
            lab: clean_lab,
            grader: clean_grader,
            runner,
            canvas,
        })
    }

    pub fn paths(&self) -> &ClassPaths {
        &self.paths
    }

    pub async fn run(&self, now: NaiveDateTime) -> Result<BackupSummary> {
        self.prepare_cache()?;
        self.refresh_roster(now).await?;
        let lab_dir = self.prepare_lab_dir()?;

        let attendance = self.load_attendance().await;
        if self.config.general.use_header_files {
            self.cache_support_files();
        }

        let roster_file = self.paths.roster_file(&self.grader);
        let roster = read_roster(&roster_file)
            .with_context(|| format!("Failed to read roster for {}", self.grader))?;
        info!("Backing up {} students for {}", roster.len(), self.grader);

        let mut students = Vec::with_capacity(roster.len());
        let mut taken = HashSet::new();
        for record in &roster {
            let folder = claim_folder(record, &mut taken);
            students.push(
                self.back_up_student(&lab_dir, record, folder, attendance.as_ref())
                    .await,
            );
        }

        Ok(BackupSummary { lab_dir, students })
    }

    /// Create the local root and start from an empty cache
    fn prepare_cache(&self) -> Result<()> {
        let local_root = &self.paths.local_root;
        if !local_root.exists() {
            console::status(format!("Creating {}", local_root.display()));
        }
        fs::create_dir_all(local_root)
            .with_context(|| format!("Failed to create {}", local_root.display()))?;

        let cache = &self.paths.cache_root;
        if cache.exists() {
            console::status("A cache folder already exists. Clearing it and rebuilding");
            fs::remove_dir_all(cache)
                .with_context(|| format!("Failed to clear {}", cache.display()))?;
        }
        fs::create_dir_all(cache).with_context(|| format!("Failed to create {}", cache.display()))?;
        Ok(())
    }

    fn prepare_lab_dir(&self) -> Result<PathBuf> {
        let lab_dir = self.paths.backup_dir(&self.lab);
        if lab_dir.exists() && self.config.general.clear_existing_backups {
            console::status(format!(
                "A backup folder for {} already exists. Clearing it and rebuilding",
                self.lab
            ));
            fs::remove_dir_all(&lab_dir)
                .with_context(|| format!("Failed to clear {}", lab_dir.display()))?;
        }
        fs::create_dir_all(&lab_dir)
            .with_context(|| format!("Failed to create {}", lab_dir.display()))?;
        Ok(lab_dir)
    }

    /// Regenerate the grader's roster from Canvas when it is stale
    async fn refresh_roster(&self, now: NaiveDateTime) -> Result<()> {
        let roster_file = self.paths.roster_file(&self.grader);
        let stale = is_stale(
            &roster_file,
            self.config.general.roster_invalidation_days,
            now,
        )
        .unwrap_or_else(|e| {
            warn!("Treating unreadable roster as stale: {}", e);
            true
        });
        if !stale {
            console::status("Roster data is recent enough to be used");
            return Ok(());
        }

        if !self.config.canvas.is_configured() {
            if roster_file.is_file() {
                console::warning(
                    "Roster data is stale but Canvas is not configured; using it anyway.",
                );
                return Ok(());
            }
            bail!(
                "No roster at {} and Canvas is not configured to generate one",
                roster_file.display()
            );
        }

        console::status("Preparing roster data");
        let fetched = self
            .canvas
            .fetch_grader_roster(self.config.canvas.course_id, &self.grader, now)
            .await;
        match fetched {
            Ok(records) => {
                write_roster(&roster_file, &records)?;
                Ok(())
            }
            Err(e) if roster_file.is_file() => {
                console::error(format!("{}", e));
                console::warning("Falling back to the cached roster.");
                Ok(())
            }
            Err(e) => Err(e).context("Failed to generate roster from Canvas"),
        }
    }

    /// Fetch and cache attendance. Any failure disables the check.
    async fn load_attendance(&self) -> Option<AttendanceSheet> {
        if !self.config.general.check_attendance {
            return None;
        }
        match self.canvas.fetch_attendance(&self.config.canvas, &self.lab).await {
            Ok(sheet) => {
                let cache = self.paths.cache_root.join(ATTENDANCE_CACHE_FILE);
                if let Err(e) = sheet.save(&cache) {
                    warn!("Could not cache attendance: {}", e);
                }
                Some(sheet)
            }
            Err(e) => {
                console::error(format!("{}", e));
                console::error("Disabling attendance checking for this execution.");
                None
            }
        }
    }

    fn cache_support_files(&self) {
        let lab_files = self.paths.lab_files_dir(&self.lab);
        console::status("Copying test files into cache");
        match copy_files(&lab_files, &self.paths.cache_root) {
            Ok(copied) => debug!("Cached {} support files", copied.len()),
            Err(e) => console::warning(format!(
                "Could not cache support files from {}: {:#}",
                lab_files.display(),
                e
            )),
        }
    }

    async fn back_up_student(
        &self,
        lab_dir: &Path,
        record: &RosterRecord,
        folder: Option<String>,
        attendance: Option<&AttendanceSheet>,
    ) -> StudentBackup {
        let mut entry = StudentBackup {
            pawprint: record.user_id(),
            name: record.name.clone(),
            dir: folder.map(|f| lab_dir.join(f)),
            outcome: StudentOutcome::Copied,
        };

        let staged = match (&entry.dir, entry.pawprint.is_empty()) {
            (Some(dir), false) => self.stage_student(&entry, dir, record, attendance).await,
            (_, true) => Err(anyhow::anyhow!("roster row has no pawprint")),
            (None, false) => Err(anyhow::anyhow!(
                "no usable folder name for {:?} ({})",
                entry.name,
                entry.pawprint
            )),
        };
        entry.outcome = match staged {
            Ok(outcome) => outcome,
            Err(e) => {
                console::error(format!("Student {}: {:#}", entry.name, e));
                StudentOutcome::Failed(format!("{:#}", e))
            }
        };
        entry
    }

    async fn stage_student(
        &self,
        entry: &StudentBackup,
        dir: &Path,
        record: &RosterRecord,
        attendance: Option<&AttendanceSheet>,
    ) -> Result<StudentOutcome> {
        let name = &entry.name;
        if let Some(sheet) = attendance {
            if !sheet.is_present(&record.canvas_id) {
                console::warning(format!(
                    "{} was marked absent during the lab session and therefore does not have a valid submission.",
                    name
                ));
                return Ok(StudentOutcome::Absent);
            }
        }

        if dir.exists() {
            if dir.join(OUTPUT_LOG).is_file() {
                console::status(format!("Student {} already has a log, skipping", name));
                return Ok(StudentOutcome::AlreadyBackedUp);
            }
            console::status(format!("Rebuilding student {} directory", name));
            fs::remove_dir_all(dir)
                .with_context(|| format!("Failed to clear {}", dir.display()))?;
        }

        let submission = self
            .paths
            .section_dir(&self.lab, &self.grader)
            .join(&entry.pawprint);
        if !submission.is_dir() {
            console::warning(format!("Student {} does not have a valid submission.", name));
            return Ok(StudentOutcome::NoSubmission);
        }

        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let submitted = copy_files(&submission, dir)
            .with_context(|| format!("Failed to copy {}", submission.display()))?;
        self.copy_cached_files(dir, name);

        let Some(source) = submitted
            .iter()
            .find(|path| path.extension().is_some_and(|ext| ext == "c"))
        else {
            return Ok(StudentOutcome::Copied);
        };

        console::status(format!("Compiling student {}'s lab", name));
        let mode = if self.config.general.use_makefile {
            BuildMode::Project
        } else {
            BuildMode::SingleFile {
                source: source.clone(),
            }
        };
        let executor = Executor::new(self.runner, ExecutorOptions::from_config(&self.config.general));
        let report = executor.execute(dir, &mode).await;

        write_logs(dir, &report)?;
        match report.verdict {
            Verdict::BuildFailed => console::warning(format!(
                "Student {}'s lab didn't produce an executable. Double check that their submission is correct.",
                name
            )),
            Verdict::TimedOut => {
                console::warning(format!("Student {}'s lab took too long.", name))
            }
            _ => {}
        }
        Ok(StudentOutcome::Processed(report))
    }

    /// Copy cached support files over the student's. A clash with a
    /// read-only submitted file is reported and skipped.
    fn copy_cached_files(&self, dest: &Path, name: &str) {
        let entries = match fs::read_dir(&self.paths.cache_root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cache unreadable: {}", e);
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() || entry.file_name() == ATTENDANCE_CACHE_FILE {
                continue;
            }
            if let Err(e) = fs::copy(&path, dest.join(entry.file_name())) {
                debug!("Copy of {} failed: {}", path.display(), e);
                console::error(format!(
                    "Unable to copy cached files into student {}'s directory.",
                    name
                ));
                console::error(
                    "This can happen if a student turned in a file that has an identical name (including the extension)",
                );
            }
        }
    }
}

/// Folder name for a student's staging directory.
///
/// The display name with path separators and control characters dropped,
/// or the pawprint when the name is unusable. A name already claimed by an
/// earlier row gets the pawprint appended. `None` when nothing usable is
/// left, so a row can never resolve to the lab folder itself or outside it.
fn claim_folder(record: &RosterRecord, taken: &mut HashSet<String>) -> Option<String> {
    let cleaned: String = record
        .name
        .chars()
        .filter(|c| *c != '/' && !c.is_control())
        .collect();
    let cleaned = cleaned.trim();
    let pawprint = record.user_id();

    let base = if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        pawprint.clone()
    } else {
        cleaned.to_string()
    };
    if base.is_empty() {
        return None;
    }

    let candidates = [base.clone(), format!("{} ({})", base, pawprint)];
    let folder = candidates.into_iter().find(|c| !taken.contains(c))?;
    taken.insert(folder.clone());
    Some(folder)
}

/// `output.log` holds program stdout (or the compiler diagnostics when the
/// build failed), `valgrind.log` the raw memcheck report.
fn write_logs(dir: &Path, report: &AttemptReport) -> Result<()> {
    let output = match (&report.run, report.build_message()) {
        (Some(run), _) => Some(run.stdout.as_str()),
        (None, Some(message)) => Some(message),
        (None, None) => None,
    };
    if let Some(output) = output {
        let path = dir.join(OUTPUT_LOG);
        fs::write(&path, output).with_context(|| format!("Failed to write {}", path.display()))?;
    }
    if let Some(memcheck) = &report.memcheck {
        let path = dir.join(VALGRIND_LOG);
        fs::write(&path, &memcheck.raw)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}
