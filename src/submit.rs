//! Student submission pipeline
//!
//! file check → window → header → roster → sandbox → build/run → filing.
//! Validation problems are warnings that downgrade the filing to invalid;
//! configuration and filesystem problems abort the attempt.

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use std::path::PathBuf;
use tracing::info;

use crate::compiler::BuildMode;
use crate::config::Config;
use crate::console;
use crate::core::{require_file, sanitize_identifier};
use crate::executor::{AttemptReport, Executor, ExecutorOptions};
use crate::filer::{FiledSubmission, Filer};
use crate::header::file_includes_lab_header;
use crate::roster::resolve_section;
use crate::runner::Runner;
use crate::sandbox::Sandbox;
use crate::window::{WindowStatus, WindowTable};

#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub user: String,
    pub class_code: String,
    pub lab: String,
    pub file: PathBuf,
}

/// What happened to one submission attempt
#[derive(Debug, Clone)]
pub struct SubmissionAttempt {
    pub user: String,
    pub lab: String,
    /// `None` when the user is on no roster
    pub section: Option<String>,
    pub window: WindowStatus,
    /// `None` when the header check is disabled
    pub header_ok: Option<bool>,
    pub report: AttemptReport,
    pub filed: FiledSubmission,
    pub timestamp: NaiveDateTime,
}

impl SubmissionAttempt {
    pub fn is_valid(&self) -> bool {
        self.filed.valid
    }
}

fn validated_name(raw: &str, what: &str) -> Result<String> {
    let clean = sanitize_identifier(raw);
    if clean.is_empty() || clean != raw {
        bail!("Invalid {} {:?}", what, raw);
    }
    Ok(clean)
}

pub async fn run_submission(
    config: &Config,
    request: &SubmitRequest,
    runner: &dyn Runner,
    now: NaiveDateTime,
) -> Result<SubmissionAttempt> {
    let class_code = validated_name(&request.class_code, "class code")?;
    let lab = validated_name(&request.lab, "lab name")?;
    let user = sanitize_identifier(&request.user);
    if user.is_empty() {
        bail!("Invalid user name {:?}", request.user);
    }
    let paths = config.paths_for_class(&class_code);

    let file = require_file(&request.file, "submission file")?;

    let table = WindowTable::load(&paths.window_table).context("Lab windows are misconfigured")?;
    let window = table.check(&lab, now);
    match window {
        WindowStatus::WithinWindow => {}
        WindowStatus::Unknown => console::warning(format!(
            "Lab {} is missing or invalid. Please check again.",
            lab
        )),
        WindowStatus::BeforeWindow => {
            console::warning(format!("Submissions for {} are not open yet.", lab))
        }
        WindowStatus::AfterWindow => {
            console::warning(format!("The submission window for {} has closed.", lab))
        }
    }

    let header_ok = if config.general.check_lab_header {
        let found = file_includes_lab_header(&file, &lab)?;
        if !found {
            console::warning(format!(
                "Your submission {} does not include the lab header file \"{}.h\".",
                file.display(),
                lab
            ));
        }
        Some(found)
    } else {
        None
    };

    let section = resolve_section(&paths.roster_root, &user).context("Rosters are misconfigured")?;
    if section.is_none() {
        console::warning(format!("{} is not enrolled in any lab section.", user));
    }

    let sandbox = Sandbox::prepare(&paths.lab_files_dir(&lab), &file)?;
    let mode = BuildMode::detect(sandbox.path(), sandbox.submission());

    console::status(format!("Compiling {}", file.display()));
    let executor = Executor::new(runner, ExecutorOptions::from_config(&config.general));
    let report = executor.execute(sandbox.path(), &mode).await;
    drop(sandbox);

    show_report(&report);

    let intake_valid = window.is_open() && header_ok.unwrap_or(true) && section.is_some();
    let valid = intake_valid && report.succeeded();

    let section_name = section
        .clone()
        .unwrap_or_else(|| config.paths.unassigned_section.clone());
    let filer = Filer::from_config(paths.section_dir(&lab, &section_name), &config.paths);
    let filed = filer.file(&user, &file, valid, now)?;

    info!(
        "Submission summary: user={}, lab={}, section={}, window={}, verdict={}, valid={}",
        user, lab, section_name, window, report.verdict, valid
    );

    if valid {
        console::success(format!("Submission of {} for {} accepted.", file.display(), lab));
    } else {
        console::warning(format!(
            "Submission of {} for {} was recorded as INVALID.",
            file.display(),
            lab
        ));
    }

    Ok(SubmissionAttempt {
        user,
        lab,
        section,
        window,
        header_ok,
        report,
        filed,
        timestamp: now,
    })
}

fn show_report(report: &AttemptReport) {
    if let Some(message) = report.build_message() {
        console::error("Your program failed to compile.");
        console::block("compiler output", message);
        return;
    }
    if let Some(run) = &report.run {
        console::block("program output", &run.stdout);
        console::block("program errors", &run.stderr);
    }
    for warning in &report.warnings {
        console::warning(warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Verdict;
    use crate::executor::tests::{ScriptedRunner, CLEAN_VALGRIND};
    use crate::roster::{write_roster, RosterRecord};
    use crate::runner::{RunOutcome, RunStatus};
    use crate::window::WINDOW_DATE_FORMAT;
    use std::fs;
    use tempfile::TempDir;

    const LAB3_SOURCE: &str = "#include \"lab3.h\"\nint main(void) { return 0; }\n";

    struct Fixture {
        _root: TempDir,
        config: Config,
        student_file: PathBuf,
    }

    impl Fixture {
        fn new(source: &str) -> Self {
            let root = tempfile::tempdir().unwrap();
            let mut config = Config::default();
            config.paths.base_path = root.path().to_string_lossy().to_string();
            let paths = config.paths_for_class("cs2050");

            fs::create_dir_all(&paths.class_root).unwrap();
            fs::write(
                &paths.window_table,
                "lab_name,start_date,end_date\nlab3,2025-01-01_00:00:00,2025-01-10_00:00:00\n",
            )
            .unwrap();

            let cached = ts("2025-01-01_00:00:00");
            write_roster(
                &paths.roster_file("A"),
                &[RosterRecord::new("jd123", "11", "Doe, Jane", cached)],
            )
            .unwrap();

            let lab_files = paths.lab_files_dir("lab3");
            fs::create_dir_all(&lab_files).unwrap();
            fs::write(lab_files.join("lab3.h"), "int answer(void);\n").unwrap();

            let student_dir = root.path().join("home/jd123");
            fs::create_dir_all(&student_dir).unwrap();
            let student_file = student_dir.join("lab3.c");
            fs::write(&student_file, source).unwrap();

            Self {
                _root: root,
                config,
                student_file,
            }
        }

        fn request(&self, user: &str) -> SubmitRequest {
            SubmitRequest {
                user: user.to_string(),
                class_code: "cs2050".to_string(),
                lab: "lab3".to_string(),
                file: self.student_file.clone(),
            }
        }

        fn section_dir(&self, section: &str) -> PathBuf {
            self.config
                .paths_for_class("cs2050")
                .section_dir("lab3", section)
        }
    }

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, WINDOW_DATE_FORMAT).unwrap()
    }

    fn clean_run() -> ScriptedRunner {
        ScriptedRunner::new(vec![
            Ok(RunOutcome::exited(0)),
            Ok(RunOutcome::exited(0).with_stdout("42\n")),
            Ok(RunOutcome::exited(0).with_stderr(CLEAN_VALGRIND)),
        ])
    }

    #[tokio::test]
    async fn test_valid_submission_is_filed_and_linked() {
        let fx = Fixture::new(LAB3_SOURCE);
        let runner = clean_run();
        let now = ts("2025-01-05_12:00:00");

        let attempt = run_submission(&fx.config, &fx.request("jd123"), &runner, now)
            .await
            .unwrap();

        assert_eq!(attempt.window, WindowStatus::WithinWindow);
        assert_eq!(attempt.header_ok, Some(true));
        assert_eq!(attempt.section.as_deref(), Some("A"));
        assert_eq!(attempt.report.verdict, Verdict::Completed);
        assert!(attempt.is_valid());

        let section = fx.section_dir("A");
        let expected = section.join("valid/jd123_2025-01-05_12:00:00");
        assert!(expected.join("lab3.c").is_file());
        assert_eq!(
            fs::read_link(section.join("jd123")).unwrap(),
            expected.canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn test_late_submission_is_invalid_regardless_of_build() {
        let fx = Fixture::new(LAB3_SOURCE);
        let runner = clean_run();
        let now = ts("2025-02-01_00:00:00");

        let attempt = run_submission(&fx.config, &fx.request("jd123"), &runner, now)
            .await
            .unwrap();

        assert_eq!(attempt.window, WindowStatus::AfterWindow);
        assert!(attempt.report.succeeded());
        assert!(!attempt.is_valid());
        assert!(attempt
            .filed
            .dir
            .starts_with(fx.section_dir("A").join("invalid")));
        assert!(fs::symlink_metadata(fx.section_dir("A").join("jd123")).is_err());
    }

    #[tokio::test]
    async fn test_missing_header_warns_but_still_compiles() {
        let fx = Fixture::new("int main(void) { return 0; }\n");
        let runner = clean_run();

        let attempt = run_submission(
            &fx.config,
            &fx.request("jd123"),
            &runner,
            ts("2025-01-05_12:00:00"),
        )
        .await
        .unwrap();

        assert_eq!(attempt.header_ok, Some(false));
        assert_eq!(runner.programs()[0], "gcc");
        assert_eq!(attempt.report.verdict, Verdict::Completed);
        assert!(!attempt.is_valid());
    }

    #[tokio::test]
    async fn test_header_check_can_be_disabled() {
        let mut fx = Fixture::new("int main(void) { return 0; }\n");
        fx.config.general.check_lab_header = false;

        let attempt = run_submission(
            &fx.config,
            &fx.request("jd123"),
            &clean_run(),
            ts("2025-01-05_12:00:00"),
        )
        .await
        .unwrap();

        assert_eq!(attempt.header_ok, None);
        assert!(attempt.is_valid());
    }

    #[tokio::test]
    async fn test_build_failure_never_updates_link() {
        let fx = Fixture::new(LAB3_SOURCE);
        let now = ts("2025-01-05_12:00:00");

        run_submission(&fx.config, &fx.request("jd123"), &clean_run(), now)
            .await
            .unwrap();
        let link = fx.section_dir("A").join("jd123");
        let before = fs::read_link(&link).unwrap();

        let failing = ScriptedRunner::new(vec![Ok(
            RunOutcome::exited(1).with_stderr("error: expected ';'")
        )]);
        let attempt = run_submission(
            &fx.config,
            &fx.request("jd123"),
            &failing,
            ts("2025-01-06_12:00:00"),
        )
        .await
        .unwrap();

        assert_eq!(attempt.report.verdict, Verdict::BuildFailed);
        assert!(!attempt.is_valid());
        assert_eq!(fs::read_link(&link).unwrap(), before);
    }

    #[tokio::test]
    async fn test_timeout_still_files_valid() {
        // Current behaviour: a timed-out run is not treated as a failed run.
        let fx = Fixture::new(LAB3_SOURCE);
        let runner = ScriptedRunner::new(vec![
            Ok(RunOutcome::exited(0)),
            Ok(RunOutcome {
                status: RunStatus::TimedOut,
                stdout: String::new(),
                stderr: String::new(),
            }),
        ]);

        let attempt = run_submission(
            &fx.config,
            &fx.request("jd123"),
            &runner,
            ts("2025-01-05_12:00:00"),
        )
        .await
        .unwrap();

        assert_eq!(attempt.report.verdict, Verdict::TimedOut);
        assert!(attempt.is_valid());
        assert!(fx.section_dir("A").join("jd123").exists());
    }

    #[tokio::test]
    async fn test_unenrolled_user_files_invalid_under_unassigned() {
        let fx = Fixture::new(LAB3_SOURCE);

        let attempt = run_submission(
            &fx.config,
            &fx.request("zz999"),
            &clean_run(),
            ts("2025-01-05_12:00:00"),
        )
        .await
        .unwrap();

        assert_eq!(attempt.section, None);
        assert!(!attempt.is_valid());
        assert!(attempt
            .filed
            .dir
            .starts_with(fx.section_dir("unassigned").join("invalid")));
    }

    #[tokio::test]
    async fn test_missing_window_table_is_fatal() {
        let fx = Fixture::new(LAB3_SOURCE);
        fs::remove_file(fx.config.paths_for_class("cs2050").window_table).unwrap();
        let runner = clean_run();

        let err = run_submission(
            &fx.config,
            &fx.request("jd123"),
            &runner,
            ts("2025-01-05_12:00:00"),
        )
        .await
        .unwrap_err();

        assert!(format!("{:#}", err).contains("Lab windows are misconfigured"));
        assert!(runner.programs().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_fatal() {
        let fx = Fixture::new(LAB3_SOURCE);
        let mut request = fx.request("jd123");
        request.file = request.file.with_file_name("nope.c");

        let err = run_submission(&fx.config, &request, &clean_run(), ts("2025-01-05_12:00:00"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("submission file not found"));
    }

    #[tokio::test]
    async fn test_rejects_path_like_lab_names() {
        let fx = Fixture::new(LAB3_SOURCE);
        let mut request = fx.request("jd123");
        request.lab = "../lab3".to_string();

        let err = run_submission(&fx.config, &request, &clean_run(), ts("2025-01-05_12:00:00"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid lab name"));
    }
}
