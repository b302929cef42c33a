// tests/session.rs

use clpar::core::session::{RunOptions, Session, TaskContext};
use clpar::core::task::TaskError;
use clpar::core::value::NativeValue;
use clpar::models::{TaskDecl, TaskKind};
use clpar::system::executor::{RecordedCall, RecordingRunner, Redirection};
use clpar::system::procedure::ProcedureTable;
use clpar::system::prompt::{Interaction, NoCursor, ScriptedPrompter};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const CL_PAR: &str = "logfile,s,h,\"cl.log\",,,\"Log file\"\nmode,s,h,\"ql\",,,\n";
const IMAGES_PAR: &str = "version,s,h,\"1.0\",,,\"Package version\"\nmode,s,h,\"ql\",,,\n";
const IMSTAT_PAR: &str = "\
images,s,a,\"\",,,\"Images to analyze\"
nlines,i,h,10,1,100,\"Number of lines\"
log,s,h,\")logfile\",,,\"Log\"
mode,s,h,\"a\",,,
";
const COUNTER_PAR: &str = "count,i,h,0,,,\"Runs so far\"\nmode,s,h,\"ql\",,,\n";
const ASK_PAR: &str = "answer,i,q,,1,10,\"Pick a number\"\nmode,s,h,\"ql\",,,\n";
const PARS_PAR: &str = "color,s,h,\"red\",,,\"\"\n";
const CALLER_PAR: &str = "total,i,h,1,,,\"Total\"\nlabel,s,h,\"start\",,,\"Label\"\nmode,s,h,\"ql\",,,\n";

/// What a calling procedure sees of its own run.
#[derive(Debug, Clone, PartialEq)]
struct Snapshot {
    runs: usize,
    scope: Vec<String>,
    total: String,
    label: String,
    redirect: Option<Redirection>,
}

type Snapshots = Arc<Mutex<Vec<Snapshot>>>;

fn snapshot(ctx: &mut TaskContext<'_>) -> anyhow::Result<Snapshot> {
    let id = ctx.task();
    Ok(Snapshot {
        runs: ctx.session().active_runs(),
        scope: ctx.session().scope_names(id)?,
        total: ctx.get_string("total")?,
        label: ctx.get_string("label")?,
        redirect: ctx.redirection().cloned(),
    })
}

struct Fixture {
    dir: TempDir,
    session: Session,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    snapshots: Snapshots,
}

fn write(path: PathBuf, text: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, text).unwrap();
}

fn lay_out_files(root: &Path) {
    write(root.join("cl/cl.cl"), "");
    write(root.join("cl/cl.par"), CL_PAR);
    write(root.join("images/images.cl"), "");
    write(root.join("images/images.par"), IMAGES_PAR);
    write(root.join("images/x_images.e"), "");
    write(root.join("images/imstat.par"), IMSTAT_PAR);
    write(root.join("scripts/counter.cl"), "");
    write(root.join("scripts/counter.par"), COUNTER_PAR);
    write(root.join("scripts/failing.cl"), "");
    write(root.join("scripts/broken.cl"), "");
    write(root.join("scripts/ask.cl"), "");
    write(root.join("scripts/ask.par"), ASK_PAR);
    write(root.join("psets/pars.par"), PARS_PAR);
    write(root.join("scripts/caller.cl"), "");
    write(root.join("scripts/caller.par"), CALLER_PAR);
    write(root.join("scripts/guarded.cl"), "");
    write(root.join("scripts/guarded.par"), CALLER_PAR);
}

fn procedures(root: &Path, snapshots: &Snapshots) -> ProcedureTable {
    let images_dir = root.join("images");
    let caller_log = Arc::clone(snapshots);
    let guarded_log = Arc::clone(snapshots);
    let diverted = root.join("nested.log");
    ProcedureTable::new()
        .register("cl", |_ctx| Ok(()))
        .register("images", move |ctx: &mut TaskContext<'_>| {
            let exe = images_dir.join("x_images.e");
            ctx.declare(TaskDecl::new("imstat", exe.display().to_string()))?;
            Ok(())
        })
        .register("counter", |ctx: &mut TaskContext<'_>| {
            if let NativeValue::Int(count) = ctx.get("count")? {
                ctx.set("count", count + 1)?;
            }
            ctx.run("lsdir", &[NativeValue::from("inner")], &[])?;
            Ok(())
        })
        .register("failing", |ctx: &mut TaskContext<'_>| {
            ctx.get("nosuch")?;
            Ok(())
        })
        .register("broken", |_ctx| Err(anyhow::anyhow!("init exploded")))
        .register("ask", |_ctx| Ok(()))
        .register("caller", move |ctx: &mut TaskContext<'_>| {
            ctx.set("label", "mine")?;
            let before = snapshot(ctx)?;
            ctx.run("counter", &[], &[])?;
            let after = snapshot(ctx)?;
            if let NativeValue::Int(total) = ctx.get("total")? {
                ctx.set("total", total + 1)?;
            }
            caller_log.lock().unwrap().extend([before, after]);
            Ok(())
        })
        .register("guarded", move |ctx: &mut TaskContext<'_>| {
            ctx.set("label", "mine")?;
            let before = snapshot(ctx)?;
            let options = RunOptions {
                redirect: Redirection {
                    stdout: Some(diverted.clone()),
                    ..Redirection::default()
                },
                ..RunOptions::default()
            };
            if ctx.run_with("failing", &[], &[], &options).is_ok() {
                anyhow::bail!("nested run of 'failing' should have failed");
            }
            let after = snapshot(ctx)?;
            guarded_log.lock().unwrap().extend([before, after]);
            Ok(())
        })
}

fn build(dir: TempDir, statuses: Vec<i32>, answers: Vec<&str>) -> Fixture {
    let root = dir.path().to_path_buf();
    let runner = RecordingRunner::with_statuses(statuses);
    let calls = runner.calls();
    let snapshots = Snapshots::default();
    let interaction = Interaction::new(
        Box::new(ScriptedPrompter::new(answers)),
        Box::new(NoCursor),
    );
    let mut session = Session::new(
        Box::new(runner),
        Box::new(procedures(&root, &snapshots)),
        interaction,
    );
    session.set_var("uparm", format!("{}/uparm/", root.display()));

    let path = |rel: &str| root.join(rel).display().to_string();
    session
        .declare(TaskDecl::new("cl", path("cl/cl.cl")).kind(TaskKind::Package))
        .unwrap();
    session.set_root("cl").unwrap();
    for decl in [
        TaskDecl::new("images", path("images/images.cl"))
            .kind(TaskKind::Package)
            .in_package("cl"),
        TaskDecl::new("broken", path("scripts/broken.cl"))
            .kind(TaskKind::Package)
            .in_package("cl"),
        TaskDecl::new("counter", path("scripts/counter.cl")).in_package("cl"),
        TaskDecl::new("failing", path("scripts/failing.cl")).in_package("cl"),
        TaskDecl::new("ask", path("scripts/ask.cl")).in_package("cl"),
        TaskDecl::new("pars", path("psets/pars.par")).in_package("cl"),
        TaskDecl::new("lsdir", "$ls -l").in_package("cl"),
        TaskDecl::new("caller", path("scripts/caller.cl")).in_package("cl"),
        TaskDecl::new("guarded", path("scripts/guarded.cl")).in_package("cl"),
    ] {
        session.declare(decl).unwrap();
    }
    session.load_package("cl", &RunOptions::default()).unwrap();
    session.load_package("images", &RunOptions::default()).unwrap();

    Fixture {
        dir,
        session,
        calls,
        snapshots,
    }
}

fn fixture_with(statuses: Vec<i32>, answers: Vec<&str>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    lay_out_files(dir.path());
    build(dir, statuses, answers)
}

fn fixture() -> Fixture {
    fixture_with(vec![], vec![])
}

fn uparm_file(fx: &Fixture, name: &str) -> PathBuf {
    fx.dir.path().join("uparm").join(format!("{}.par", name))
}

#[test]
fn test_package_load_declares_members_and_builds_scope_chain() {
    let mut fx = fixture();
    let imstat = fx.session.find_task("imstat").unwrap();
    let images = fx.session.find_task("images").unwrap();

    assert!(fx.session.task(images).unwrap().is_loaded());
    assert_eq!(fx.session.task(imstat).unwrap().package(), "images");
    assert_eq!(fx.session.find_task("images.imst").unwrap(), imstat);
    assert_eq!(fx.session.scope_names(imstat).unwrap(), vec!["imstat", "images", "cl"]);
    assert_eq!(fx.session.get_param(imstat, "version").unwrap(), "1.0");
    assert_eq!(fx.session.get_param(imstat, "_.version").unwrap(), "1.0");
    assert_eq!(fx.session.get_param(imstat, "images.version").unwrap(), "1.0");
    assert_eq!(fx.session.get_param(imstat, "nlines.p_max").unwrap(), "100");
}

#[test]
fn test_effective_mode_resolution() {
    let mut fx = fixture();
    let imstat = fx.session.find_task("imstat").unwrap();
    fx.session.init_task(imstat).unwrap();
    assert_eq!(fx.session.effective_mode(imstat), "ql");

    let cl = fx.session.find_task("cl").unwrap();
    fx.session
        .set_param(cl, "mode", &NativeValue::from("a"), true)
        .unwrap();
    assert_eq!(fx.session.effective_mode(cl), "h");
}

#[test]
fn test_successful_run_merges_and_saves_once() {
    // --- Setup ---
    let mut fx = fixture();
    let imstat = fx.session.find_task("imstat").unwrap();

    // --- Execute ---
    let report = fx
        .session
        .run("imstat", &[NativeValue::from("dev$pix")], &[], &RunOptions::default())
        .unwrap();

    // --- Assert ---
    let saved = uparm_file(&fx, "imsimstat");
    assert!(report.changed);
    assert_eq!(report.saved.as_deref(), Some(saved.as_path()));
    assert!(fs::read_to_string(&saved).unwrap().contains("dev$pix"));
    assert_eq!(fx.session.get_param(imstat, "images").unwrap(), "dev$pix");

    let calls = fx.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].command_line.ends_with("x_images.e imstat"));
}

#[test]
fn test_failed_run_leaves_current_list_untouched() {
    // --- Setup ---
    let mut fx = fixture_with(vec![1], vec![]);
    let imstat = fx.session.find_task("imstat").unwrap();

    // --- Execute ---
    let result = fx.session.run(
        "imstat",
        &[NativeValue::from("dev$pix")],
        &[("nlines".to_string(), NativeValue::from(50))],
        &RunOptions::default(),
    );

    // --- Assert ---
    assert!(matches!(result, Err(TaskError::NonZeroExit { status: 1, .. })));
    assert_eq!(fx.session.get_param(imstat, "nlines").unwrap(), "10");
    assert_eq!(fx.session.get_param(imstat, "images").unwrap(), "");
    assert!(!uparm_file(&fx, "imsimstat").exists());
}

#[test]
fn test_bad_arguments_fail_before_running() {
    let mut fx = fixture();
    let result = fx.session.run(
        "imstat",
        &[],
        &[("nlines".to_string(), NativeValue::from(500))],
        &RunOptions::default(),
    );
    assert!(matches!(result, Err(TaskError::List(_))));
    assert!(fx.calls.lock().unwrap().is_empty());
}

#[test]
fn test_nosave_merges_without_writing() {
    let mut fx = fixture();
    let imstat = fx.session.find_task("imstat").unwrap();
    let options = RunOptions {
        nosave: true,
        ..RunOptions::default()
    };
    let report = fx
        .session
        .run("imstat", &[NativeValue::from("a.fits")], &[], &options)
        .unwrap();
    assert!(report.changed);
    assert!(report.saved.is_none());
    assert_eq!(fx.session.get_param(imstat, "images").unwrap(), "a.fits");
    assert!(!uparm_file(&fx, "imsimstat").exists());
}

#[test]
fn test_saved_parameters_are_reloaded_and_stale_ones_discarded() {
    let mut fx = fixture();
    fx.session
        .run("imstat", &[NativeValue::from("dev$pix")], &[], &RunOptions::default())
        .unwrap();

    // A fresh session over the same directory picks up the saved list.
    let Fixture { dir, .. } = fx;
    let mut again = build(dir, vec![], vec![]);
    let imstat = again.session.find_task("imstat").unwrap();
    assert_eq!(again.session.get_param(imstat, "images").unwrap(), "dev$pix");

    // A saved list whose shape no longer matches is ignored.
    write(uparm_file(&again, "imsimstat"), "images,s,a,\"old\",,,\"\"\n");
    let Fixture { dir, .. } = again;
    let mut stale = build(dir, vec![], vec![]);
    let imstat = stale.session.find_task("imstat").unwrap();
    assert_eq!(stale.session.get_param(imstat, "images").unwrap(), "");
}

#[test]
fn test_unreadable_saved_parameters_fail_initialization() {
    // --- Setup ---
    let dir = tempfile::tempdir().unwrap();
    lay_out_files(dir.path());
    write(
        dir.path().join("uparm/imsimstat.par"),
        "images,s,a,\"dev$pix\"garbage,,,\"\"\n",
    );
    let mut fx = build(dir, vec![], vec![]);
    let imstat = fx.session.find_task("imstat").unwrap();

    // --- Execute ---
    let result = fx.session.init_task(imstat);

    // --- Assert ---
    assert!(matches!(result, Err(TaskError::ParFile(_))));
    assert!(!fx.session.task(imstat).unwrap().is_initialized());
    assert!(matches!(
        fx.session.get_param(imstat, "images"),
        Err(TaskError::ParFile(_))
    ));
}

#[test]
fn test_resolution_is_idempotent_and_follows_indirection() {
    let mut fx = fixture();
    let imstat = fx.session.find_task("imstat").unwrap();

    assert_eq!(fx.session.get_param(imstat, "log").unwrap(), "cl.log");
    assert_eq!(fx.session.get_param(imstat, "log").unwrap(), "cl.log");
    assert_eq!(fx.session.get_param(imstat, "log.p_value").unwrap(), "cl.log");
    assert_eq!(
        fx.session.get_param(imstat, "nlines").unwrap(),
        fx.session.get_param(imstat, "nlines").unwrap()
    );
}

#[test]
fn test_indirection_cycle_is_detected() {
    let mut fx = fixture();
    let imstat = fx.session.find_task("imstat").unwrap();
    fx.session
        .set_param(imstat, "log", &NativeValue::from(")log"), true)
        .unwrap();
    let result = fx.session.get_param(imstat, "log");
    assert!(matches!(result, Err(TaskError::IndirectionCycle { .. })));
}

#[test]
fn test_indirection_depth_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let mut text = String::new();
    for i in 0..40 {
        text.push_str(&format!("p{},s,h,\")p{}\",,,\"\"\n", i, i + 1));
    }
    text.push_str("p40,s,h,\"end\",,,\"\"\n");
    write(dir.path().join("deep/deep.par"), &text);
    write(dir.path().join("deep/x_deep.e"), "");

    let mut session = Session::new(
        Box::new(RecordingRunner::new()),
        Box::new(ProcedureTable::new()),
        Interaction::terminal(),
    );
    let exe = dir.path().join("deep/x_deep.e").display().to_string();
    let deep = session.declare(TaskDecl::new("deep", exe)).unwrap();

    assert_eq!(session.get_param(deep, "p35").unwrap(), "end");
    let result = session.get_param(deep, "p0");
    assert!(matches!(result, Err(TaskError::IndirectionDepth { limit: 32, .. })));
}

#[test]
fn test_unknown_names() {
    let mut fx = fixture();
    let imstat = fx.session.find_task("imstat").unwrap();
    assert!(matches!(
        fx.session.get_param(imstat, "nosuch"),
        Err(TaskError::UnknownParameter(_))
    ));
    assert!(matches!(
        fx.session.get_param(imstat, "nosuchtask.x"),
        Err(TaskError::TaskForParameter { .. })
    ));
    assert!(matches!(fx.session.find_task("zzz"), Err(TaskError::UnknownTask(_))));
    assert!(matches!(
        fx.session.get_param(imstat, "nlines[0]"),
        Err(TaskError::Name(_))
    ));
}

#[test]
fn test_script_procedure_updates_its_parameters() {
    // --- Setup ---
    let mut fx = fixture();
    let counter = fx.session.find_task("counter").unwrap();
    let out = fx.dir.path().join("out.log");
    let options = RunOptions {
        redirect: Redirection {
            stdout: Some(out.clone()),
            ..Redirection::default()
        },
        ..RunOptions::default()
    };

    // --- Execute ---
    fx.session.run("counter", &[], &[], &options).unwrap();
    fx.session.run("counter", &[], &[], &RunOptions::default()).unwrap();

    // --- Assert ---
    assert_eq!(fx.session.get_param(counter, "count").unwrap(), "2");
    assert!(uparm_file(&fx, "clcountr").exists());
    let calls = fx.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].command_line, "ls -l inner");
    assert_eq!(calls[0].redirection.stdout, Some(out));
    assert_eq!(calls[1].redirection.stdout, None);
}

#[test]
fn test_nested_run_leaves_caller_frame_intact() {
    // --- Setup ---
    let mut fx = fixture();
    let caller = fx.session.find_task("caller").unwrap();
    let counter = fx.session.find_task("counter").unwrap();

    // --- Execute ---
    let keywords = [("total".to_string(), NativeValue::from(5))];
    let report = fx
        .session
        .run("caller", &[], &keywords, &RunOptions::default())
        .unwrap();

    // --- Assert ---
    let snapshots = fx.snapshots.lock().unwrap().clone();
    assert_eq!(snapshots.len(), 2);
    let (before, after) = (&snapshots[0], &snapshots[1]);
    assert_eq!(before, after);
    assert_eq!(before.runs, 1);
    assert_eq!(before.scope, vec!["caller", "images", "cl"]);
    assert_eq!(before.total, "5");
    assert_eq!(before.label, "mine");

    assert!(report.changed);
    assert_eq!(fx.session.active_runs(), 0);
    assert_eq!(fx.session.get_param(caller, "total").unwrap(), "6");
    assert_eq!(fx.session.get_param(caller, "label").unwrap(), "mine");
    assert_eq!(fx.session.get_param(counter, "count").unwrap(), "1");
    assert_eq!(fx.session.scope_names(caller).unwrap(), vec!["caller", "images", "cl"]);
}

#[test]
fn test_failed_nested_run_restores_caller_frame_and_redirection() {
    // --- Setup ---
    let mut fx = fixture();
    let guarded = fx.session.find_task("guarded").unwrap();
    let out = fx.dir.path().join("guarded.log");
    let options = RunOptions {
        redirect: Redirection {
            stdout: Some(out.clone()),
            ..Redirection::default()
        },
        ..RunOptions::default()
    };

    // --- Execute ---
    fx.session.run("guarded", &[], &[], &options).unwrap();

    // --- Assert ---
    let snapshots = fx.snapshots.lock().unwrap().clone();
    assert_eq!(snapshots.len(), 2);
    let (before, after) = (&snapshots[0], &snapshots[1]);
    assert_eq!(before, after);
    assert_eq!(before.runs, 1);
    assert_eq!(before.label, "mine");
    assert_eq!(
        after.redirect.as_ref().and_then(|r| r.stdout.clone()),
        Some(out)
    );

    assert_eq!(fx.session.active_runs(), 0);
    assert_eq!(fx.session.get_param(guarded, "label").unwrap(), "mine");
}

#[test]
fn test_procedure_errors_propagate_unchanged() {
    let mut fx = fixture();
    let result = fx.session.run("failing", &[], &[], &RunOptions::default());
    match result {
        Err(TaskError::UnknownParameter(name)) => assert_eq!(name, "nosuch"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_failed_package_init_is_not_marked_loaded() {
    let mut fx = fixture();
    let broken = fx.session.find_task("broken").unwrap();
    let before = fx.session.loaded_path().to_vec();

    let result = fx.session.load_package("broken", &RunOptions::default());

    assert!(matches!(result, Err(TaskError::Procedure(_))));
    assert!(!fx.session.task(broken).unwrap().is_loaded());
    assert_eq!(fx.session.loaded_path(), before.as_slice());
}

#[test]
fn test_reloading_a_package_only_makes_it_current() {
    let mut fx = fixture();
    let cl = fx.session.find_task("cl").unwrap();
    let images = fx.session.find_task("images").unwrap();

    fx.session.load_package("cl", &RunOptions::default()).unwrap();
    assert_eq!(fx.session.loaded_path().last(), Some(&cl));

    assert_eq!(fx.session.bye().unwrap(), cl);
    assert_eq!(fx.session.loaded_path().last(), Some(&images));
}

#[test]
fn test_foreign_and_pset_tasks() {
    let mut fx = fixture();
    fx.session
        .run("lsdir", &[NativeValue::from("a"), NativeValue::from("b")], &[], &RunOptions::default())
        .unwrap();
    assert_eq!(fx.calls.lock().unwrap()[0].command_line, "ls -l a b");

    let keywords = fx.session.run(
        "lsdir",
        &[],
        &[("x".to_string(), NativeValue::from(1))],
        &RunOptions::default(),
    );
    assert!(matches!(keywords, Err(TaskError::ForeignKeywords { .. })));

    let pset = fx.session.run("pars", &[], &[], &RunOptions::default());
    assert!(matches!(pset, Err(TaskError::PsetExecution(_))));
    let pars = fx.session.find_task("pars").unwrap();
    assert_eq!(fx.session.get_param(pars, "color").unwrap(), "red");
}

#[test]
fn test_query_parameters_are_prompted_until_valid() {
    let mut fx = fixture_with(vec![], vec!["42", "7"]);
    let ask = fx.session.find_task("ask").unwrap();
    assert_eq!(fx.session.get_param(ask, "answer").unwrap(), "7");
}

#[test]
fn test_unlearn_restores_defaults() {
    let mut fx = fixture();
    let imstat = fx.session.find_task("imstat").unwrap();
    fx.session
        .run("imstat", &[NativeValue::from("dev$pix")], &[], &RunOptions::default())
        .unwrap();

    fx.session.unlearn(imstat).unwrap();

    assert_eq!(fx.session.get_param(imstat, "images").unwrap(), "");
    assert!(fx.session.dpar(imstat).unwrap().ends_with("# EOF"));
}
