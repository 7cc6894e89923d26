//! CLI tests for the `pipeline` binary.
//!
//! Spawns the binary with a cleared environment and verifies exit codes, the
//! absence of side effects on precondition failures, and full runs against
//! shell-script collaborators.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use pipeline::exit_codes;
use pipeline::test_support::TestWorkspace;

const KEY: &str = "lat51.391900_lon11.878700";

fn pipeline(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pipeline"));
    cmd.current_dir(dir)
        .env_clear()
        .env("PATH", std::env::var_os("PATH").unwrap_or_default())
        .env("RUST_LOG", "warn");
    cmd
}

fn with_reference_params(cmd: &mut Command) -> &mut Command {
    cmd.env("LAT", "51.3919")
        .env("LON", "11.8787")
        .env("START_YEAR", "2017")
        .env("END_YEAR", "2021")
}

fn output(cmd: &mut Command) -> Output {
    cmd.output().expect("spawn pipeline")
}

#[test]
fn key_prints_canonical_location_key() {
    let temp = tempfile::tempdir().expect("tempdir");
    let out = output(pipeline(temp.path()).args(["key", "--lat", "51.3919", "--lon", "11.8787"]));
    assert_eq!(out.status.code(), Some(exit_codes::OK));
    assert_eq!(String::from_utf8_lossy(&out.stdout), format!("{KEY}\n"));

    let out = output(pipeline(temp.path()).args(["key", "--lat", "-33.9", "--lon", "-0.0000004"]));
    assert_eq!(
        String::from_utf8_lossy(&out.stdout),
        "lat-33.900000_lon0.000000\n"
    );
}

#[test]
fn check_without_parameters_is_precondition_failure() {
    let temp = tempfile::tempdir().expect("tempdir");
    let out = output(pipeline(temp.path()).arg("check"));
    assert_eq!(out.status.code(), Some(exit_codes::PRECONDITION));
    assert!(String::from_utf8_lossy(&out.stderr).contains("LAT"));
    assert_eq!(fs::read_dir(temp.path()).expect("ls").count(), 0);
}

#[test]
fn check_flags_override_environment() {
    let ws = TestWorkspace::new().expect("workspace");
    let config = ws.write_config().expect("config");
    let mut cmd = pipeline(ws.path());
    with_reference_params(&mut cmd)
        .env("LAT", "not-a-number")
        .args(["check", "--config"])
        .arg(&config)
        .args(["--lat", "51.3919"]);
    let out = output(&mut cmd);
    assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
    assert_eq!(String::from_utf8_lossy(&out.stdout), format!("{KEY}\n"));
}

#[test]
fn run_without_credentials_creates_nothing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cmd = pipeline(temp.path());
    with_reference_params(&mut cmd).arg("run");
    let out = output(&mut cmd);

    assert_eq!(out.status.code(), Some(exit_codes::PRECONDITION));
    assert!(String::from_utf8_lossy(&out.stderr).contains("HDA_USER"));
    assert_eq!(fs::read_dir(temp.path()).expect("ls").count(), 0);
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let temp = tempfile::tempdir().expect("tempdir");
    let out = output(pipeline(temp.path()).arg("init"));
    assert_eq!(out.status.code(), Some(exit_codes::OK));
    let written = fs::read_to_string(temp.path().join("pipeline.toml")).expect("config");
    assert!(written.contains("[simulation]"));

    let out = output(pipeline(temp.path()).arg("init"));
    assert_eq!(out.status.code(), Some(exit_codes::INVALID));

    let out = output(pipeline(temp.path()).args(["init", "--force"]));
    assert_eq!(out.status.code(), Some(exit_codes::OK));
}

#[test]
fn unknown_subcommand_is_invalid_usage() {
    let temp = tempfile::tempdir().expect("tempdir");
    let out = output(pipeline(temp.path()).arg("simulate"));
    assert_eq!(out.status.code(), Some(exit_codes::INVALID));
}

#[cfg(unix)]
mod scripted {
    use super::*;

    /// Stands in for the Python entry: decodes the JSON call argument and
    /// names the output directory with `%.6f`, like the real tool.
    const PREPARE: &str = r#"
call="$1"
case "$call" in
  *'"first_year":2017'*'"last_year":2021'*) ;;
  *) echo "unexpected call: $call" >&2; exit 8 ;;
esac
lat=$(printf '%s' "$call" | sed 's/.*"lat":\([^,}]*\).*/\1/')
lon=$(printf '%s' "$call" | sed 's/.*"lon":\([^,}]*\).*/\1/')
dir=$(printf 'grasslandModelInputFiles/lat%.6f_lon%.6f' "$lat" "$lon")
mkdir -p "$dir/weather"
echo "weather" > "$dir/weather/weather.txt"
echo "prepared $dir"
"#;

    const SIMULATE: &str = r#"
replicate="$1"
out="$2"
config="$3"
test -f "$config" || exit 9
if [ "$replicate" = "2" ]; then
  echo "replicate 2 diverged" >&2
  exit 1
fi
cp "$config" "$out/used_config.txt"
"#;

    fn scripted_workspace(prepare: &str) -> TestWorkspace {
        let mut ws = TestWorkspace::new().expect("workspace");
        let prepare_path = ws.path().join("prepare.sh");
        let simulate_path = ws.path().join("simulate.sh");
        fs::write(&prepare_path, prepare).expect("prepare script");
        fs::write(&simulate_path, SIMULATE).expect("simulate script");
        ws.config.data_preparation.command =
            vec!["sh".to_string(), prepare_path.display().to_string()];
        ws.config.simulation.command = vec![
            "sh".to_string(),
            simulate_path.display().to_string(),
            "{replicate}".to_string(),
            "{replicate_dir}".to_string(),
            "{config_file}".to_string(),
        ];
        ws.write_config().expect("config");
        ws
    }

    fn run(ws: &TestWorkspace, extra: &[&str]) -> Output {
        let mut cmd = pipeline(ws.path());
        with_reference_params(&mut cmd)
            .args(["run", "--config"])
            .arg(ws.config_path())
            .args(extra);
        output(&mut cmd)
    }

    #[test]
    fn partial_replicate_failure_still_exits_ok() {
        let ws = scripted_workspace(PREPARE);
        let out = run(&ws, &["--replicates", "3", "--workers", "2"]);
        assert_eq!(out.status.code(), Some(exit_codes::OK), "{out:?}");
        let stdout = String::from_utf8_lossy(&out.stdout);
        assert!(stdout.contains(&format!("key={KEY}")), "{stdout}");
        assert!(stdout.contains("replicates=2/3"), "{stdout}");

        let project = ws.path().join(format!("output/simulations/project_{KEY}"));
        assert!(project.join("replicate_1/used_config.txt").is_file());
        assert!(!project.join("replicate_2/used_config.txt").exists());
        assert!(project.join("replicate_3/used_config.txt").is_file());
        let log = fs::read_to_string(project.join("replicate_2/simulation.log")).expect("log");
        assert!(log.contains("replicate 2 diverged"));

        assert!(
            ws.path()
                .join(format!("output/scenarios/{KEY}/weather/weather.txt"))
                .is_file()
        );
        let prep_log =
            fs::read_to_string(ws.path().join("logs/data_preparation.log")).expect("prep log");
        assert!(prep_log.contains(&format!("prepared grasslandModelInputFiles/{KEY}")));
    }

    #[test]
    fn failing_preparation_exits_with_acquisition_code() {
        let ws = scripted_workspace("echo 'no credentials for data service' >&2\nexit 4\n");
        let out = run(&ws, &[]);
        assert_eq!(out.status.code(), Some(exit_codes::ACQUISITION));
        assert!(!ws.path().join("simulations").exists());
    }

    #[test]
    fn misnamed_preparation_output_exits_with_acquisition_code() {
        let ws = scripted_workspace("mkdir -p grasslandModelInputFiles/lat51.3919_lon11.8787\n");
        let out = run(&ws, &[]);
        assert_eq!(out.status.code(), Some(exit_codes::ACQUISITION));
        assert!(String::from_utf8_lossy(&out.stderr).contains(KEY));
    }

    #[test]
    fn all_replicates_failing_exits_with_simulation_code() {
        let mut ws = scripted_workspace(PREPARE);
        let out = run(&ws, &["--replicates", "1"]);
        assert_eq!(out.status.code(), Some(exit_codes::OK));

        ws.config.simulation.command =
            vec!["sh".to_string(), "-c".to_string(), "exit 2".to_string()];
        ws.write_config().expect("config");
        let out = run(&ws, &["--replicates", "2"]);
        assert_eq!(out.status.code(), Some(exit_codes::SIMULATION));
    }
}
