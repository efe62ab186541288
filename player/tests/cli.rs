use std::path::PathBuf;
use std::process::Command;

fn write_chart(name: &str, text: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("dtx_player_cli_{}_{name}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("song.dtx");
    std::fs::write(&path, text).unwrap();
    path
}

#[test]
fn inspect_prints_chart_summary() {
    let path = write_chart(
        "inspect",
        "#TITLE: Cli Song\r\n#ARTIST: Someone\r\n#BPM: 150\r\n\r\n#WAV01: kick.wav\r\n#WAV02: snare.wav\r\n\r\n#BPM0A: 75\r\n#BPM02: 300\r\n\r\n#00011: 01020102\r\n#00112: 02\r\n",
    );

    let bin = env!("CARGO_BIN_EXE_dtx-player");
    let out = Command::new(bin)
        .arg("--inspect")
        .arg("--chart")
        .arg(&path)
        .arg("--config")
        .arg(path.with_file_name("absent.toml"))
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(
        stdout,
        "title: Cli Song\nartist: Someone\nsamples: 2\nnotes: 5\nlength_ms: 1600\ntempo 2: 300\ntempo 10: 75\n"
    );

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn missing_chart_fails() {
    let bin = env!("CARGO_BIN_EXE_dtx-player");
    let out = Command::new(bin)
        .arg("--inspect")
        .arg("--chart")
        .arg(std::env::temp_dir().join("dtx_player_cli_no_such_chart.dtx"))
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
}

#[test]
fn abort_policy_rejects_malformed_chart() {
    let path = write_chart("abort", "#TITLE: Broken\n\n#00011: 0?\n");
    let config = path.with_file_name("config_sys.toml");
    std::fs::write(&config, "[loader]\nmalformed_blocks = \"abort\"\n").unwrap();

    let bin = env!("CARGO_BIN_EXE_dtx-player");
    let out = Command::new(bin)
        .arg("--inspect")
        .arg("--chart")
        .arg(&path)
        .arg("--config")
        .arg(&config)
        .output()
        .unwrap();
    assert!(!out.status.success());

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}
